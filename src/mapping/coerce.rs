//! String coercion shared by every mapping entry.

use super::types::VendorValue;

/// Parse the numeric content of a vendor value (first element for arrays).
///
/// A trailing `%` is tolerated, so `"35%"` and `"35"` read the same.
pub fn parse_number(raw: &VendorValue) -> Option<f64> {
    let text = raw.first()?.trim();
    let text = text.strip_suffix('%').unwrap_or(text).trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse a percent-style value: `"15%"` becomes `15`.
pub fn parse_percent(raw: &VendorValue) -> Option<f64> {
    parse_number(raw)
}

/// Parse a boolean flag stored as `"1"`/`"0"`.
pub fn parse_flag(raw: &VendorValue) -> Option<bool> {
    match raw.first()?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

pub fn parse_text(raw: &VendorValue) -> Option<String> {
    let text = raw.first()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Render a number the way Bambu Studio writes it: no trailing zeros,
/// at most 6 decimals.
///
/// Magnitudes of 1e15 and above have no fractional part to round and are
/// written out in full.
pub fn format_number(value: f64) -> String {
    if value.abs() >= 1e15 {
        return format!("{:.0}", value);
    }
    let rounded = (value * 1_000_000.0).round() / 1_000_000.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        let s = format!("{:.6}", rounded);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

pub fn format_flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(s: &str) -> VendorValue {
        VendorValue::Scalar(s.to_string())
    }

    #[test]
    fn test_parse_number_variants() {
        assert_eq!(parse_number(&scalar("0.2")), Some(0.2));
        assert_eq!(parse_number(&scalar(" 220 ")), Some(220.0));
        assert_eq!(parse_number(&scalar("35%")), Some(35.0));
        assert_eq!(parse_number(&scalar("")), None);
        assert_eq!(parse_number(&scalar("auto")), None);
        assert_eq!(parse_number(&scalar("nan")), None);
        let arr = VendorValue::Array(vec!["215".to_string(), "230".to_string()]);
        assert_eq!(parse_number(&arr), Some(215.0));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag(&scalar("1")), Some(true));
        assert_eq!(parse_flag(&scalar("0")), Some(false));
        assert_eq!(parse_flag(&scalar("true")), Some(true));
        assert_eq!(parse_flag(&scalar("maybe")), None);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(15.0), "15");
        assert_eq!(format_number(0.2), "0.2");
        assert_eq!(format_number(0.2 + 0.2 * 0.1), "0.22");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1.25), "1.25");
    }

    #[test]
    fn test_format_huge_number_reads_back() {
        let huge = 2.0000000000000002e307;
        let written = format_number(huge);
        assert_ne!(written, "inf");
        assert_eq!(parse_number(&scalar(&written)), Some(huge));
        assert_eq!(format_number(-1e15), "-1000000000000000");
    }
}

//! Human-readable lines for diffs and warnings.
//!
//! Formatting never reads global state: the caller passes a
//! [`FormatContext`] on every call.

use crate::changes::{ChangeScope, ChangeWarning, DiffRecord};
use crate::mapping::coerce::format_number;
use crate::mapping::SettingValue;
use crate::optimizer::normalize_language;

/// Locale for one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatContext {
    /// Two-letter language code.
    pub language: String,
    pub decimal_separator: char,
}

impl Default for FormatContext {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            decimal_separator: '.',
        }
    }
}

impl FormatContext {
    /// Context for a language tag, with that language's usual decimal
    /// separator.
    pub fn for_language(tag: &str) -> Self {
        let language = normalize_language(tag);
        let decimal_separator = match language.as_str() {
            "de" | "fr" | "es" | "it" | "pt" | "nl" | "pl" | "ru" | "cs" | "sv" | "da" | "fi" | "nb" | "tr" | "uk" => ',',
            _ => '.',
        };
        Self {
            language,
            decimal_separator,
        }
    }

    fn labels(&self) -> &'static Labels {
        match self.language.as_str() {
            "de" => &DE,
            "fr" => &FR,
            "es" => &ES,
            _ => &EN,
        }
    }
}

struct Labels {
    global: &'static str,
    plate: &'static str,
    unset: &'static str,
    warning: &'static str,
    yes: &'static str,
    no: &'static str,
}

const EN: Labels = Labels {
    global: "global",
    plate: "plate",
    unset: "unset",
    warning: "warning",
    yes: "on",
    no: "off",
};

const DE: Labels = Labels {
    global: "global",
    plate: "Platte",
    unset: "nicht gesetzt",
    warning: "Warnung",
    yes: "an",
    no: "aus",
};

const FR: Labels = Labels {
    global: "global",
    plate: "plateau",
    unset: "non défini",
    warning: "avertissement",
    yes: "activé",
    no: "désactivé",
};

const ES: Labels = Labels {
    global: "global",
    plate: "placa",
    unset: "sin definir",
    warning: "aviso",
    yes: "activado",
    no: "desactivado",
};

/// Format a number with the context's decimal separator.
pub fn format_decimal(value: f64, ctx: &FormatContext) -> String {
    let s = format_number(value);
    if ctx.decimal_separator == '.' {
        s
    } else {
        s.replace('.', &ctx.decimal_separator.to_string())
    }
}

/// Format a canonical value for display.
pub fn format_value(value: &SettingValue, ctx: &FormatContext) -> String {
    let labels = ctx.labels();
    match value {
        SettingValue::Bool(true) => labels.yes.to_string(),
        SettingValue::Bool(false) => labels.no.to_string(),
        SettingValue::Number(n) => format_decimal(*n, ctx),
        SettingValue::Text(s) => s.clone(),
        SettingValue::Speeds(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(role, v)| format!("{}={}", role, format_decimal(*v, ctx)))
                .collect();
            format!("{{{}}}", parts.join("; "))
        }
    }
}

/// One line per applied change, e.g.
/// `[Bracket, plate 1] wall_line_count: 2 -> 4 (thicker walls)`.
///
/// Plates are shown one-based.
pub fn format_diff(diff: &DiffRecord, ctx: &FormatContext) -> String {
    let labels = ctx.labels();
    let scope = match (diff.scope, &diff.target) {
        (ChangeScope::Object, Some(target)) => match target.plate_index {
            Some(idx) => format!("{}, {} {}", target.name(), labels.plate, idx + 1),
            None => target.name().to_string(),
        },
        _ => labels.global.to_string(),
    };
    let from = diff
        .from
        .as_ref()
        .map(|v| format_value(v, ctx))
        .unwrap_or_else(|| labels.unset.to_string());

    let mut line = format!(
        "[{}] {}: {} -> {}",
        scope,
        diff.parameter,
        from,
        format_value(&diff.to, ctx)
    );
    if let Some(reason) = diff.reason.as_deref().filter(|r| !r.is_empty()) {
        line.push_str(&format!(" ({})", reason));
    }
    line
}

pub fn format_warning(warning: &ChangeWarning, ctx: &FormatContext) -> String {
    format!(
        "{}: {} [{}]: {}",
        ctx.labels().warning,
        warning.parameter,
        warning.kind,
        warning.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::WarningKind;
    use crate::project::ObjectTarget;

    fn diff(scope: ChangeScope, target: Option<ObjectTarget>) -> DiffRecord {
        DiffRecord {
            scope,
            target,
            parameter: "layer_height_mm".to_string(),
            from: Some(SettingValue::Number(0.2)),
            to: SettingValue::Number(0.16),
            reason: Some("finer layers".to_string()),
        }
    }

    #[test]
    fn test_global_diff() {
        let line = format_diff(&diff(ChangeScope::Global, None), &FormatContext::default());
        assert_eq!(line, "[global] layer_height_mm: 0.2 -> 0.16 (finer layers)");
    }

    #[test]
    fn test_object_diff_german() {
        let ctx = FormatContext::for_language("de-DE");
        assert_eq!(ctx.decimal_separator, ',');
        let line = format_diff(
            &diff(ChangeScope::Object, Some(ObjectTarget::new("Bracket", Some(0)))),
            &ctx,
        );
        assert_eq!(line, "[Bracket, Platte 1] layer_height_mm: 0,2 -> 0,16 (finer layers)");
    }

    #[test]
    fn test_contexts_are_independent() {
        let en = FormatContext::for_language("en");
        let fr = FormatContext::for_language("fr");
        assert_eq!(format_decimal(1.5, &fr), "1,5");
        assert_eq!(format_decimal(1.5, &en), "1.5");
    }

    #[test]
    fn test_unset_from() {
        let mut record = diff(ChangeScope::Global, None);
        record.parameter = "speeds.bridge".to_string();
        record.from = None;
        record.to = SettingValue::Number(50.0);
        record.reason = None;
        assert_eq!(
            format_diff(&record, &FormatContext::default()),
            "[global] speeds.bridge: unset -> 50"
        );
    }

    #[test]
    fn test_format_warning() {
        let warning = ChangeWarning {
            kind: WarningKind::UnknownParameter,
            parameter: "not_a_real_key".to_string(),
            message: "no such setting".to_string(),
        };
        assert_eq!(
            format_warning(&warning, &FormatContext::default()),
            "warning: not_a_real_key [unknown parameter]: no such setting"
        );
    }
}

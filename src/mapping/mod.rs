//! Bidirectional mapping between Bambu Studio config keys and canonical
//! setting keys.
//!
//! # Architecture
//!
//! - **Table**: declarative `MappingEntry` rows plus a speed sub-table
//! - **Adhesion**: one canonical enum derived from raft/brim/skirt keys
//! - **Pass-through**: allow-listed vendor keys copied verbatim
//!
//! Keys outside all three are dropped on the way in and never fabricated
//! on the way out.

pub mod adhesion;
pub mod coerce;
pub mod table;
pub mod types;

use std::collections::BTreeMap;

use tracing::debug;

pub use table::{MappingEntry, ValueKind, WriteMode, MAPPINGS, SPEED_KEYS};
pub use types::{ProcessSettings, SettingValue, VendorConfig, VendorValue, SPEEDS_KEY};

use coerce::{format_flag, format_number, parse_number};

/// Map a vendor config into canonical settings.
///
/// Single-element arrays are unwrapped first. For canonical keys fed by
/// several vendor keys the first entry (in declaration order) that parses
/// wins; later ones are skipped even when present.
pub fn map_vendor_settings(config: &VendorConfig) -> ProcessSettings {
    let mut settings = ProcessSettings::new();

    for entry in MAPPINGS {
        if settings.contains_key(entry.canonical_key) {
            if config.contains_key(entry.vendor_key) {
                debug!(
                    "Skipping {} -> {}: already populated by an earlier key",
                    entry.vendor_key, entry.canonical_key
                );
            }
            continue;
        }
        let Some(raw) = config.get(entry.vendor_key) else {
            continue;
        };
        if let Some(value) = entry.kind.parse(&raw.unwrapped()) {
            settings.insert(entry.canonical_key.to_string(), value);
        }
    }

    let speeds = map_speeds(config);
    if !speeds.is_empty() {
        settings.insert(SPEEDS_KEY.to_string(), SettingValue::Speeds(speeds));
    }

    if let Some(value) = adhesion::infer(config) {
        settings.insert(table::ADHESION_KEY.to_string(), value);
    }

    for key in config.keys() {
        if !table::is_passthrough(key) || settings.contains_key(key) {
            continue;
        }
        if let Some(value) = config.get(key).map(|raw| parse_passthrough(&raw.unwrapped())) {
            settings.insert(key.to_string(), value);
        }
    }

    settings
}

/// Speed roles present in the config, as plain numbers.
pub fn map_speeds(config: &VendorConfig) -> BTreeMap<String, f64> {
    SPEED_KEYS
        .iter()
        .filter_map(|(vendor, role)| {
            let raw = config.get(vendor)?;
            parse_number(&raw.unwrapped()).map(|n| (role.to_string(), n))
        })
        .collect()
}

/// Pass-through values are numbers when numeric, verbatim text otherwise.
pub fn parse_passthrough(raw: &VendorValue) -> SettingValue {
    match parse_number(raw) {
        Some(n) if !raw.first().unwrap_or_default().trim().ends_with('%') => {
            SettingValue::Number(n)
        }
        _ => SettingValue::Text(raw.first().unwrap_or_default().to_string()),
    }
}

/// Whether `value` can be written back for `canonical_key`: every vendor
/// key it maps to must be able to serialize it, and numbers must be finite.
/// Keys outside the table accept any value.
pub fn accepts_value(canonical_key: &str, value: &SettingValue) -> bool {
    if let SettingValue::Number(n) = value {
        if !n.is_finite() {
            return false;
        }
    }
    if canonical_key == SPEEDS_KEY {
        return value
            .as_speeds()
            .is_some_and(|speeds| speeds.values().all(|v| v.is_finite()));
    }
    if canonical_key == table::ADHESION_KEY {
        return matches!(value, SettingValue::Text(_));
    }

    let mut entries = table::entries_for(canonical_key).peekable();
    if entries.peek().is_some() {
        return entries.all(|entry| entry.kind.serialize(value).is_some());
    }
    if table::is_passthrough(canonical_key) {
        return serialize_passthrough(value).is_some();
    }
    true
}

pub fn serialize_passthrough(value: &SettingValue) -> Option<String> {
    match value {
        SettingValue::Number(n) => Some(format_number(*n)),
        SettingValue::Text(s) => Some(s.clone()),
        SettingValue::Bool(b) => Some(format_flag(*b)),
        SettingValue::Speeds(_) => None,
    }
}

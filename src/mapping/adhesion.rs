//! Derived `adhesion_type` mapping.
//!
//! Bambu Studio has no single adhesion setting; it is inferred from
//! `raft_layers`, `brim_width` and `skirt_loops`, and expanded back into the
//! first two on write.

use std::fmt;

use super::coerce::{format_number, parse_number};
use super::table::{
    BRIM_WIDTH_KEY, DEFAULT_BRIM_WIDTH, DEFAULT_RAFT_LAYERS, RAFT_LAYERS_KEY, SKIRT_LOOPS_KEY,
};
use super::types::{SettingValue, VendorConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdhesionType {
    None,
    Skirt,
    Brim,
    Raft,
}

impl AdhesionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdhesionType::None => "none",
            AdhesionType::Skirt => "skirt",
            AdhesionType::Brim => "brim",
            AdhesionType::Raft => "raft",
        }
    }

    /// Unrecognized strings map to `None`, which zeroes both vendor keys.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "raft" => AdhesionType::Raft,
            "brim" => AdhesionType::Brim,
            "skirt" => AdhesionType::Skirt,
            _ => AdhesionType::None,
        }
    }
}

impl fmt::Display for AdhesionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn positive(config: &VendorConfig, key: &str) -> Option<f64> {
    config
        .get(key)
        .and_then(|raw| parse_number(&raw))
        .filter(|n| *n > 0.0)
}

/// Infer the adhesion type. `None` when neither raft nor brim is configured.
///
/// Raft wins over brim when both are positive.
pub fn infer(config: &VendorConfig) -> Option<SettingValue> {
    if !config.contains_key(RAFT_LAYERS_KEY) && !config.contains_key(BRIM_WIDTH_KEY) {
        return None;
    }

    let adhesion = if positive(config, RAFT_LAYERS_KEY).is_some() {
        AdhesionType::Raft
    } else if positive(config, BRIM_WIDTH_KEY).is_some() {
        AdhesionType::Brim
    } else if positive(config, SKIRT_LOOPS_KEY).is_some() {
        AdhesionType::Skirt
    } else {
        AdhesionType::None
    };

    Some(SettingValue::Text(adhesion.as_str().to_string()))
}

/// Expand an adhesion type into `(raft_layers, brim_width)` vendor strings,
/// reusing positive values already present in `original`.
pub fn expand(adhesion: AdhesionType, original: &VendorConfig) -> [(&'static str, String); 2] {
    let existing = |key: &str, default: &str| {
        positive(original, key)
            .map(format_number)
            .unwrap_or_else(|| default.to_string())
    };

    match adhesion {
        AdhesionType::Raft => [
            (RAFT_LAYERS_KEY, existing(RAFT_LAYERS_KEY, DEFAULT_RAFT_LAYERS)),
            (BRIM_WIDTH_KEY, "0".to_string()),
        ],
        AdhesionType::Brim => [
            (RAFT_LAYERS_KEY, "0".to_string()),
            (BRIM_WIDTH_KEY, existing(BRIM_WIDTH_KEY, DEFAULT_BRIM_WIDTH)),
        ],
        AdhesionType::Skirt | AdhesionType::None => [
            (RAFT_LAYERS_KEY, "0".to_string()),
            (BRIM_WIDTH_KEY, "0".to_string()),
        ],
    }
}

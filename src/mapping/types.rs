//! Value types on both sides of the mapping table.
//!
//! `VendorConfig` wraps the raw Bambu Studio JSON map so that every key the
//! mapping table does not understand survives a round trip untouched.
//! `SettingValue` is the typed canonical representation handed to the
//! change engine and to the text-generation service.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::{Map, Value};

use super::coerce::format_number;
use crate::error::{PlateTuneError, Result};

/// Canonical global (or per-object) process settings keyed by canonical key.
pub type ProcessSettings = BTreeMap<String, SettingValue>;

/// Key of the nested speed-role mapping inside `ProcessSettings`.
pub const SPEEDS_KEY: &str = "speeds";

// =============================================================================
// VENDOR SIDE
// =============================================================================

/// A vendor config value: Bambu Studio stores every setting as a string,
/// either bare or replicated across an array (one element per extruder or
/// filament slot).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorValue {
    Scalar(String),
    Array(Vec<String>),
}

impl VendorValue {
    /// Read a JSON value into vendor shape. Numbers and booleans are
    /// stringified; objects, nulls and nested arrays are not vendor values.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(scalar_to_string)
                .collect::<Option<Vec<_>>>()
                .map(VendorValue::Array),
            other => scalar_to_string(other).map(VendorValue::Scalar),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            VendorValue::Scalar(s) => Value::String(s.clone()),
            VendorValue::Array(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
        }
    }

    /// Single-element arrays carry no meaning of their own; collapse them.
    pub fn unwrapped(self) -> Self {
        match self {
            VendorValue::Array(mut items) if items.len() == 1 => {
                VendorValue::Scalar(items.remove(0))
            }
            other => other,
        }
    }

    /// The value numeric parsing looks at: the scalar, or the first element.
    pub fn first(&self) -> Option<&str> {
        match self {
            VendorValue::Scalar(s) => Some(s.as_str()),
            VendorValue::Array(items) => items.first().map(|s| s.as_str()),
        }
    }

    /// Build a new value with the same shape, every element set to `content`.
    ///
    /// An empty array is treated as a one-slot array so the new content is
    /// not silently dropped.
    pub fn with_same_shape(&self, content: &str) -> VendorValue {
        match self {
            VendorValue::Scalar(_) => VendorValue::Scalar(content.to_string()),
            VendorValue::Array(items) => {
                VendorValue::Array(vec![content.to_string(); items.len().max(1)])
            }
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1".to_string() } else { "0".to_string() }),
        _ => None,
    }
}

/// A Bambu Studio vendor config (`project_settings.config`, or the
/// key/value metadata attached to an object in `model_settings.config`).
///
/// Wraps the raw JSON `Map<String, Value>` to preserve every field, including
/// ones that are not vendor values at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VendorConfig {
    data: Map<String, Value>,
}

impl VendorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a vendor config from a JSON string.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let data: Map<String, Value> = serde_json::from_str(json)?;
        Ok(Self { data })
    }

    pub fn from_map(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Build a config from flat key/value string pairs (XML metadata).
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        Self { data }
    }

    /// Render as `project_settings.config` text: 4-space indent, keys in
    /// their original order, trailing newline.
    pub fn to_json_4space(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut ser = Serializer::with_formatter(&mut buf, formatter);
        self.data
            .serialize(&mut ser)
            .map_err(|e| PlateTuneError::Archive(format!("Failed to serialize config: {}", e)))?;
        let mut s = String::from_utf8(buf)
            .map_err(|e| PlateTuneError::Archive(format!("Config is not UTF-8: {}", e)))?;
        if !s.ends_with('\n') {
            s.push('\n');
        }
        Ok(s)
    }

    /// Vendor-shaped view of a key. `None` when absent or not string-like.
    pub fn get(&self, key: &str) -> Option<VendorValue> {
        self.data.get(key).and_then(VendorValue::from_json)
    }

    /// Get all elements of a string array field (a scalar yields one element).
    pub fn get_strings(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(VendorValue::Scalar(s)) => vec![s],
            Some(VendorValue::Array(items)) => items,
            None => Vec::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: VendorValue) {
        self.data.insert(key.to_string(), value.to_json());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(|k| k.as_str())
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn field_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// =============================================================================
// CANONICAL SIDE
// =============================================================================

/// A typed canonical setting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Number(f64),
    Text(String),
    /// Speed role (`wall_outer`, `infill`, ...) to mm/s.
    Speeds(BTreeMap<String, f64>),
}

impl SettingValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_speeds(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            SettingValue::Speeds(map) => Some(map),
            _ => None,
        }
    }

    /// Convert an untrusted JSON value without any coercion between types.
    /// Returns `None` for null, arrays and objects that are not all-numeric.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(SettingValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(SettingValue::Number),
            Value::String(s) => Some(SettingValue::Text(s.clone())),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(SettingValue::Speeds),
            Value::Null | Value::Array(_) => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{}", b),
            SettingValue::Number(n) => write!(f, "{}", format_number(*n)),
            SettingValue::Text(s) => write!(f, "{}", s),
            SettingValue::Speeds(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(role, v)| format!("{}={}", role, format_number(*v)))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vendor_value_from_json_shapes() {
        assert_eq!(
            VendorValue::from_json(&json!("0.2")),
            Some(VendorValue::Scalar("0.2".to_string()))
        );
        assert_eq!(
            VendorValue::from_json(&json!(["220", "225"])),
            Some(VendorValue::Array(vec!["220".to_string(), "225".to_string()]))
        );
        assert_eq!(VendorValue::from_json(&json!({"a": 1})), None);
        assert_eq!(VendorValue::from_json(&json!([["nested"]])), None);
    }

    #[test]
    fn test_unwrapped_only_collapses_single_element_arrays() {
        let single = VendorValue::Array(vec!["15%".to_string()]);
        assert_eq!(single.unwrapped(), VendorValue::Scalar("15%".to_string()));

        let dual = VendorValue::Array(vec!["220".to_string(), "230".to_string()]);
        assert_eq!(dual.clone().unwrapped(), dual);
    }

    #[test]
    fn test_with_same_shape_replicates() {
        let original = VendorValue::Array(vec!["220".to_string(), "230".to_string()]);
        assert_eq!(
            original.with_same_shape("240"),
            VendorValue::Array(vec!["240".to_string(), "240".to_string()])
        );
        let scalar = VendorValue::Scalar("0.2".to_string());
        assert_eq!(scalar.with_same_shape("0.16"), VendorValue::Scalar("0.16".to_string()));
        let empty = VendorValue::Array(vec![]);
        assert_eq!(empty.with_same_shape("1"), VendorValue::Array(vec!["1".to_string()]));
    }

    #[test]
    fn test_vendor_config_round_trip_preserves_unknown_fields() {
        let json = "{\n    \"layer_height\": \"0.2\",\n    \"version\": \"01.09.00.00\",\n    \"nested\": {\n        \"a\": 1\n    }\n}\n";
        let config = VendorConfig::from_json(json).unwrap();
        assert_eq!(config.field_count(), 3);
        assert_eq!(config.get("nested"), None);
        assert_eq!(config.to_json_4space().unwrap(), json);
    }

    #[test]
    fn test_setting_value_from_json_no_coercion() {
        assert_eq!(SettingValue::from_json(&json!(4)), Some(SettingValue::Number(4.0)));
        assert_eq!(
            SettingValue::from_json(&json!("4")),
            Some(SettingValue::Text("4".to_string()))
        );
        assert_eq!(SettingValue::from_json(&json!(null)), None);
        assert_eq!(SettingValue::from_json(&json!([1, 2])), None);
        let speeds = SettingValue::from_json(&json!({"wall_outer": 120})).unwrap();
        assert_eq!(speeds.as_speeds().unwrap().get("wall_outer"), Some(&120.0));
    }

    #[test]
    fn test_setting_value_display() {
        assert_eq!(SettingValue::Number(15.0).to_string(), "15");
        assert_eq!(SettingValue::Number(0.2).to_string(), "0.2");
        assert_eq!(SettingValue::Bool(true).to_string(), "true");
    }
}

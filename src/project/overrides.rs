//! Per-object setting overrides, kept apart from the global settings.
//!
//! Records are keyed by `(plate_index, object_name)`. Without a plate index
//! the key is the object name alone, so two same-named objects that both
//! lack plate context share one record. The archive gives no way to tell
//! them apart, and none is invented here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::mapping::ProcessSettings;

const DEFAULT_OBJECT_NAME: &str = "object";

/// Identity of an object-scoped change or override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectTarget {
    pub object_name: Option<String>,
    pub plate_index: Option<u32>,
}

impl ObjectTarget {
    pub fn new(object_name: impl Into<String>, plate_index: Option<u32>) -> Self {
        Self {
            object_name: Some(object_name.into()),
            plate_index,
        }
    }

    pub fn name(&self) -> &str {
        self.object_name.as_deref().unwrap_or(DEFAULT_OBJECT_NAME)
    }
}

/// Build the store key for an object.
pub fn key(object_name: Option<&str>, plate_index: Option<u32>) -> String {
    let name = object_name.unwrap_or(DEFAULT_OBJECT_NAME);
    match plate_index {
        Some(idx) => format!("{}::{}", idx, name),
        None => name.to_string(),
    }
}

/// The sparse settings that differ from global for one object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectOverride {
    pub object_name: String,
    pub plate_index: Option<u32>,
    pub settings: ProcessSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectOverrideStore {
    records: BTreeMap<String, ObjectOverride>,
}

impl ObjectOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, target: &ObjectTarget) -> Option<&ObjectOverride> {
        self.records
            .get(&key(target.object_name.as_deref(), target.plate_index))
    }

    /// Return the record for `target`, creating an empty one on first use.
    /// Repeated calls for the same target reach the same record.
    pub fn ensure(&mut self, target: &ObjectTarget) -> &mut ObjectOverride {
        self.records
            .entry(key(target.object_name.as_deref(), target.plate_index))
            .or_insert_with(|| ObjectOverride {
                object_name: target.name().to_string(),
                plate_index: target.plate_index,
                settings: ProcessSettings::new(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObjectOverride)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn records(&self) -> impl Iterator<Item = &ObjectOverride> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

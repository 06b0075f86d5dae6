//! Normalized project -> updated archive entries.
//!
//! Only settings that differ from what the original archive normalizes to
//! are written, so an unchanged model round-trips to byte-identical
//! entries. Vendor keys the writer does not touch are left exactly as they
//! were.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::archive::{ArchiveEntries, MODEL_SETTINGS_PATH, PROJECT_SETTINGS_PATH};
use super::bookkeeping::{self, BOOKKEEPING_KEY};
use super::metadata::rewrite_object_metadata;
use super::normalize::{is_useful_config, normalize};
use super::overrides::ObjectTarget;
use super::reader::read_raw;
use super::types::{NormalizedProject, ProjectSummary};
use crate::error::Result;
use crate::mapping::adhesion::{self, AdhesionType};
use crate::mapping::coerce::format_number;
use crate::mapping::table::{self, ADHESION_KEY};
use crate::mapping::{
    serialize_passthrough, ProcessSettings, SettingValue, VendorConfig, VendorValue, WriteMode, MAPPINGS,
    SPEEDS_KEY,
};

/// Ordered vendor writes; a later write to the same key replaces the earlier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VendorWrites {
    writes: Vec<(String, VendorValue)>,
}

impl VendorWrites {
    fn push(&mut self, key: &str, value: VendorValue) {
        match self.writes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.writes.push((key.to_string(), value)),
        }
    }

    /// Write `content` keeping the original shape when there is one.
    fn push_shaped(&mut self, key: &str, content: &str, original: &VendorConfig) {
        let value = match original.get(key) {
            Some(current) => current.with_same_shape(content),
            None => VendorValue::Scalar(content.to_string()),
        };
        self.push(key, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VendorValue)> {
        self.writes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.writes.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Inverse-map canonical settings onto vendor keys.
///
/// `baseline` is what the original vendor data normalizes to; canonical
/// values equal to their baseline are not written at all.
pub fn inverse_map(
    settings: &ProcessSettings,
    baseline: &ProcessSettings,
    original: &VendorConfig,
) -> VendorWrites {
    let mut writes = VendorWrites::default();
    let changed = |key: &str| settings.get(key).filter(|v| baseline.get(key) != Some(*v));

    for entry in MAPPINGS {
        let Some(value) = changed(entry.canonical_key) else {
            continue;
        };
        let Some(content) = entry.kind.serialize(value) else {
            debug!("{} = {} is not representable as {}", entry.canonical_key, value, entry.vendor_key);
            continue;
        };
        let current = original.get(entry.vendor_key);
        if current
            .as_ref()
            .and_then(|c| entry.kind.parse(&c.clone().unwrapped()))
            .as_ref()
            == Some(value)
        {
            continue;
        }
        match entry.mode {
            WriteMode::Shaped => writes.push_shaped(entry.vendor_key, &content, original),
            WriteMode::Direct => writes.push(entry.vendor_key, VendorValue::Scalar(content)),
        }
    }

    if let Some(SettingValue::Speeds(speeds)) = settings.get(SPEEDS_KEY) {
        let base_speeds = baseline.get(SPEEDS_KEY).and_then(SettingValue::as_speeds);
        for (role, speed) in speeds {
            if base_speeds.and_then(|b| b.get(role)) == Some(speed) {
                continue;
            }
            match table::vendor_key_for_speed_role(role) {
                Some(vendor_key) => writes.push_shaped(vendor_key, &format_number(*speed), original),
                None => debug!("No vendor key for speed role {}", role),
            }
        }
    }

    if let Some(SettingValue::Text(kind)) = changed(ADHESION_KEY) {
        for (vendor_key, content) in adhesion::expand(AdhesionType::parse_lenient(kind), original) {
            writes.push_shaped(vendor_key, &content, original);
        }
    }

    for (key, value) in settings {
        if !table::is_passthrough(key) || baseline.get(key) == Some(value) {
            continue;
        }
        if let Some(content) = serialize_passthrough(value) {
            writes.push_shaped(key, &content, original);
        }
    }

    writes
}

/// Printer and filament descriptors written back when they were edited.
fn echo_back_writes(
    summary: &ProjectSummary,
    baseline: &ProjectSummary,
    original: &VendorConfig,
    writes: &mut VendorWrites,
) {
    if let Some(diameter) = summary.printer.nozzle_diameter_mm {
        if baseline.printer.nozzle_diameter_mm != Some(diameter) {
            writes.push_shaped("nozzle_diameter", &format_number(diameter), original);
        }
    }

    let materials: Vec<Option<&String>> = summary.filaments.iter().map(|f| f.material.as_ref()).collect();
    let base_materials: Vec<Option<&String>> = baseline.filaments.iter().map(|f| f.material.as_ref()).collect();
    if materials != base_materials && materials.iter().all(Option::is_some) && !materials.is_empty() {
        let values: Vec<String> = materials.into_iter().flatten().cloned().collect();
        let value = match original.get("filament_type") {
            Some(VendorValue::Scalar(_)) if values.len() == 1 => VendorValue::Scalar(values[0].clone()),
            _ => VendorValue::Array(values),
        };
        writes.push("filament_type", value);
    }

    if let Some(profile) = &summary.base_profile {
        if baseline.base_profile.as_ref() != Some(profile) {
            writes.push_shaped("print_settings_id", profile, original);
        }
    }
}

/// Result of applying global writes to a vendor config.
#[derive(Debug, Clone)]
pub struct ConfigUpdate {
    pub config: VendorConfig,
    /// Every vendor key written.
    pub touched: Vec<String>,
    /// Touched keys whose value differs from the original.
    pub changed: Vec<String>,
}

/// Apply writes to a copy of `original` and refresh the bookkeeping field.
pub fn apply_writes(original: &VendorConfig, writes: &VendorWrites) -> ConfigUpdate {
    let mut config = original.clone();
    let mut touched = Vec::new();
    let mut changed = Vec::new();

    for (key, value) in writes.iter() {
        let new_json = value.to_json();
        if original.raw().get(key) != Some(&new_json) {
            changed.push(key.to_string());
        }
        config.set(key, value.clone());
        touched.push(key.to_string());
    }

    if !changed.is_empty() {
        let groups = bookkeeping::updated_groups(original, changed.iter().map(String::as_str));
        config.set(BOOKKEEPING_KEY, groups);
    }

    ConfigUpdate {
        config,
        touched,
        changed,
    }
}

/// Build the updated archive entries for `project`.
///
/// `original` must be the entries the project was parsed from. Entries
/// other than the project config and model settings are copied verbatim;
/// neither of those two is created when the archive did not have it.
pub fn build_updated_archive_entries(
    project: &NormalizedProject,
    original: &ArchiveEntries,
) -> Result<ArchiveEntries> {
    let raw = read_raw(original)?;
    let baseline = normalize(&raw);
    let mut entries = original.clone();

    match raw.config.as_ref().filter(|c| is_useful_config(c)) {
        Some(config) => {
            let mut writes = inverse_map(&project.settings, &baseline.settings, config);
            echo_back_writes(&project.summary, &baseline.summary, config, &mut writes);
            if !writes.is_empty() {
                let update = apply_writes(config, &writes);
                info!(
                    "Project config: {} keys touched, {} changed",
                    update.touched.len(),
                    update.changed.len()
                );
                if !update.changed.is_empty() {
                    entries.insert(PROJECT_SETTINGS_PATH, update.config.to_json_4space()?.into_bytes());
                }
            }
        }
        None => {
            if project.settings != baseline.settings {
                warn!("Archive has no usable project config; global setting changes are not persisted");
            }
        }
    }

    if let (Some(model), Some(xml)) = (raw.model_settings.as_ref(), original.get_str(MODEL_SETTINGS_PATH)?) {
        let mut updates: HashMap<String, Vec<(String, String)>> = HashMap::new();

        for (_, record) in project.object_overrides.iter() {
            let Some(object_id) = model.object_id_for(&record.object_name, record.plate_index) else {
                warn!(
                    "Override for {} (plate {:?}) matches no object; not persisted",
                    record.object_name, record.plate_index
                );
                continue;
            };
            let empty = ProcessSettings::new();
            let baseline_settings = baseline
                .object_overrides
                .read(&ObjectTarget::new(record.object_name.clone(), record.plate_index))
                .map_or(&empty, |r| &r.settings);
            let object_config = model
                .objects
                .iter()
                .find(|o| o.id.as_deref() == Some(object_id))
                .map(|o| VendorConfig::from_pairs(o.metadata.iter().cloned()))
                .unwrap_or_default();

            let pairs: Vec<(String, String)> = inverse_map(&record.settings, baseline_settings, &object_config)
                .iter()
                .filter_map(|(key, value)| value.first().map(|v| (key.to_string(), v.to_string())))
                .filter(|(key, value)| object_config.get(key).as_ref().and_then(VendorValue::first) != Some(value.as_str()))
                .collect();
            if !pairs.is_empty() {
                debug!("Object {} ({}): {} metadata keys", record.object_name, object_id, pairs.len());
                updates.entry(object_id.to_string()).or_default().extend(pairs);
            }
        }

        if !updates.is_empty() {
            info!("Writing overrides for {} objects", updates.len());
            let rewritten = rewrite_object_metadata(xml, &updates)?;
            entries.insert(MODEL_SETTINGS_PATH, rewritten.into_bytes());
        }
    }

    Ok(entries)
}

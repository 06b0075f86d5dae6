//! Build the normalized project model from the raw vendor inputs.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::bookkeeping;
use super::metadata::{ModelSettings, PlateInfo};
use super::overrides::{ObjectOverrideStore, ObjectTarget};
use super::types::{
    FilamentInfo, GeometryHints, NormalizedProject, Plate, PlateObject, PrinterInfo, ProjectSummary,
};
use crate::mapping::coerce::parse_number;
use crate::mapping::{map_vendor_settings, ProcessSettings, SettingValue, VendorConfig, VendorValue, SPEEDS_KEY};

/// A vendor config without any of these keys is noise and is ignored.
pub const SIGNAL_KEYS: &[&str] = &[
    "layer_height",
    "wall_loops",
    "sparse_infill_density",
    "nozzle_temperature",
    "print_settings_id",
];

/// Vendor inputs read from an archive, before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawProject {
    pub config: Option<VendorConfig>,
    pub model_settings: Option<ModelSettings>,
    /// Zero-based plate index -> `plate_<n>.json` contents.
    pub plate_infos: BTreeMap<u32, PlateInfo>,
}

pub fn is_useful_config(config: &VendorConfig) -> bool {
    SIGNAL_KEYS.iter().any(|key| config.contains_key(key))
}

/// Values for keys every consumer may read without checking for absence.
pub fn default_settings() -> ProcessSettings {
    let number = |n: f64| SettingValue::Number(n);
    let text = |s: &str| SettingValue::Text(s.to_string());

    ProcessSettings::from([
        ("layer_height_mm".to_string(), number(0.2)),
        ("wall_line_count".to_string(), number(2.0)),
        ("top_layers".to_string(), number(5.0)),
        ("bottom_layers".to_string(), number(3.0)),
        ("infill_density_percent".to_string(), number(15.0)),
        ("infill_pattern".to_string(), text("grid")),
        ("nozzle_temp_c".to_string(), number(220.0)),
        ("bed_temp_c".to_string(), number(55.0)),
        ("fan_min_speed_percent".to_string(), number(100.0)),
        ("fan_max_speed_percent".to_string(), number(100.0)),
        (SPEEDS_KEY.to_string(), SettingValue::Speeds(BTreeMap::new())),
        ("supports_enabled".to_string(), SettingValue::Bool(false)),
        ("adhesion_type".to_string(), text("none")),
    ])
}

/// Merge `overlay` onto `base`. Speed maps merge per role.
fn merge_settings(base: &mut ProcessSettings, overlay: ProcessSettings) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(SettingValue::Speeds(existing)), SettingValue::Speeds(incoming)) => {
                existing.extend(incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn global_settings(config: Option<&VendorConfig>, model: Option<&ModelSettings>) -> ProcessSettings {
    let mut settings = model
        .map(|m| map_vendor_settings(&VendorConfig::from_pairs(m.metadata.iter().cloned())))
        .unwrap_or_default();
    if !settings.is_empty() {
        debug!("{} settings from project metadata", settings.len());
    }

    if let Some(config) = config {
        merge_settings(&mut settings, map_vendor_settings(config));
    }

    for (key, value) in default_settings() {
        settings.entry(key).or_insert(value);
    }
    settings
}

fn nth_number(config: &VendorConfig, key: &str, index: usize) -> Option<f64> {
    config
        .get_strings(key)
        .get(index)
        .and_then(|s| parse_number(&VendorValue::Scalar(s.clone())))
}

fn nth_text(config: &VendorConfig, key: &str, index: usize) -> Option<String> {
    config
        .get_strings(key)
        .get(index)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn summary_from(
    config: Option<&VendorConfig>,
    plate_infos: &BTreeMap<u32, PlateInfo>,
) -> ProjectSummary {
    let empty = VendorConfig::new();
    let config = config.unwrap_or(&empty);
    let first_plate = plate_infos.values().next();

    let printer = PrinterInfo {
        name: nth_text(config, "printer_model", 0).or_else(|| nth_text(config, "printer_settings_id", 0)),
        nozzle_diameter_mm: nth_number(config, "nozzle_diameter", 0)
            .or_else(|| first_plate.and_then(|p| p.nozzle_diameter)),
        bed_type: nth_text(config, "curr_bed_type", 0)
            .or_else(|| first_plate.and_then(|p| p.bed_type.clone())),
    };

    let slots = config
        .get_strings("filament_type")
        .len()
        .max(config.get_strings("filament_settings_id").len());
    let filaments = (0..slots)
        .map(|i| FilamentInfo {
            material: nth_text(config, "filament_type", i),
            profile_name: nth_text(config, "filament_settings_id", i),
            nozzle_temp_min_c: nth_number(config, "nozzle_temperature_range_low", i),
            nozzle_temp_max_c: nth_number(config, "nozzle_temperature_range_high", i),
        })
        .collect();

    ProjectSummary {
        printer,
        filaments,
        base_profile: nth_text(config, "print_settings_id", 0),
        plates: None,
    }
}

/// Per-object overrides plus the plate list they hang off.
fn objects_and_plates(
    model: &ModelSettings,
    plate_infos: &BTreeMap<u32, PlateInfo>,
) -> (ObjectOverrideStore, Option<Vec<Plate>>) {
    let mut store = ObjectOverrideStore::new();
    let mut object_settings: BTreeMap<&str, ProcessSettings> = BTreeMap::new();

    for object in &model.objects {
        let settings = map_vendor_settings(&VendorConfig::from_pairs(object.metadata.iter().cloned()));
        if settings.is_empty() {
            continue;
        }
        let plate_index = object.id.as_deref().and_then(|id| model.plate_index_of(id));
        let target = ObjectTarget {
            object_name: object.name.clone(),
            plate_index,
        };
        debug!("Object override for {:?} on plate {:?}: {} keys", target.name(), plate_index, settings.len());
        store.ensure(&target).settings.extend(settings.clone());
        if let Some(id) = object.id.as_deref() {
            object_settings.insert(id, settings);
        }
    }

    if model.plates.is_empty() {
        return (store, None);
    }

    let plates = model
        .plates
        .iter()
        .filter_map(|entry| {
            let index = entry.index()?;
            let info = plate_infos.get(&index);
            let objects = entry
                .object_ids
                .iter()
                .filter_map(|id| model.objects.iter().find(|o| o.id.as_deref() == Some(id.as_str())))
                .map(|object| {
                    let name = object.name.clone().unwrap_or_else(|| "object".to_string());
                    let geometry = info
                        .and_then(|i| i.bbox_objects.iter().find(|b| b.name.as_deref() == Some(name.as_str())))
                        .and_then(|b| b.bounding_box())
                        .map(|bbox| GeometryHints::from_bbox(&bbox));
                    PlateObject {
                        settings: object
                            .id
                            .as_deref()
                            .and_then(|id| object_settings.get(id))
                            .cloned()
                            .unwrap_or_default(),
                        name,
                        object_id: object.id.clone(),
                        geometry,
                    }
                })
                .collect();
            Some(Plate {
                index,
                name: entry.name.clone(),
                objects,
            })
        })
        .collect();

    (store, Some(plates))
}

/// Normalize raw vendor inputs into one canonical project model.
///
/// Neither a useful config nor model settings means there is nothing to
/// normalize: the result is empty, without defaults.
pub fn normalize(raw: &RawProject) -> NormalizedProject {
    let config = raw.config.as_ref().filter(|c| {
        let useful = is_useful_config(c);
        if !useful {
            warn!("Project config has no recognizable print settings; ignoring it");
        }
        useful
    });
    let model = raw.model_settings.as_ref();

    if config.is_none() && model.is_none() {
        info!("Archive carries no project metadata; returning an empty model");
        return NormalizedProject::default();
    }

    let settings = global_settings(config, model);
    let mut summary = summary_from(config, &raw.plate_infos);
    let (object_overrides, plates) = model
        .map(|m| objects_and_plates(m, &raw.plate_infos))
        .unwrap_or_default();
    summary.plates = plates;

    let user_modified_settings = config
        .map(bookkeeping::user_modified_settings)
        .unwrap_or_default();

    info!(
        "Normalized project: {} settings, {} object overrides, {} plates, {} user-modified keys",
        settings.len(),
        object_overrides.len(),
        summary.plates.as_ref().map_or(0, Vec::len),
        user_modified_settings.len()
    );

    NormalizedProject {
        summary,
        settings,
        object_overrides,
        user_modified_settings,
        plate_images: Vec::new(),
    }
}

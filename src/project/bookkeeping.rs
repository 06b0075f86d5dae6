//! The "modified from system defaults" bookkeeping field.
//!
//! Bambu Studio stores it as `different_settings_to_system`: an array of
//! semicolon-joined key lists, one group for the print profile, one per
//! filament and one for the printer. It is both the source of the
//! user-modified set and something the writer has to keep current.

use std::collections::BTreeSet;

use crate::mapping::{VendorConfig, VendorValue};

pub const BOOKKEEPING_KEY: &str = "different_settings_to_system";

/// Always present in the filament group once it holds any key.
pub const FILAMENT_SENTINEL: &str = "compatible_printers";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Print,
    Filament,
    Printer,
}

impl Category {
    fn slot(self) -> usize {
        match self {
            Category::Print => 0,
            Category::Filament => 1,
            Category::Printer => 2,
        }
    }
}

const FILAMENT_KEYS: &[&str] = &[
    "nozzle_temperature",
    "nozzle_temperature_initial_layer",
    "nozzle_temperature_range_low",
    "nozzle_temperature_range_high",
    "eng_plate_temp",
    "eng_plate_temp_initial_layer",
    "hot_plate_temp",
    "hot_plate_temp_initial_layer",
    "textured_plate_temp",
    "textured_plate_temp_initial_layer",
    "cool_plate_temp",
    "cool_plate_temp_initial_layer",
    "fan_min_speed",
    "fan_max_speed",
    "fan_cooling_layer_time",
    "overhang_fan_speed",
    "overhang_fan_threshold",
    "close_fan_the_first_x_layers",
    "slow_down_layer_time",
    "slow_down_min_speed",
    "reduce_fan_stop_start_freq",
    "additional_cooling_fan_speed",
    "compatible_printers",
];

const PRINTER_KEYS: &[&str] = &[
    "nozzle_diameter",
    "retraction_length",
    "retraction_speed",
    "deretraction_speed",
    "z_hop",
    "z_hop_types",
    "wipe",
    "wipe_distance",
    "printer_model",
    "printer_variant",
    "curr_bed_type",
];

/// Static category of a vendor key; anything unrecognized is a print key.
pub fn category_of(key: &str) -> Category {
    if key.starts_with("filament_") || FILAMENT_KEYS.contains(&key) {
        Category::Filament
    } else if key.starts_with("printer_") || key.starts_with("machine_") || PRINTER_KEYS.contains(&key) {
        Category::Printer
    } else {
        Category::Print
    }
}

fn split_group(group: &str) -> impl Iterator<Item = &str> {
    group.split(';').map(str::trim).filter(|k| !k.is_empty())
}

/// Read the bookkeeping field into exactly three groups.
///
/// Multi-filament projects store one group per filament between the print
/// and printer groups; those are folded into the single filament group.
pub fn read_groups(config: &VendorConfig) -> [BTreeSet<String>; 3] {
    let raw = config.get_strings(BOOKKEEPING_KEY);
    let mut groups: [BTreeSet<String>; 3] = Default::default();

    let last = raw.len().saturating_sub(1);
    for (i, group) in raw.iter().enumerate() {
        let slot = match i {
            0 => 0,
            _ if i == last && raw.len() >= 3 => 2,
            _ => 1,
        };
        groups[slot].extend(split_group(group).map(str::to_string));
    }
    groups
}

/// Flattened, deduplicated user-modified keys in first-seen order,
/// original casing kept.
pub fn user_modified_settings(config: &VendorConfig) -> Vec<String> {
    let mut seen = BTreeSet::new();
    config
        .get_strings(BOOKKEEPING_KEY)
        .iter()
        .flat_map(|group| split_group(group).map(str::to_string).collect::<Vec<_>>())
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// Lower-case and strip everything but ASCII letters and digits.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Exact or normalized match of `candidate` against the user-modified set.
pub fn is_user_modified(user_modified: &[String], candidate: &str) -> bool {
    let normalized = normalize_key(candidate);
    user_modified
        .iter()
        .any(|key| key == candidate || normalize_key(key) == normalized)
}

/// Recompute the bookkeeping field for the vendor keys whose value changed.
///
/// Each key lands in the group it already occupied, else in its static
/// category. Returns the new three-group value.
pub fn updated_groups<'a, I>(config: &VendorConfig, changed_keys: I) -> VendorValue
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups = read_groups(config);

    for key in changed_keys {
        if groups.iter().any(|g| g.contains(key)) {
            continue;
        }
        groups[category_of(key).slot()].insert(key.to_string());
    }

    let filament = Category::Filament.slot();
    if !groups[filament].is_empty() {
        groups[filament].insert(FILAMENT_SENTINEL.to_string());
    }

    VendorValue::Array(
        groups
            .iter()
            .map(|g| g.iter().map(String::as_str).collect::<Vec<_>>().join(";"))
            .collect(),
    )
}

//! The declarative vendor <-> canonical mapping table.
//!
//! Declaration order matters: when several vendor keys feed the same
//! canonical key, the first one that parses wins.

use super::coerce::{format_flag, format_number, parse_flag, parse_number, parse_percent, parse_text};
use super::types::{SettingValue, VendorValue, SPEEDS_KEY};

/// How a vendor string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    /// Numeric, written back without a fractional part.
    Integer,
    /// `"15%"` <-> `15`.
    Percent,
    /// `"1"`/`"0"` <-> bool.
    Flag,
    Text,
}

impl ValueKind {
    /// Vendor value -> canonical value, `None` when absent or invalid.
    pub fn parse(self, raw: &VendorValue) -> Option<SettingValue> {
        match self {
            ValueKind::Number | ValueKind::Integer => parse_number(raw).map(SettingValue::Number),
            ValueKind::Percent => parse_percent(raw).map(SettingValue::Number),
            ValueKind::Flag => parse_flag(raw).map(SettingValue::Bool),
            ValueKind::Text => parse_text(raw).map(SettingValue::Text),
        }
    }

    /// Canonical value -> vendor string, `None` when not representable.
    pub fn serialize(self, value: &SettingValue) -> Option<String> {
        match (self, value) {
            (ValueKind::Number, SettingValue::Number(n)) => Some(format_number(*n)),
            (ValueKind::Integer, SettingValue::Number(n)) => Some(format_number(n.round())),
            (ValueKind::Percent, SettingValue::Number(n)) => Some(format!("{}%", format_number(*n))),
            (ValueKind::Flag, SettingValue::Bool(b)) => Some(format_flag(*b)),
            (ValueKind::Flag, SettingValue::Text(s)) => match s.as_str() {
                "1" | "true" => Some(format_flag(true)),
                "0" | "false" => Some(format_flag(false)),
                _ => None,
            },
            (ValueKind::Text, SettingValue::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Shape rule applied on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Keep the original scalar/array shape (and array length).
    Shaped,
    /// Always write a bare scalar.
    Direct,
}

/// One row of the mapping table.
#[derive(Debug, Clone, Copy)]
pub struct MappingEntry {
    pub vendor_key: &'static str,
    pub canonical_key: &'static str,
    pub kind: ValueKind,
    pub mode: WriteMode,
}

const fn shaped(vendor_key: &'static str, canonical_key: &'static str, kind: ValueKind) -> MappingEntry {
    MappingEntry {
        vendor_key,
        canonical_key,
        kind,
        mode: WriteMode::Shaped,
    }
}

const fn direct(vendor_key: &'static str, canonical_key: &'static str, kind: ValueKind) -> MappingEntry {
    MappingEntry {
        vendor_key,
        canonical_key,
        kind,
        mode: WriteMode::Direct,
    }
}

use ValueKind::{Flag, Integer, Number, Percent, Text};

pub const MAPPINGS: &[MappingEntry] = &[
    shaped("layer_height", "layer_height_mm", Number),
    shaped("initial_layer_print_height", "first_layer_height_mm", Number),
    shaped("wall_loops", "wall_line_count", Integer),
    shaped("top_shell_layers", "top_layers", Integer),
    shaped("bottom_shell_layers", "bottom_layers", Integer),
    shaped("sparse_infill_density", "infill_density_percent", Percent),
    direct("sparse_infill_pattern", "infill_pattern", Text),
    direct("top_surface_pattern", "top_surface_pattern", Text),
    shaped("nozzle_temperature", "nozzle_temp_c", Number),
    shaped("nozzle_temperature_initial_layer", "first_layer_nozzle_temp_c", Number),
    shaped("eng_plate_temp", "bed_temp_c", Number),
    shaped("hot_plate_temp", "bed_temp_c", Number),
    shaped("textured_plate_temp", "bed_temp_c", Number),
    shaped("cool_plate_temp", "bed_temp_c", Number),
    shaped("fan_min_speed", "fan_min_speed_percent", Number),
    shaped("fan_max_speed", "fan_max_speed_percent", Number),
    shaped("overhang_fan_speed", "overhang_fan_speed_percent", Number),
    shaped("enable_support", "supports_enabled", Flag),
    direct("support_type", "support_type", Text),
    shaped("support_threshold_angle", "support_threshold_angle_deg", Number),
    direct("seam_position", "seam_position", Text),
    direct("ironing_type", "ironing_type", Text),
    direct("wall_generator", "wall_generator", Text),
    direct("print_sequence", "print_sequence", Text),
    shaped("enable_prime_tower", "prime_tower_enabled", Flag),
    shaped("spiral_mode", "spiral_mode", Flag),
    shaped("retraction_length", "retraction_length_mm", Number),
    shaped("z_hop", "z_hop_mm", Number),
    shaped("filament_max_volumetric_speed", "max_volumetric_speed_mm3s", Number),
    shaped("elefant_foot_compensation", "elephant_foot_compensation_mm", Number),
    shaped("skirt_loops", "skirt_loops", Integer),
];

/// Vendor speed key -> canonical speed role (under `speeds.`).
pub const SPEED_KEYS: &[(&str, &str)] = &[
    ("outer_wall_speed", "wall_outer"),
    ("inner_wall_speed", "wall_inner"),
    ("sparse_infill_speed", "infill"),
    ("internal_solid_infill_speed", "solid_infill"),
    ("top_surface_speed", "top_surface"),
    ("initial_layer_speed", "first_layer"),
    ("gap_infill_speed", "gap_fill"),
    ("support_speed", "support"),
    ("bridge_speed", "bridge"),
    ("travel_speed", "travel"),
];

/// Canonical key of the derived adhesion mapping.
pub const ADHESION_KEY: &str = "adhesion_type";
pub const RAFT_LAYERS_KEY: &str = "raft_layers";
pub const BRIM_WIDTH_KEY: &str = "brim_width";
pub const SKIRT_LOOPS_KEY: &str = "skirt_loops";
pub const DEFAULT_RAFT_LAYERS: &str = "1";
pub const DEFAULT_BRIM_WIDTH: &str = "5";

/// Vendor keys copied verbatim (canonical key == vendor key).
pub const PASSTHROUGH_KEYS: &[&str] = &[
    "line_width",
    "initial_layer_line_width",
    "outer_wall_line_width",
    "inner_wall_line_width",
    "sparse_infill_line_width",
    "internal_solid_infill_line_width",
    "top_surface_line_width",
    "support_line_width",
    "xy_hole_compensation",
    "xy_contour_compensation",
    "resolution",
    "wall_infill_order",
    "only_one_wall_top",
    "only_one_wall_first_layer",
    "detect_thin_wall",
    "detect_overhang_wall",
    "ensure_vertical_shell_thickness",
    "infill_wall_overlap",
    "infill_combination",
    "infill_direction",
    "minimum_sparse_infill_area",
    "bottom_surface_pattern",
    "internal_solid_infill_pattern",
    "ironing_flow",
    "ironing_spacing",
    "ironing_speed",
    "bridge_flow",
    "thick_bridges",
    "enable_overhang_speed",
    "overhang_1_4_speed",
    "overhang_2_4_speed",
    "overhang_3_4_speed",
    "overhang_4_4_speed",
    "support_on_build_plate_only",
    "support_interface_top_layers",
    "support_interface_bottom_layers",
    "support_interface_spacing",
    "support_base_pattern",
    "support_base_pattern_spacing",
    "support_top_z_distance",
    "support_bottom_z_distance",
    "support_object_xy_distance",
    "tree_support_branch_angle",
    "tree_support_wall_count",
    "independent_support_layer_height",
    "raft_contact_distance",
    "raft_expansion",
    "raft_first_layer_density",
    "skirt_distance",
    "skirt_height",
    "brim_object_gap",
    "brim_type",
    "draft_shield",
    "fuzzy_skin",
    "fuzzy_skin_thickness",
    "fuzzy_skin_point_distance",
    "reduce_infill_retraction",
    "reduce_crossing_wall",
    "max_travel_detour_distance",
    "default_acceleration",
    "outer_wall_acceleration",
    "inner_wall_acceleration",
    "top_surface_acceleration",
    "initial_layer_acceleration",
    "travel_acceleration",
    "slow_down_layer_time",
    "slow_down_min_speed",
    "close_fan_the_first_x_layers",
    "filament_flow_ratio",
];

/// Script and template fields are never echoed back as optimizable settings.
pub fn is_script_key(key: &str) -> bool {
    key.ends_with("_gcode")
        || key.ends_with("_template")
        || key == "post_process"
        || key == "filename_format"
}

/// Find the table entries whose canonical key is `canonical_key`.
pub fn entries_for(canonical_key: &str) -> impl Iterator<Item = &'static MappingEntry> + '_ {
    MAPPINGS.iter().filter(move |e| e.canonical_key == canonical_key)
}

pub fn entry_for_vendor_key(vendor_key: &str) -> Option<&'static MappingEntry> {
    MAPPINGS.iter().find(|e| e.vendor_key == vendor_key)
}

pub fn speed_role_for_vendor_key(vendor_key: &str) -> Option<&'static str> {
    SPEED_KEYS
        .iter()
        .find(|(vendor, _)| *vendor == vendor_key)
        .map(|(_, role)| *role)
}

pub fn vendor_key_for_speed_role(role: &str) -> Option<&'static str> {
    SPEED_KEYS
        .iter()
        .find(|(_, r)| *r == role)
        .map(|(vendor, _)| *vendor)
}

/// True for keys that may be copied verbatim: on the allow-list, not covered
/// by an explicit mapping, and never a script field.
pub fn is_passthrough(key: &str) -> bool {
    PASSTHROUGH_KEYS.contains(&key)
        && !is_script_key(key)
        && entry_for_vendor_key(key).is_none()
        && speed_role_for_vendor_key(key).is_none()
}

/// Every vendor key a canonical parameter path is fed from.
///
/// `"speeds.wall_outer"` resolves through the speed sub-table, the adhesion
/// key expands to its two vendor keys, and pass-through keys map to
/// themselves.
pub fn vendor_keys_for(parameter: &str) -> Vec<&'static str> {
    if let Some(rest) = parameter.strip_prefix(&format!("{}.", SPEEDS_KEY)) {
        if rest.contains('.') {
            return Vec::new();
        }
        return vendor_key_for_speed_role(rest).into_iter().collect();
    }
    if parameter == ADHESION_KEY {
        return vec![RAFT_LAYERS_KEY, BRIM_WIDTH_KEY];
    }
    let mut keys: Vec<&'static str> = entries_for(parameter).map(|e| e.vendor_key).collect();
    if keys.is_empty() {
        if let Some(key) = PASSTHROUGH_KEYS.iter().find(|k| **k == parameter) {
            keys.push(*key);
        }
    }
    keys
}

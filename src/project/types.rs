//! The normalized project model produced by the archive parser.

use serde::{Deserialize, Serialize};

use super::overrides::ObjectOverrideStore;
use crate::mapping::ProcessSettings;

/// Ratio of largest extent to smallest footprint extent above which an
/// object counts as slender.
pub const SLENDER_RATIO: f64 = 4.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrinterInfo {
    pub name: Option<String>,
    pub nozzle_diameter_mm: Option<f64>,
    pub bed_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilamentInfo {
    /// Material family (`PLA`, `PETG`, ...).
    pub material: Option<String>,
    pub profile_name: Option<String>,
    pub nozzle_temp_min_c: Option<f64>,
    pub nozzle_temp_max_c: Option<f64>,
}

/// Axis-aligned bounding box in millimetres. Boxes from 2D plate info have
/// a zero z extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Parse `[x0, y0, x1, y1]` or `[x0, y0, z0, x1, y1, z1]`.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        match values {
            [x0, y0, x1, y1] => Some(Self {
                min: [*x0, *y0, 0.0],
                max: [*x1, *y1, 0.0],
            }),
            [x0, y0, z0, x1, y1, z1] => Some(Self {
                min: [*x0, *y0, *z0],
                max: [*x1, *y1, *z1],
            }),
            _ => None,
        }
    }

    pub fn extents(&self) -> [f64; 3] {
        [
            (self.max[0] - self.min[0]).abs(),
            (self.max[1] - self.min[1]).abs(),
            (self.max[2] - self.min[2]).abs(),
        ]
    }
}

/// Shape hints derived from a bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryHints {
    pub extents_mm: [f64; 3],
    pub max_extent_mm: f64,
    pub min_extent_mm: f64,
    pub is_slender: bool,
}

impl GeometryHints {
    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        let extents = bbox.extents();
        let max_extent = extents.iter().copied().fold(0.0_f64, f64::max);
        let min_extent = extents.iter().copied().fold(f64::INFINITY, f64::min);
        let footprint = extents[0].min(extents[1]);
        let is_slender = footprint > 0.0 && max_extent / footprint > SLENDER_RATIO;

        Self {
            extents_mm: extents,
            max_extent_mm: max_extent,
            min_extent_mm: min_extent,
            is_slender,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlateObject {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<GeometryHints>,
    /// Plate-level view of this object's overrides. Kept in step with the
    /// override store by the change engine.
    #[serde(default, skip_serializing_if = "ProcessSettings::is_empty")]
    pub settings: ProcessSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plate {
    /// Zero-based plate index.
    pub index: u32,
    pub name: Option<String>,
    pub objects: Vec<PlateObject>,
}

impl Plate {
    pub fn object(&self, name: &str) -> Option<&PlateObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn object_mut(&mut self, name: &str) -> Option<&mut PlateObject> {
        self.objects.iter_mut().find(|o| o.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub printer: PrinterInfo,
    pub filaments: Vec<FilamentInfo>,
    pub base_profile: Option<String>,
    /// Present only when the archive describes plates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plates: Option<Vec<Plate>>,
}

/// An embedded plate preview, ready to send as a data URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlateImage {
    pub plate_index: Option<u32>,
    pub name: String,
    pub data_url: String,
}

/// Everything the optimizer knows about one project archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedProject {
    pub summary: ProjectSummary,
    pub settings: ProcessSettings,
    pub object_overrides: ObjectOverrideStore,
    pub user_modified_settings: Vec<String>,
    #[serde(skip)]
    pub plate_images: Vec<PlateImage>,
}

impl NormalizedProject {
    pub fn plates(&self) -> &[Plate] {
        self.summary.plates.as_deref().unwrap_or_default()
    }

    /// Find the plate for an object-scoped target: the given plate when an
    /// index is supplied, otherwise the first plate holding that object.
    pub fn resolve_plate(&self, object_name: &str, plate_index: Option<u32>) -> Option<u32> {
        self.plates()
            .iter()
            .filter(|p| plate_index.map_or(true, |idx| p.index == idx))
            .find(|p| p.object(object_name).is_some())
            .map(|p| p.index)
    }

    pub fn plate_object_mut(&mut self, plate_index: u32, object_name: &str) -> Option<&mut PlateObject> {
        self.summary
            .plates
            .as_mut()?
            .iter_mut()
            .find(|p| p.index == plate_index)?
            .object_mut(object_name)
    }
}

//! Archive -> normalized project.

use std::collections::BTreeMap;

use tracing::{info, warn};

use super::archive::{ArchiveEntries, METADATA_DIR, MODEL_SETTINGS_PATH, PROJECT_SETTINGS_PATH};
use super::metadata::{parse_model_settings, parse_plate_info, plate_index_from_path};
use super::normalize::{normalize, RawProject};
use super::previews::{collect_plate_images, MAX_PREVIEW_DIMENSION};
use super::types::NormalizedProject;
use crate::error::{PlateTuneError, Result};
use crate::mapping::VendorConfig;

fn is_plate_info(path: &str) -> bool {
    path.strip_prefix(METADATA_DIR)
        .map(|name| !name.contains('/') && name.starts_with("plate_") && name.ends_with(".json"))
        .unwrap_or(false)
}

/// Pull the vendor inputs out of the archive entries.
///
/// A malformed project config is fatal. A malformed plate JSON only loses
/// that plate's geometry.
pub fn read_raw(entries: &ArchiveEntries) -> Result<RawProject> {
    let config = entries
        .get_str(PROJECT_SETTINGS_PATH)?
        .map(|json| {
            VendorConfig::from_json(json).map_err(|source| PlateTuneError::Format {
                entry: PROJECT_SETTINGS_PATH.to_string(),
                source,
            })
        })
        .transpose()?;

    let model_settings = entries
        .get_str(MODEL_SETTINGS_PATH)?
        .map(parse_model_settings)
        .transpose()?;

    let mut plate_infos = BTreeMap::new();
    for path in entries.paths().filter(|p| is_plate_info(p)) {
        let Some(index) = plate_index_from_path(path) else {
            continue;
        };
        let parsed = entries
            .get_str(path)
            .and_then(|json| json.map(|j| parse_plate_info(j, path)).transpose());
        match parsed {
            Ok(Some(info)) => {
                plate_infos.insert(index, info);
            }
            Ok(None) => {}
            Err(e) => warn!("Skipping plate info {}: {}", path, e),
        }
    }

    Ok(RawProject {
        config,
        model_settings,
        plate_infos,
    })
}

/// Parse archive entries into a normalized project, previews included.
pub fn parse_entries(entries: &ArchiveEntries, max_preview_dimension: u32) -> Result<NormalizedProject> {
    let raw = read_raw(entries)?;
    let mut project = normalize(&raw);
    project.plate_images = collect_plate_images(entries, max_preview_dimension);
    Ok(project)
}

/// Parse a project archive held in memory.
pub fn parse(bytes: &[u8], filename: &str) -> Result<NormalizedProject> {
    info!("Parsing project archive {} ({} bytes)", filename, bytes.len());
    let entries = ArchiveEntries::from_zip_bytes(bytes)?;
    parse_entries(&entries, MAX_PREVIEW_DIMENSION)
}

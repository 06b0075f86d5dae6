//! Raw archive entries: the zip container read into memory, entry order kept.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{PlateTuneError, Result};

pub const PROJECT_SETTINGS_PATH: &str = "Metadata/project_settings.config";
pub const MODEL_SETTINGS_PATH: &str = "Metadata/model_settings.config";
pub const METADATA_DIR: &str = "Metadata/";

/// Entry path -> raw bytes, in the order the archive stored them.
///
/// Replacing an entry keeps its position, so a rewritten archive lists its
/// entries exactly like the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveEntries {
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveEntries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every file entry of a zip archive held in memory.
    pub fn from_zip_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            entries.push((name, data));
        }

        debug!("Read {} archive entries", entries.len());
        Ok(Self { entries })
    }

    /// Rebuild the zip container, one Deflate entry per stored entry.
    pub fn to_zip_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (name, data) in &self.entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(name, _)| name == path)
            .map(|(_, data)| data.as_slice())
    }

    /// Entry content as UTF-8 text. Invalid UTF-8 is a format problem of
    /// that entry, reported as an archive error naming it.
    pub fn get_str(&self, path: &str) -> Result<Option<&str>> {
        match self.get(path) {
            None => Ok(None),
            Some(bytes) => std::str::from_utf8(bytes).map(Some).map_err(|e| {
                PlateTuneError::Archive(format!("Entry {} is not valid UTF-8: {}", path, e))
            }),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Replace an entry in place, or append it when the path is new.
    pub fn insert(&mut self, path: &str, data: Vec<u8>) {
        match self.entries.iter_mut().find(|(name, _)| name == path) {
            Some(slot) => slot.1 = data,
            None => self.entries.push((path.to_string(), data)),
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Vec<u8>)> for ArchiveEntries {
    fn from_iter<I: IntoIterator<Item = (S, Vec<u8>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Write archive entries to disk atomically.
///
/// The zip is assembled in memory, written to a temp file next to
/// `target_path` and renamed over it, so an interrupted run never leaves a
/// truncated archive behind.
pub fn write_archive_atomic(entries: &ArchiveEntries, target_path: &Path) -> Result<()> {
    let bytes = entries.to_zip_bytes()?;

    let parent = match target_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(&bytes)?;
    temp.flush()?;
    temp.persist(target_path).map_err(|e| PlateTuneError::Io(e.error))?;

    info!("Wrote archive to {:?} ({} bytes)", target_path, bytes.len());
    Ok(())
}

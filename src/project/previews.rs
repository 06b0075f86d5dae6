//! Plate preview images embedded in the archive, prepared as data URLs.
//!
//! Previews above the size limit are downscaled on the longest edge to keep
//! the request payload small.

use std::collections::HashSet;
use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat};
use tracing::{debug, warn};

use super::archive::{ArchiveEntries, METADATA_DIR};
use super::metadata::plate_index_from_path;
use super::types::PlateImage;

/// Longest edge, in pixels, of a preview sent to the service.
pub const MAX_PREVIEW_DIMENSION: u32 = 1024;

fn is_plate_preview(path: &str) -> bool {
    let Some(file_name) = path.strip_prefix(METADATA_DIR) else {
        return false;
    };
    !file_name.contains('/')
        && file_name.starts_with("plate_")
        && file_name.to_ascii_lowercase().ends_with(".png")
}

/// Collect plate previews, one per archive entry path.
pub fn collect_plate_images(entries: &ArchiveEntries, max_dimension: u32) -> Vec<PlateImage> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();

    for (path, bytes) in entries.iter() {
        if !is_plate_preview(path) || !seen.insert(path.to_string()) {
            continue;
        }
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        let png = prepare_preview(bytes, max_dimension);
        images.push(PlateImage {
            plate_index: plate_index_from_path(path),
            name,
            data_url: format!("data:image/png;base64,{}", STANDARD.encode(&png)),
        });
    }

    debug!("Collected {} plate previews", images.len());
    images
}

/// Downscale a PNG above `max_dimension`; anything undecodable or already
/// small enough is returned unchanged.
fn prepare_preview(bytes: &[u8], max_dimension: u32) -> Vec<u8> {
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(e) => {
            warn!("Could not decode preview image, embedding as-is: {}", e);
            return bytes.to_vec();
        }
    };

    if img.width() <= max_dimension && img.height() <= max_dimension {
        return bytes.to_vec();
    }

    let resized = resize_if_needed(img, max_dimension);
    let mut buffer = Cursor::new(Vec::new());
    match resized.write_to(&mut buffer, ImageFormat::Png) {
        Ok(()) => buffer.into_inner(),
        Err(e) => {
            warn!("Failed to re-encode preview image: {}", e);
            bytes.to_vec()
        }
    }
}

/// Shrink a plate preview so its longer side is `max_dimension`.
fn resize_if_needed(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());

    if width <= max_dimension && height <= max_dimension {
        return img;
    }

    let scale = max_dimension as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale) as u32).max(1);
    let new_height = ((height as f32 * scale) as u32).max(1);

    img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_collects_only_plate_previews() {
        let entries: ArchiveEntries = vec![
            ("Metadata/plate_1.png", png(16, 16)),
            ("Metadata/plate_2_small.png", png(8, 8)),
            ("Metadata/top_1.png", png(8, 8)),
            ("Metadata/plate_1.json", b"{}".to_vec()),
            ("Auxiliaries/plate_1.png", png(8, 8)),
        ]
        .into_iter()
        .collect();

        let images = collect_plate_images(&entries, MAX_PREVIEW_DIMENSION);
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].plate_index, Some(0));
        assert_eq!(images[0].name, "plate_1.png");
        assert!(images[0].data_url.starts_with("data:image/png;base64,"));
        // no trailing digits in the stem
        assert_eq!(images[1].plate_index, None);
    }

    #[test]
    fn test_large_preview_is_downscaled() {
        let original = png(2048, 1024);
        let prepared = prepare_preview(&original, 1024);
        let img = image::load_from_memory(&prepared).unwrap();
        assert_eq!((img.width(), img.height()), (1024, 512));
    }

    #[test]
    fn test_small_and_invalid_previews_pass_through() {
        let small = png(100, 50);
        assert_eq!(prepare_preview(&small, 1024), small);
        assert_eq!(prepare_preview(b"not an image", 1024), b"not an image".to_vec());
    }

    #[test]
    fn test_resize_if_needed_resize_height() {
        let img = DynamicImage::new_rgb8(1000, 2000);
        let resized = resize_if_needed(img, 1024);
        assert_eq!(resized.width(), 512);
        assert_eq!(resized.height(), 1024);
    }
}

//! Image scanning, validation and MIME detection

pub mod exif_reader;

use plantscan_types::{Error, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use exif_reader::observation_date_from_bytes;

/// Supported image extensions
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// Check if a path is a supported image file
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Validate an image file exists and is readable
pub fn validate_image(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.display().to_string()));
    }

    if !path.is_file() {
        return Err(Error::InvalidImageFormat(format!(
            "{} is not a file",
            path.display()
        )));
    }

    if !is_supported_image(path) {
        return Err(Error::InvalidImageFormat(format!(
            "Unsupported image format: {}",
            path.display()
        )));
    }

    Ok(())
}

/// Read a validated image file
pub fn read_image(path: &Path) -> Result<Vec<u8>> {
    validate_image(path)?;
    Ok(std::fs::read(path)?)
}

/// Scan a directory for image files
pub fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Err(Error::FileNotFound(dir.display().to_string()));
    }

    if !dir.is_dir() {
        return Err(Error::InvalidImageFormat(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && is_supported_image(path))
        .collect();

    // Sort by filename for consistent ordering
    images.sort_by(|a, b| {
        a.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .cmp(b.file_name().and_then(|n| n.to_str()).unwrap_or(""))
    });

    Ok(images)
}

/// MIME type from the image's magic bytes
pub fn sniff_mime_type(bytes: &[u8]) -> Option<String> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

fn is_image_mime(mime_type: &str) -> bool {
    mime_type
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.trim().is_empty())
}

/// Declared MIME type when it is `image/*`, otherwise sniffed from `bytes`
pub fn resolve_mime_type(declared: Option<&str>, bytes: Option<&[u8]>) -> Option<String> {
    declared
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| is_image_mime(m))
        .or_else(|| bytes.and_then(sniff_mime_type))
}

/// MIME type guessed from the file extension
pub fn mime_type_for_path(path: &Path) -> Option<String> {
    image::ImageFormat::from_path(path)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

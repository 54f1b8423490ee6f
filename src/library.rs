//! Library import: register media files on disk as library items.
//!
//! Walks a directory for known media extensions, infers the mime type,
//! captures the EXIF subset for images, and upserts rows into the media
//! table. This is the enumeration-time snapshot source for scans.

use anyhow::Result;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::db::Database;
use crate::media::ExifSubset;

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportSummary {
    pub discovered: usize,
    pub imported: usize,
}

/// Walk `directory` and upsert every file with a known media extension.
pub fn import_directory(
    db: &Database,
    directory: &Path,
    extensions: &[String],
) -> Result<ImportSummary> {
    let files = discover_media(directory, extensions)?;
    let mut summary = ImportSummary {
        discovered: files.len(),
        imported: 0,
    };

    for path in &files {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime = mime_for_path(path);
        let exif = if mime.starts_with("image/") {
            extract_exif_subset(path)
        } else {
            ExifSubset::default()
        };

        db.upsert_media(&path.to_string_lossy(), &filename, mime, &exif)?;
        summary.imported += 1;
    }

    tracing::info!(
        directory = %directory.display(),
        discovered = summary.discovered,
        "library import finished"
    );
    Ok(summary)
}

/// All files under `directory` with one of the given extensions, sorted
/// by path for consistent ordering.
pub fn discover_media(directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if path.is_file() {
            if let Some(ext) = path.extension() {
                let ext_lower = ext.to_string_lossy().to_lowercase();
                if extensions.iter().any(|e| e.to_lowercase() == ext_lower) {
                    files.push(path.to_path_buf());
                }
            }
        }
    }

    files.sort();

    Ok(files)
}

/// Mime type inferred from the file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" | "heif" => "image/heic",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// EXIF subset for one image file. Missing or unreadable EXIF is not an
/// error; the fields just stay empty.
pub fn extract_exif_subset(path: &Path) -> ExifSubset {
    let mut subset = ExifSubset::default();

    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return subset,
    };
    let mut reader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(e) => e,
        Err(_) => return subset,
    };

    if let Some(field) = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY) {
        subset.taken_at = Some(field.display_value().to_string());
    }
    if let Some(field) = exif.get_field(exif::Tag::Make, exif::In::PRIMARY) {
        subset.camera_make = Some(
            field
                .display_value()
                .to_string()
                .trim_matches('"')
                .to_string(),
        );
    }
    if let Some(field) = exif.get_field(exif::Tag::Model, exif::In::PRIMARY) {
        subset.camera_model = Some(
            field
                .display_value()
                .to_string()
                .trim_matches('"')
                .to_string(),
        );
    }
    if let Some(lat) = gps_coordinate(&exif, exif::Tag::GPSLatitude, exif::Tag::GPSLatitudeRef) {
        subset.gps_latitude = Some(lat);
    }
    if let Some(lon) = gps_coordinate(&exif, exif::Tag::GPSLongitude, exif::Tag::GPSLongitudeRef) {
        subset.gps_longitude = Some(lon);
    }

    subset
}

fn gps_coordinate(exif: &exif::Exif, tag: exif::Tag, ref_tag: exif::Tag) -> Option<f64> {
    let field = exif.get_field(tag, exif::In::PRIMARY)?;
    let exif::Value::Rational(ref parts) = field.value else {
        return None;
    };
    if parts.len() < 3 {
        return None;
    }
    let degrees = parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0;

    let sign = exif
        .get_field(ref_tag, exif::In::PRIMARY)
        .map(|f| f.display_value().to_string())
        .map(|r| if r.contains('S') || r.contains('W') { -1.0 } else { 1.0 })
        .unwrap_or(1.0);

    Some(degrees * sign)
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Broad media class used for deterministic folder routing.
///
/// Only images are ever sent to an AI provider; everything else is routed
/// to a fixed top-level folder without a network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Document,
}

impl MediaKind {
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            MediaKind::Image
        } else if mime.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Document
        }
    }

    /// Fixed, non-translated top-level folder for non-image media.
    pub fn fixed_folder(&self) -> Option<&'static str> {
        match self {
            MediaKind::Image => None,
            MediaKind::Video => Some("Videos"),
            MediaKind::Document => Some("Documents"),
        }
    }
}

/// EXIF subset captured at import time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExifSubset {
    pub taken_at: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
}

impl ExifSubset {
    /// Four-digit year from `taken_at`, when parseable.
    pub fn taken_year(&self) -> Option<&str> {
        let taken = self.taken_at.as_deref()?;
        let year = taken.get(0..4)?;
        if year.chars().all(|c| c.is_ascii_digit()) {
            Some(year)
        } else {
            None
        }
    }
}

/// Immutable snapshot of one library item, taken at enumeration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: i64,
    pub filename: String,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
    pub description: Option<String>,
    pub mime_type: String,
    #[serde(default)]
    pub exif: ExifSubset,
    /// Path to the image payload on disk, when available.
    pub payload_path: Option<PathBuf>,
}

impl MediaItem {
    pub fn kind(&self) -> MediaKind {
        MediaKind::from_mime(&self.mime_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_mime() {
        assert_eq!(MediaKind::from_mime("image/jpeg"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Document);
        assert_eq!(MediaKind::from_mime("audio/mpeg"), MediaKind::Document);
    }

    #[test]
    fn test_fixed_folder_routing() {
        assert_eq!(MediaKind::Image.fixed_folder(), None);
        assert_eq!(MediaKind::Video.fixed_folder(), Some("Videos"));
        assert_eq!(MediaKind::Document.fixed_folder(), Some("Documents"));
    }

    #[test]
    fn test_taken_year() {
        let exif = ExifSubset {
            taken_at: Some("2024-06-01T12:00:00".to_string()),
            ..Default::default()
        };
        assert_eq!(exif.taken_year(), Some("2024"));

        let bad = ExifSubset {
            taken_at: Some("junk".to_string()),
            ..Default::default()
        };
        assert_eq!(bad.taken_year(), None);
    }
}

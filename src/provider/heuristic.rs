//! Deterministic, network-free fallback provider.
//!
//! Pattern-matches filename and metadata against the known folder list and
//! a small table of common categories. Always available with zero
//! configuration. Emits the same raw JSON text shape as the remote
//! providers so the normalizer treats every backend identically.

use serde_json::json;

use super::{AnalysisProvider, AnalyzeRequest};
use crate::error::ProviderError;

/// Keyword groups mapped to proposed folder names, checked in order.
const CATEGORIES: &[(&[&str], &str)] = &[
    (&["screenshot", "screencap", "screen"], "Screenshots"),
    (&["receipt", "invoice", "bill"], "Receipts"),
    (&["wallpaper", "background"], "Wallpapers"),
    (&["meme"], "Memes"),
    (&["logo", "icon", "banner"], "Graphics"),
    (&["scan", "scanned"], "Scans"),
];

pub struct HeuristicProvider;

impl HeuristicProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HeuristicProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercased alphanumeric tokens from the item's textual metadata.
fn tokenize(request: &AnalyzeRequest) -> Vec<String> {
    let mut text = String::new();
    let stem = request
        .item
        .filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(&request.item.filename);
    text.push_str(stem);
    for field in [
        request.item.alt_text.as_deref(),
        request.item.caption.as_deref(),
        request.item.description.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        text.push(' ');
        text.push_str(field);
    }

    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Score one folder path by how many of its name words appear in the
/// item's tokens. Deeper matches win via the path bonus.
fn score_path(path: &str, tokens: &[String]) -> usize {
    path.split('/')
        .flat_map(|segment| segment.split_whitespace())
        .map(|word| word.to_lowercase())
        .filter(|word| word.len() > 2 && tokens.iter().any(|t| t == word))
        .count()
}

impl AnalysisProvider for HeuristicProvider {
    fn analyze(&self, request: &AnalyzeRequest) -> Result<String, ProviderError> {
        let tokens = tokenize(request);

        // best existing folder by token overlap
        let best = request
            .folder_context
            .iter()
            .map(|path| (score_path(path, &tokens), path))
            .filter(|(score, _)| *score > 0)
            .max_by_key(|(score, _)| *score);

        if let Some((score, path)) = best {
            let confidence = (0.3 + 0.2 * score as f64).min(0.9);
            return Ok(json!({
                "action": "assign",
                "folder_path": path,
                "confidence": confidence,
                "reason": format!("filename and metadata match folder {path:?}"),
            })
            .to_string());
        }

        if request.allow_new_folders {
            for (keywords, folder) in CATEGORIES {
                if keywords.iter().any(|k| tokens.iter().any(|t| t == k)) {
                    return Ok(json!({
                        "action": "create",
                        "new_folder_path": folder,
                        "confidence": 0.4,
                        "reason": format!("matched {folder} keyword pattern"),
                    })
                    .to_string());
                }
            }

            // date-based fallback for camera files
            if let Some(year) = request.item.exif.taken_year() {
                return Ok(json!({
                    "action": "create",
                    "new_folder_path": format!("Photos/{year}"),
                    "confidence": 0.3,
                    "reason": "grouped by capture year",
                })
                .to_string());
            }
        }

        Ok(json!({
            "action": "skip",
            "confidence": 0.0,
            "reason": "no recognizable pattern in item metadata",
        })
        .to_string())
    }

    fn test(&self) -> Option<String> {
        None
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn available_models(&self) -> Vec<String> {
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "Heuristic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::FolderPathMap;
    use crate::media::{ExifSubset, MediaItem};
    use crate::normalize::{self, DecisionAction};

    fn item(filename: &str, taken_at: Option<&str>) -> MediaItem {
        MediaItem {
            id: 1,
            filename: filename.to_string(),
            alt_text: None,
            caption: None,
            description: None,
            mime_type: "image/jpeg".to_string(),
            exif: ExifSubset {
                taken_at: taken_at.map(|s| s.to_string()),
                ..Default::default()
            },
            payload_path: None,
        }
    }

    fn request<'a>(item: &'a MediaItem, folders: &'a [String]) -> AnalyzeRequest<'a> {
        AnalyzeRequest {
            item,
            folder_context: folders,
            max_depth: 2,
            allow_new_folders: true,
            image: None,
            suggested_folders: &[],
            custom_context: None,
        }
    }

    #[test]
    fn test_matches_existing_folder_and_is_deterministic() {
        let provider = HeuristicProvider::new();
        let item = item("beach_vacation_001.jpg", None);
        let folders = vec!["Pets".to_string(), "Vacation".to_string()];
        let req = request(&item, &folders);

        let first = provider.analyze(&req).unwrap();
        let second = provider.analyze(&req).unwrap();
        assert_eq!(first, second);

        let mut map = FolderPathMap::default();
        map.insert("Vacation", 7);
        let decision = normalize::parse(&first, &map).unwrap();
        assert_eq!(decision.action, DecisionAction::Assign);
        assert_eq!(decision.folder_id, Some(7));
    }

    #[test]
    fn test_category_keyword_creates_folder() {
        let provider = HeuristicProvider::new();
        let item = item("Screenshot 2025-03-01 at 09.12.44.png", None);
        let req = request(&item, &[]);

        let raw = provider.analyze(&req).unwrap();
        let decision = normalize::parse(&raw, &FolderPathMap::default()).unwrap();
        assert_eq!(decision.action, DecisionAction::Create);
        assert_eq!(decision.new_folder_path.as_deref(), Some("Screenshots"));
    }

    #[test]
    fn test_capture_year_fallback() {
        let provider = HeuristicProvider::new();
        let item = item("IMG_4821.jpg", Some("2023-08-14T10:00:00"));
        let req = request(&item, &[]);

        let raw = provider.analyze(&req).unwrap();
        let decision = normalize::parse(&raw, &FolderPathMap::default()).unwrap();
        assert_eq!(decision.new_folder_path.as_deref(), Some("Photos/2023"));
    }

    #[test]
    fn test_skip_when_new_folders_disallowed() {
        let provider = HeuristicProvider::new();
        let item = item("IMG_4821.jpg", Some("2023-08-14T10:00:00"));
        let folders: Vec<String> = Vec::new();
        let mut req = request(&item, &folders);
        req.allow_new_folders = false;

        let raw = provider.analyze(&req).unwrap();
        let decision = normalize::parse(&raw, &FolderPathMap::default()).unwrap();
        assert_eq!(decision.action, DecisionAction::Skip);
        assert!(!decision.reason.is_empty());
    }
}

//! Hierarchy resolver: applies or simulates decisions against the folder
//! tree.
//!
//! Owns deterministic type routing, idempotent folder creation, and
//! inversion prevention (a proposed `Events/Outdoor` is remapped onto an
//! existing `Outdoor/Events` instead of creating a conflicting branch).
//! During dry runs all mutations land on an in-memory shadow of the tree
//! that answers lookups exactly like the real store.

use anyhow::{anyhow, Context, Result};
use std::collections::{HashMap, HashSet};

use crate::db::{Database, FolderNode};
use crate::media::MediaItem;
use crate::normalize::{Decision, DecisionAction};

/// Case/whitespace-normalized form of one folder name.
pub fn normalize_segment(segment: &str) -> String {
    segment
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalized form of a full path, empty segments dropped.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(normalize_segment)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Authoritative path -> id map handed to the normalizer. Ground truth for
/// resolving provider-supplied paths and validating provider-supplied ids.
#[derive(Debug, Default, Clone)]
pub struct FolderPathMap {
    by_path: HashMap<String, i64>,
    ids: HashSet<i64>,
}

impl FolderPathMap {
    pub fn insert(&mut self, path: &str, id: i64) {
        self.by_path.insert(normalize_path(path), id);
        self.ids.insert(id);
    }

    pub fn lookup(&self, path: &str) -> Option<i64> {
        self.by_path.get(&normalize_path(path)).copied()
    }

    pub fn contains_id(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// Folder knowledge carried across every chunk of one scan: all known
/// paths (seeded from the tree, extended by every creation) and the shadow
/// id allocator for simulated folders.
///
/// This is what lets the inversion guard hold across independently
/// executed chunks.
#[derive(Debug, Clone)]
pub struct HierarchyState {
    /// normalized path -> folder id (negative ids are shadow folders)
    ids: HashMap<String, i64>,
    /// normalized path -> display path
    display: HashMap<String, String>,
    id_set: HashSet<i64>,
    next_shadow_id: i64,
}

impl HierarchyState {
    /// State over an empty tree (reorganize-all previews).
    pub fn empty() -> Self {
        Self {
            ids: HashMap::new(),
            display: HashMap::new(),
            id_set: HashSet::new(),
            next_shadow_id: -1,
        }
    }

    pub fn from_tree(nodes: &[FolderNode]) -> Self {
        let mut state = Self::empty();
        for node in nodes {
            state.register(&node.path, node.id);
        }
        state
    }

    fn register(&mut self, display_path: &str, id: i64) {
        let norm = normalize_path(display_path);
        self.ids.insert(norm.clone(), id);
        self.display.insert(norm, display_path.to_string());
        self.id_set.insert(id);
    }

    fn alloc_shadow_id(&mut self) -> i64 {
        let id = self.next_shadow_id;
        self.next_shadow_id -= 1;
        id
    }

    pub fn id_at(&self, normalized_path: &str) -> Option<i64> {
        self.ids.get(normalized_path).copied()
    }

    pub fn knows_id(&self, id: i64) -> bool {
        self.id_set.contains(&id)
    }

    /// All known display paths, alphabetically ordered. This is the only
    /// folder listing ever surfaced to a provider or a preview.
    pub fn context_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.display.values().cloned().collect();
        paths.sort_by_key(|p| p.to_lowercase());
        paths
    }

    pub fn path_map(&self) -> FolderPathMap {
        let mut map = FolderPathMap::default();
        for (norm, id) in &self.ids {
            map.by_path.insert(norm.clone(), *id);
            map.ids.insert(*id);
        }
        map
    }

    pub fn folder_count(&self) -> usize {
        self.ids.len()
    }
}

/// Outcome of resolving one decision. `decision` is the final form after
/// any remapping; `applied` is false for skips.
#[derive(Debug, Clone)]
pub struct AppliedDecision {
    pub decision: Decision,
    pub applied: bool,
}

pub struct Resolver<'a> {
    db: &'a Database,
    state: &'a mut HierarchyState,
    simulate: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(db: &'a Database, state: &'a mut HierarchyState, simulate: bool) -> Self {
        Self {
            db,
            state,
            simulate,
        }
    }

    pub fn context_paths(&self) -> Vec<String> {
        self.state.context_paths()
    }

    pub fn path_map(&self) -> FolderPathMap {
        self.state.path_map()
    }

    /// Route a non-image item to its fixed top-level folder without any
    /// provider involvement.
    pub fn route_fixed(&mut self, item: &MediaItem) -> Result<AppliedDecision> {
        let folder = item
            .kind()
            .fixed_folder()
            .context("image items are not type-routed")?;
        let decision = Decision {
            action: DecisionAction::Create,
            folder_id: None,
            folder_path: None,
            new_folder_path: Some(folder.to_string()),
            confidence: 1.0,
            reason: format!("routed by media type {}", item.mime_type),
        };
        self.apply(item, decision)
    }

    pub fn apply(&mut self, item: &MediaItem, decision: Decision) -> Result<AppliedDecision> {
        match decision.action {
            DecisionAction::Skip => Ok(AppliedDecision {
                decision,
                applied: false,
            }),
            DecisionAction::Assign => {
                let supplied = decision
                    .folder_id
                    .ok_or_else(|| anyhow!("assign decision without folder id"))?;
                // A cached decision can be replayed after the tree changed;
                // the path re-resolves when the id went stale.
                let folder_id = if self.state.knows_id(supplied) {
                    supplied
                } else {
                    decision
                        .folder_path
                        .as_deref()
                        .and_then(|p| self.state.id_at(&normalize_path(p)))
                        .ok_or_else(|| {
                            anyhow!("assign target {supplied} no longer exists in the tree")
                        })?
                };
                self.assign_item(item.id, folder_id)?;
                Ok(AppliedDecision {
                    decision: Decision {
                        folder_id: Some(folder_id),
                        ..decision
                    },
                    applied: true,
                })
            }
            DecisionAction::Create => {
                let path = decision
                    .new_folder_path
                    .clone()
                    .ok_or_else(|| anyhow!("create decision without a folder path"))?;

                if let Some((folder_id, existing)) = self.inverted_existing(&path) {
                    tracing::debug!(
                        proposed = %path,
                        existing = %existing,
                        "inverted hierarchy detected, remapping to existing branch"
                    );
                    self.assign_item(item.id, folder_id)?;
                    return Ok(AppliedDecision {
                        decision: Decision {
                            action: DecisionAction::Assign,
                            folder_id: Some(folder_id),
                            folder_path: Some(existing),
                            new_folder_path: None,
                            confidence: decision.confidence,
                            reason: decision.reason,
                        },
                        applied: true,
                    });
                }

                let folder_id = self.ensure_path(&path)?;
                self.assign_item(item.id, folder_id)?;
                Ok(AppliedDecision {
                    decision: Decision {
                        folder_id: Some(folder_id),
                        ..decision
                    },
                    applied: true,
                })
            }
        }
    }

    /// Create every missing segment of `path`, reusing existing folders
    /// under case/whitespace normalization. Returns the leaf id.
    pub fn ensure_path(&mut self, path: &str) -> Result<i64> {
        let segments: Vec<&str> = path
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if segments.is_empty() {
            return Err(anyhow!("empty folder path"));
        }

        let mut parent: Option<i64> = None;
        let mut parent_display = String::new();
        let mut norm_path = String::new();

        for segment in segments {
            let norm_segment = normalize_segment(segment);
            norm_path = if norm_path.is_empty() {
                norm_segment
            } else {
                format!("{norm_path}/{norm_segment}")
            };

            let id = match self.state.id_at(&norm_path) {
                Some(existing) => existing,
                None => {
                    let id = if self.simulate {
                        self.state.alloc_shadow_id()
                    } else {
                        self.db.create_folder(segment, parent)?
                    };
                    let display = if parent_display.is_empty() {
                        segment.to_string()
                    } else {
                        format!("{parent_display}/{segment}")
                    };
                    self.state.register(&display, id);
                    id
                }
            };

            parent = Some(id);
            parent_display = self
                .state
                .display
                .get(&norm_path)
                .cloned()
                .unwrap_or_else(|| segment.to_string());
        }

        parent.ok_or_else(|| anyhow!("empty folder path"))
    }

    /// Check whether the structurally inverted chain of `path` already
    /// exists somewhere in the tree.
    fn inverted_existing(&self, path: &str) -> Option<(i64, String)> {
        let segments: Vec<String> = path
            .split('/')
            .map(normalize_segment)
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() < 2 {
            return None;
        }

        let forward = segments.join("/");
        let reversed = segments
            .iter()
            .rev()
            .cloned()
            .collect::<Vec<_>>()
            .join("/");
        if reversed == forward {
            return None;
        }

        let id = self.state.id_at(&reversed)?;
        let display = self.state.display.get(&reversed)?.clone();
        Some((id, display))
    }

    fn assign_item(&mut self, media_id: i64, folder_id: i64) -> Result<()> {
        if self.simulate {
            return Ok(());
        }
        self.db.assign(media_id, folder_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::tempdir;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        db.initialize().unwrap();
        (dir, db)
    }

    fn image_item(id: i64) -> MediaItem {
        MediaItem {
            id,
            filename: format!("img_{id}.jpg"),
            alt_text: None,
            caption: None,
            description: None,
            mime_type: "image/jpeg".to_string(),
            exif: Default::default(),
            payload_path: None,
        }
    }

    fn create_decision(path: &str) -> Decision {
        Decision {
            action: DecisionAction::Create,
            folder_id: None,
            folder_path: None,
            new_folder_path: Some(path.to_string()),
            confidence: 0.7,
            reason: "test".to_string(),
        }
    }

    #[test]
    fn test_inverted_path_remapped_to_existing_branch() {
        let (_dir, db) = open_db();
        let outdoor = db.create_folder("Outdoor", None).unwrap();
        let events = db.create_folder("Events", Some(outdoor)).unwrap();

        let mut state = HierarchyState::from_tree(&db.folder_tree().unwrap());
        let mut resolver = Resolver::new(&db, &mut state, false);
        let item = image_item(1);
        db.upsert_media("/img_1.jpg", "img_1.jpg", "image/jpeg", &Default::default())
            .unwrap();

        let out = resolver
            .apply(&item, create_decision("Events/Outdoor"))
            .unwrap();

        assert_eq!(out.decision.action, DecisionAction::Assign);
        assert_eq!(out.decision.folder_id, Some(events));
        assert_eq!(out.decision.folder_path.as_deref(), Some("Outdoor/Events"));
        // no inverted branch was created
        assert_eq!(db.folder_count().unwrap(), 2);
    }

    #[test]
    fn test_inversion_guard_spans_chunks() {
        let (_dir, db) = open_db();
        let mut state = HierarchyState::from_tree(&db.folder_tree().unwrap());

        // chunk 1 creates Outdoor/Events in the shadow
        {
            let mut resolver = Resolver::new(&db, &mut state, true);
            resolver
                .apply(&image_item(1), create_decision("Outdoor/Events"))
                .unwrap();
        }

        // chunk 2 proposes the inversion; the guard still knows
        {
            let mut resolver = Resolver::new(&db, &mut state, true);
            let out = resolver
                .apply(&image_item(2), create_decision("Events/Outdoor"))
                .unwrap();
            assert_eq!(out.decision.action, DecisionAction::Assign);
            assert_eq!(out.decision.folder_path.as_deref(), Some("Outdoor/Events"));
        }
    }

    #[test]
    fn test_create_is_idempotent_under_normalization() {
        let (_dir, db) = open_db();
        db.create_folder("Vacation  Photos", None).unwrap();

        let mut state = HierarchyState::from_tree(&db.folder_tree().unwrap());
        let mut resolver = Resolver::new(&db, &mut state, false);
        let id = resolver.ensure_path("vacation photos").unwrap();
        let again = resolver.ensure_path("VACATION PHOTOS").unwrap();

        assert_eq!(id, again);
        assert_eq!(db.folder_count().unwrap(), 1);
    }

    #[test]
    fn test_simulation_never_touches_the_store() {
        let (_dir, db) = open_db();
        db.create_folder("Existing", None).unwrap();

        let mut state = HierarchyState::from_tree(&db.folder_tree().unwrap());
        let mut resolver = Resolver::new(&db, &mut state, true);
        let out = resolver
            .apply(&image_item(1), create_decision("Brand/New"))
            .unwrap();

        assert!(out.applied);
        assert!(out.decision.folder_id.unwrap() < 0);
        assert_eq!(db.folder_count().unwrap(), 1);
        assert_eq!(db.assignment_count().unwrap(), 0);

        // the shadow answers lookups like the real store would
        assert!(state.id_at("brand/new").is_some());
        assert_eq!(state.context_paths(), vec!["Brand", "Brand/New", "Existing"]);
    }

    #[test]
    fn test_route_fixed_for_documents_and_videos() {
        let (_dir, db) = open_db();
        let pdf = MediaItem {
            mime_type: "application/pdf".to_string(),
            ..image_item(1)
        };
        let movie = MediaItem {
            mime_type: "video/mp4".to_string(),
            ..image_item(2)
        };
        db.upsert_media("/a.pdf", "a.pdf", "application/pdf", &Default::default())
            .unwrap();
        db.upsert_media("/b.mp4", "b.mp4", "video/mp4", &Default::default())
            .unwrap();

        let mut state = HierarchyState::from_tree(&db.folder_tree().unwrap());
        let mut resolver = Resolver::new(&db, &mut state, false);
        resolver.route_fixed(&pdf).unwrap();
        resolver.route_fixed(&movie).unwrap();
        // second document reuses the folder
        resolver.route_fixed(&pdf).unwrap();

        let tree = db.folder_tree().unwrap();
        let paths: Vec<&str> = tree.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["Documents", "Videos"]);
    }

    #[test]
    fn test_stale_assign_id_re_resolves_by_path() {
        let (_dir, db) = open_db();
        let pets = db.create_folder("Pets", None).unwrap();
        db.upsert_media("/img_1.jpg", "img_1.jpg", "image/jpeg", &Default::default())
            .unwrap();

        let mut state = HierarchyState::from_tree(&db.folder_tree().unwrap());
        let mut resolver = Resolver::new(&db, &mut state, false);
        let decision = Decision {
            action: DecisionAction::Assign,
            folder_id: Some(-42), // shadow id from an earlier dry run
            folder_path: Some("Pets".to_string()),
            new_folder_path: None,
            confidence: 0.9,
            reason: "cached".to_string(),
        };

        let out = resolver.apply(&image_item(1), decision).unwrap();
        assert_eq!(out.decision.folder_id, Some(pets));
    }
}

//! Backup manager: snapshots and restores folder + assignment state
//! around destructive reorganizations.
//!
//! The snapshot is a singleton named record, overwritten wholesale on each
//! export. It exists independently of any in-progress scan.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::Database;

/// Name of the singleton snapshot record.
pub const BACKUP_RECORD: &str = "backup_snapshot";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupFolder {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupAssignment {
    pub folder_id: i64,
    pub media_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub folders: Vec<BackupFolder>,
    pub assignments: Vec<BackupAssignment>,
    pub timestamp: DateTime<Utc>,
}

/// Read-only introspection of the stored snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    pub timestamp: DateTime<Utc>,
    pub folder_count: usize,
    pub assignment_count: usize,
}

/// Counts returned by a restore.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RestoreReport {
    pub folders_restored: usize,
    pub assignments_restored: usize,
}

pub struct BackupManager<'a> {
    db: &'a Database,
}

impl<'a> BackupManager<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Snapshot the full folder tree and per-folder assignment lists,
    /// overwriting any prior snapshot.
    pub fn export(&self) -> Result<BackupInfo> {
        let tree = self.db.folder_tree()?;

        let mut assignments = Vec::new();
        for node in &tree {
            let media_ids = self.db.assignments(node.id)?;
            if !media_ids.is_empty() {
                assignments.push(BackupAssignment {
                    folder_id: node.id,
                    media_ids,
                });
            }
        }

        let snapshot = BackupSnapshot {
            folders: tree
                .into_iter()
                .map(|node| BackupFolder {
                    id: node.id,
                    name: node.name,
                    slug: node.slug,
                    description: node.description,
                    parent: node.parent,
                })
                .collect(),
            assignments,
            timestamp: Utc::now(),
        };

        self.db.put_record(BACKUP_RECORD, &snapshot)?;

        let info = BackupInfo {
            timestamp: snapshot.timestamp,
            folder_count: snapshot.folders.len(),
            assignment_count: snapshot
                .assignments
                .iter()
                .map(|a| a.media_ids.len())
                .sum(),
        };
        tracing::info!(
            folders = info.folder_count,
            assignments = info.assignment_count,
            "folder snapshot exported"
        );
        Ok(info)
    }

    /// Recreate folders parent-before-child, then re-apply assignments.
    /// The store assigns new ids, so an old-id -> new-id map is built as
    /// folders are recreated.
    pub fn restore(&self) -> Result<RestoreReport> {
        let snapshot: BackupSnapshot = match self.db.get_record(BACKUP_RECORD)? {
            Some(snapshot) => snapshot,
            None => bail!("no backup snapshot to restore"),
        };

        let mut id_map: HashMap<i64, i64> = HashMap::new();
        let mut remaining: Vec<&BackupFolder> = snapshot.folders.iter().collect();
        let mut folders_restored = 0;

        while !remaining.is_empty() {
            let before = remaining.len();
            let mut deferred = Vec::new();

            for folder in remaining {
                let parent = match folder.parent {
                    None => None,
                    Some(old_parent) => match id_map.get(&old_parent) {
                        Some(&new_parent) => Some(new_parent),
                        None => {
                            deferred.push(folder);
                            continue;
                        }
                    },
                };
                let new_id = self.db.create_folder(&folder.name, parent)?;
                id_map.insert(folder.id, new_id);
                folders_restored += 1;
            }

            if deferred.len() == before {
                // parents missing from the snapshot itself; reattach at root
                for folder in &deferred {
                    let new_id = self.db.create_folder(&folder.name, None)?;
                    id_map.insert(folder.id, new_id);
                    folders_restored += 1;
                    tracing::warn!(folder = %folder.name, "snapshot parent missing, restored at root");
                }
                deferred.clear();
            }
            remaining = deferred;
        }

        let mut assignments_restored = 0;
        for assignment in &snapshot.assignments {
            let Some(&folder_id) = id_map.get(&assignment.folder_id) else {
                continue;
            };
            for &media_id in &assignment.media_ids {
                self.db.assign(media_id, folder_id)?;
                assignments_restored += 1;
            }
        }

        tracing::info!(folders_restored, assignments_restored, "backup restored");
        Ok(RestoreReport {
            folders_restored,
            assignments_restored,
        })
    }

    pub fn has_backup(&self) -> Result<bool> {
        Ok(self
            .db
            .get_record::<BackupSnapshot>(BACKUP_RECORD)?
            .is_some())
    }

    pub fn get_backup_info(&self) -> Result<Option<BackupInfo>> {
        let snapshot: Option<BackupSnapshot> = self.db.get_record(BACKUP_RECORD)?;
        Ok(snapshot.map(|s| BackupInfo {
            timestamp: s.timestamp,
            folder_count: s.folders.len(),
            assignment_count: s.assignments.iter().map(|a| a.media_ids.len()).sum(),
        }))
    }

    /// Delete the snapshot, after a successful restore or on dismissal.
    pub fn cleanup(&self) -> Result<()> {
        self.db.delete_record(BACKUP_RECORD)
    }
}

//! Folder store: the hierarchy and item -> folder assignments.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Database;

/// One folder with its path materialized from the parent chain.
///
/// The path is always recomputed when the tree is loaded; it is never
/// stored as an independent source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderNode {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent: Option<i64>,
    pub path: String,
}

/// Lowercase, alphanumeric-and-dash form of a folder name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                slug.push(lower);
            }
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

impl Database {
    pub fn create_folder(&self, name: &str, parent: Option<i64>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO folders (name, slug, parent_id) VALUES (?, ?, ?)",
            rusqlite::params![name, slugify(name), parent],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Load the whole tree with materialized paths, ordered by path.
    pub fn folder_tree(&self) -> Result<Vec<FolderNode>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, slug, description, parent_id FROM folders")?;
        let rows: Vec<(i64, String, String, Option<String>, Option<i64>)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();

        let by_id: HashMap<i64, (&String, Option<i64>)> = rows
            .iter()
            .map(|(id, name, _, _, parent)| (*id, (name, *parent)))
            .collect();

        let mut nodes: Vec<FolderNode> = rows
            .iter()
            .map(|(id, name, slug, description, parent)| FolderNode {
                id: *id,
                name: name.clone(),
                slug: slug.clone(),
                description: description.clone(),
                parent: *parent,
                path: materialize_path(*id, &by_id),
            })
            .collect();

        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(nodes)
    }

    pub fn assign(&self, media_id: i64, folder_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO folder_items (media_id, folder_id) VALUES (?, ?)",
            rusqlite::params![media_id, folder_id],
        )?;
        Ok(())
    }

    pub fn assignments(&self, folder_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT media_id FROM folder_items WHERE folder_id = ? ORDER BY media_id")?;
        let ids = stmt
            .query_map([folder_id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    pub fn delete_all_folders(&self) -> Result<()> {
        // folder_items rows cascade
        self.conn.execute("DELETE FROM folders", [])?;
        Ok(())
    }

    pub fn folder_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM folders", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn assignment_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM folder_items", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Walk the parent chain upward, joining ancestor names. A broken or
/// cyclic chain stops at the offending link rather than looping.
fn materialize_path(id: i64, by_id: &HashMap<i64, (&String, Option<i64>)>) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut cursor = Some(id);

    while let Some(current) = cursor {
        if !seen.insert(current) {
            break;
        }
        match by_id.get(&current) {
            Some((name, parent)) => {
                segments.push(name.as_str());
                cursor = *parent;
            }
            None => break,
        }
    }

    segments.reverse();
    segments.join("/")
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

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Vacation 2025"), "vacation-2025");
        assert_eq!(slugify("  Family & Friends  "), "family-friends");
    }

    #[test]
    fn test_tree_paths_materialized() {
        let (_dir, db) = open_db();
        let root = db.create_folder("Events", None).unwrap();
        let child = db.create_folder("Outdoor", Some(root)).unwrap();
        db.create_folder("Archive", None).unwrap();

        let tree = db.folder_tree().unwrap();
        let paths: Vec<&str> = tree.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["Archive", "Events", "Events/Outdoor"]);

        let nested = tree.iter().find(|n| n.id == child).unwrap();
        assert_eq!(nested.parent, Some(root));
    }

    #[test]
    fn test_assignment_is_single_valued() {
        let (_dir, db) = open_db();
        let a = db.create_folder("A", None).unwrap();
        let b = db.create_folder("B", None).unwrap();
        let item = db
            .upsert_media("/pics/x.jpg", "x.jpg", "image/jpeg", &Default::default())
            .unwrap();

        db.assign(item, a).unwrap();
        db.assign(item, b).unwrap();

        assert_eq!(db.assignments(a).unwrap(), Vec::<i64>::new());
        assert_eq!(db.assignments(b).unwrap(), vec![item]);
        assert_eq!(db.assignment_count().unwrap(), 1);
    }

    #[test]
    fn test_delete_all_folders_cascades() {
        let (_dir, db) = open_db();
        let a = db.create_folder("A", None).unwrap();
        let item = db
            .upsert_media("/pics/x.jpg", "x.jpg", "image/jpeg", &Default::default())
            .unwrap();
        db.assign(item, a).unwrap();

        db.delete_all_folders().unwrap();
        assert_eq!(db.folder_count().unwrap(), 0);
        assert_eq!(db.assignment_count().unwrap(), 0);
        // the media row itself survives
        assert!(db.media_item(item).unwrap().is_some());
    }
}

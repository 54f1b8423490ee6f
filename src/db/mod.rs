//! SQLite persistence layer.
//!
//! Three concerns share one database file: the media table (enumeration
//! source for scans), the folder store (hierarchy + assignments), and
//! named singleton records holding JSON state (scan session, backup
//! snapshot, per-mode dry-run caches).

pub mod folders;
mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub use folders::{slugify, FolderNode};
use schema::{MIGRATIONS, SCHEMA};

use crate::media::{ExifSubset, MediaItem};

pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    /// In-memory database for tests and dry tooling.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.run_migrations()?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        for migration in MIGRATIONS {
            let _ = self.conn.execute(migration, []);
        }
        Ok(())
    }

    // ========================================================================
    // Media operations
    // ========================================================================

    /// Insert a media row, or refresh mutable fields when the path is
    /// already known. Returns the row id.
    pub fn upsert_media(
        &self,
        path: &str,
        filename: &str,
        mime_type: &str,
        exif: &ExifSubset,
    ) -> Result<i64> {
        let existing: Option<i64> = match self.conn.query_row(
            "SELECT id FROM media WHERE path = ?",
            [path],
            |row| row.get(0),
        ) {
            Ok(id) => Some(id),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(id) = existing {
            self.conn.execute(
                r#"
                UPDATE media
                SET filename = ?, mime_type = ?, taken_at = ?, camera_make = ?,
                    camera_model = ?, gps_latitude = ?, gps_longitude = ?
                WHERE id = ?
                "#,
                rusqlite::params![
                    filename,
                    mime_type,
                    exif.taken_at,
                    exif.camera_make,
                    exif.camera_model,
                    exif.gps_latitude,
                    exif.gps_longitude,
                    id
                ],
            )?;
            return Ok(id);
        }

        self.conn.execute(
            r#"
            INSERT INTO media (path, filename, mime_type, taken_at, camera_make,
                               camera_model, gps_latitude, gps_longitude)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            rusqlite::params![
                path,
                filename,
                mime_type,
                exif.taken_at,
                exif.camera_make,
                exif.camera_model,
                exif.gps_latitude,
                exif.gps_longitude
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_media_texts(
        &self,
        id: i64,
        alt_text: Option<&str>,
        caption: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE media SET alt_text = ?, caption = ?, description = ? WHERE id = ?",
            rusqlite::params![alt_text, caption, description, id],
        )?;
        Ok(())
    }

    pub fn media_item(&self, id: i64) -> Result<Option<MediaItem>> {
        let result = self.conn.query_row(
            r#"
            SELECT id, path, filename, mime_type, alt_text, caption, description,
                   taken_at, camera_make, camera_model, gps_latitude, gps_longitude
            FROM media
            WHERE id = ?
            "#,
            [id],
            |row| {
                Ok(MediaItem {
                    id: row.get(0)?,
                    payload_path: Some(std::path::PathBuf::from(row.get::<_, String>(1)?)),
                    filename: row.get(2)?,
                    mime_type: row.get(3)?,
                    alt_text: row.get(4)?,
                    caption: row.get(5)?,
                    description: row.get(6)?,
                    exif: ExifSubset {
                        taken_at: row.get(7)?,
                        camera_make: row.get(8)?,
                        camera_model: row.get(9)?,
                        gps_latitude: row.get(10)?,
                        gps_longitude: row.get(11)?,
                    },
                })
            },
        );
        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn all_media_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare("SELECT id FROM media ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    /// Media items with no folder assignment, in id order.
    pub fn unassigned_media_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT m.id FROM media m
            LEFT JOIN folder_items fi ON fi.media_id = m.id
            WHERE fi.folder_id IS NULL
            ORDER BY m.id
            "#,
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    pub fn media_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM media", [], |row| row.get(0))?;
        Ok(count)
    }

    // ========================================================================
    // Named record operations
    // ========================================================================

    pub fn get_record<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let raw: Option<String> = match self.conn.query_row(
            "SELECT value FROM state_records WHERE name = ?",
            [name],
            |row| row.get(0),
        ) {
            Ok(v) => Some(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        match raw {
            Some(json) => {
                let value = serde_json::from_str(&json)
                    .with_context(|| format!("record {name:?} is corrupt"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn put_record<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn.execute(
            r#"
            INSERT INTO state_records (name, value, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(name) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at
            "#,
            rusqlite::params![name, json],
        )?;
        Ok(())
    }

    pub fn delete_record(&self, name: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM state_records WHERE name = ?", [name])?;
        Ok(())
    }

    /// Read-modify-write a named record inside one transaction, so a
    /// counter delta can never be lost against a concurrent stale read.
    pub fn update_record<T, F>(&self, name: &str, default: T, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let tx = self.conn.unchecked_transaction()?;
        let mut value: T = {
            let raw: Option<String> = match tx.query_row(
                "SELECT value FROM state_records WHERE name = ?",
                [name],
                |row| row.get(0),
            ) {
                Ok(v) => Some(v),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            };
            match raw {
                Some(json) => serde_json::from_str(&json)
                    .with_context(|| format!("record {name:?} is corrupt"))?,
                None => default,
            }
        };

        f(&mut value);

        let json = serde_json::to_string(&value)?;
        tx.execute(
            r#"
            INSERT INTO state_records (name, value, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(name) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at
            "#,
            rusqlite::params![name, json],
        )?;
        tx.commit()?;
        Ok(value)
    }
}

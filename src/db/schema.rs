pub const SCHEMA: &str = r#"
-- Media table: one row per library item
CREATE TABLE IF NOT EXISTS media (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    alt_text TEXT,
    caption TEXT,
    description TEXT,
    imported_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,

    -- EXIF subset
    taken_at TEXT,
    camera_make TEXT,
    camera_model TEXT,
    gps_latitude REAL,
    gps_longitude REAL
);

CREATE INDEX IF NOT EXISTS idx_media_filename ON media(filename);
CREATE INDEX IF NOT EXISTS idx_media_mime ON media(mime_type);

-- Folder hierarchy
CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    slug TEXT NOT NULL,
    description TEXT,
    parent_id INTEGER REFERENCES folders(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id);

-- Item -> folder assignment (one folder per item)
CREATE TABLE IF NOT EXISTS folder_items (
    media_id INTEGER PRIMARY KEY REFERENCES media(id) ON DELETE CASCADE,
    folder_id INTEGER NOT NULL REFERENCES folders(id) ON DELETE CASCADE,
    assigned_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_folder_items_folder ON folder_items(folder_id);

-- Named singleton records: scan session, backup snapshot, per-mode caches.
-- Each is a JSON blob, independently readable/writable.
CREATE TABLE IF NOT EXISTS state_records (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Upgrades for databases created before these columns existed; the
/// duplicate-column errors on current databases are ignored.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE media ADD COLUMN caption TEXT",
    "ALTER TABLE folders ADD COLUMN description TEXT",
];

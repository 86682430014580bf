pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Feature record (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

const SCHEMA_VERSION: i32 = 1;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version > SCHEMA_VERSION {
            return Err(DbError::Migration(format!(
                "database schema v{version} is newer than this build (v{SCHEMA_VERSION})"
            )));
        }
        if version < 1 {
            self.migrate_v1()?;
        }

        self.conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// V1: tracks + cached feature records
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tracks (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path       TEXT NOT NULL UNIQUE,
                file_size       INTEGER NOT NULL,
                file_modified   TEXT NOT NULL,
                format          TEXT NOT NULL,

                -- Metadata from tags
                title           TEXT,
                artist          TEXT,
                duration_secs   REAL,

                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_tracks_artist ON tracks(artist);
            CREATE INDEX IF NOT EXISTS idx_tracks_format ON tracks(format);

            CREATE TABLE IF NOT EXISTS track_features (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                track_id            INTEGER NOT NULL UNIQUE REFERENCES tracks(id) ON DELETE CASCADE,

                -- Scalars, denormalized for querying
                bpm                 REAL NOT NULL,
                key                 TEXT NOT NULL,
                camelot_code        TEXT NOT NULL,
                energy_score        REAL NOT NULL,
                duration_sec        REAL NOT NULL,
                loudness_profile    TEXT NOT NULL,
                beat_count          INTEGER NOT NULL,
                drop_count          INTEGER NOT NULL,

                -- Full record as JSON
                features_json       TEXT NOT NULL,

                analyzed_at     TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_features_track ON track_features(track_id);
            CREATE INDEX IF NOT EXISTS idx_features_camelot ON track_features(camelot_code);
            CREATE INDEX IF NOT EXISTS idx_features_bpm ON track_features(bpm);
            ",
        )?;
        Ok(())
    }
}

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

/// Last known play state of one file. `filepath` is the identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub filepath: String,
    pub filename: String,
    pub total_seconds: i64,
    pub current_second: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A registered library root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub directory_path: String,
    pub directory_name: String,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

pub struct Database {
    conn: Connection,
}

pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory().context("failed to open in-memory database")?,
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS media_files (
                filepath TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                total_seconds INTEGER NOT NULL DEFAULT 0,
                current_second INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_media_files_updated_at ON media_files(updated_at DESC);
            CREATE TABLE IF NOT EXISTS workspaces (
                directory_path TEXT PRIMARY KEY,
                directory_name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            "#,
        )?;
        Ok(())
    }

    /// Inserts or refreshes a media file row. `created_at` is only ever written on insert.
    pub fn upsert_media_file(&self, file: &MediaFile) -> Result<()> {
        let now = now_timestamp();
        self.conn
            .execute(
                r#"
                INSERT INTO media_files (filepath, filename, total_seconds, current_second, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                ON CONFLICT(filepath) DO UPDATE SET
                    filename = excluded.filename,
                    total_seconds = excluded.total_seconds,
                    current_second = excluded.current_second,
                    updated_at = excluded.updated_at
                "#,
                params![
                    file.filepath,
                    file.filename,
                    file.total_seconds,
                    file.current_second,
                    now
                ],
            )
            .with_context(|| format!("failed to store media file {}", file.filepath))?;
        Ok(())
    }

    pub fn media_file(&self, filepath: &str) -> Result<Option<MediaFile>> {
        let entry = self
            .conn
            .query_row(
                "SELECT filepath, filename, total_seconds, current_second, created_at, updated_at FROM media_files WHERE filepath = ?1",
                params![filepath],
                media_file_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn latest_media_file(&self) -> Result<Option<MediaFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT filepath, filename, total_seconds, current_second, created_at, updated_at FROM media_files ORDER BY updated_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(media_file_from_row(row)?));
        }
        Ok(None)
    }

    pub fn list_media_files(&self) -> Result<Vec<MediaFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT filepath, filename, total_seconds, current_second, created_at, updated_at FROM media_files ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map([], media_file_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn upsert_workspace(&self, directory_path: &str, directory_name: &str) -> Result<()> {
        let now = now_timestamp();
        self.conn
            .execute(
                r#"
                INSERT INTO workspaces (directory_path, directory_name, created_at, updated_at, deleted_at)
                VALUES (?1, ?2, ?3, ?3, NULL)
                ON CONFLICT(directory_path) DO UPDATE SET
                    directory_name = excluded.directory_name,
                    updated_at = excluded.updated_at,
                    deleted_at = NULL
                "#,
                params![directory_path, directory_name, now],
            )
            .with_context(|| format!("failed to store workspace {directory_path}"))?;
        Ok(())
    }

    pub fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let mut stmt = self.conn.prepare(
            "SELECT directory_path, directory_name, created_at, updated_at, deleted_at FROM workspaces WHERE deleted_at IS NULL ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Workspace {
                directory_path: row.get(0)?,
                directory_name: row.get(1)?,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
                deleted_at: row.get(4)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    #[cfg(test)]
    pub fn soft_delete_workspace(&self, directory_path: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE workspaces SET deleted_at = ?2 WHERE directory_path = ?1",
            params![directory_path, now_timestamp()],
        )?;
        Ok(changed > 0)
    }
}

fn media_file_from_row(row: &Row<'_>) -> rusqlite::Result<MediaFile> {
    Ok(MediaFile {
        filepath: row.get(0)?,
        filename: row.get(1)?,
        total_seconds: row.get(2)?,
        current_second: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn media(filepath: &str, current_second: i64) -> MediaFile {
        MediaFile {
            filepath: filepath.to_string(),
            filename: filepath.rsplit('/').next().unwrap_or(filepath).to_string(),
            total_seconds: 1800,
            current_second,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn upsert_keeps_created_at_and_refreshes_progress() {
        let db = Database::open_in_memory().expect("db");
        db.upsert_media_file(&media("/tv/Show.S01E01.mkv", 10))
            .expect("insert");
        let first = db
            .media_file("/tv/Show.S01E01.mkv")
            .expect("query")
            .expect("row exists");

        thread::sleep(Duration::from_millis(5));
        db.upsert_media_file(&media("/tv/Show.S01E01.mkv", 640))
            .expect("update");
        let second = db
            .media_file("/tv/Show.S01E01.mkv")
            .expect("query")
            .expect("row exists");

        assert_eq!(second.created_at, first.created_at);
        assert_ne!(second.updated_at, first.updated_at);
        assert_eq!(second.current_second, 640);
        assert_eq!(db.list_media_files().expect("list").len(), 1);
    }

    #[test]
    fn latest_media_file_follows_most_recent_update() {
        let db = Database::open_in_memory().expect("db");
        assert!(db.latest_media_file().expect("query").is_none());

        db.upsert_media_file(&media("/tv/A.S01E01.mkv", 1)).expect("insert a");
        thread::sleep(Duration::from_millis(5));
        db.upsert_media_file(&media("/tv/B.S01E01.mkv", 1)).expect("insert b");
        thread::sleep(Duration::from_millis(5));
        db.upsert_media_file(&media("/tv/A.S01E01.mkv", 99)).expect("update a");

        let latest = db.latest_media_file().expect("query").expect("row");
        assert_eq!(latest.filepath, "/tv/A.S01E01.mkv");
        assert_eq!(latest.current_second, 99);
    }

    #[test]
    fn workspaces_are_listed_oldest_first_without_deleted_rows() {
        let db = Database::open_in_memory().expect("db");
        db.upsert_workspace("/media/tv", "tv").expect("insert tv");
        let tv_created_at = db.list_workspaces().expect("list")[0].created_at.clone();
        thread::sleep(Duration::from_millis(5));
        db.upsert_workspace("/media/anime", "anime").expect("insert anime");

        let names: Vec<_> = db
            .list_workspaces()
            .expect("list")
            .into_iter()
            .map(|ws| ws.directory_name)
            .collect();
        assert_eq!(names, vec!["tv", "anime"]);

        assert!(db.soft_delete_workspace("/media/tv").expect("delete"));
        let remaining = db.list_workspaces().expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].directory_path, "/media/anime");

        thread::sleep(Duration::from_millis(5));
        db.upsert_workspace("/media/tv", "tv").expect("re-add tv");
        let restored = db.list_workspaces().expect("list");
        assert_eq!(restored.len(), 2);
        assert!(restored.iter().all(|ws| ws.deleted_at.is_none()));

        let tv = restored
            .iter()
            .find(|ws| ws.directory_path == "/media/tv")
            .expect("tv restored");
        assert_eq!(tv.created_at, tv_created_at);
        assert_ne!(tv.updated_at, tv.created_at);
        assert_eq!(restored[0].directory_path, "/media/tv");
    }
}

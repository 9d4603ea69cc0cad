// Artifact history
//
// Accepted stylesheets persisted outside any refinement run. SQLite with
// WAL mode, schema created on open.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

/// One saved stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub id: String,
    pub label: String,
    pub css: String,
    pub created_at: DateTime<Utc>,
}

pub trait ArtifactStore: Send + Sync {
    fn save(&self, label: &str, css: &str) -> Result<Artifact>;
    fn list(&self) -> Result<Vec<Artifact>>;
    fn delete(&self, id: &str) -> Result<bool>;
}

pub struct SqliteArtifactStore {
    db: Mutex<Connection>,
}

impl SqliteArtifactStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open artifact database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                css TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create artifacts table")?;

        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                css TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }
}

impl ArtifactStore for SqliteArtifactStore {
    fn save(&self, label: &str, css: &str) -> Result<Artifact> {
        let artifact = Artifact {
            id: Uuid::new_v4().to_string(),
            label: label.to_string(),
            css: css.to_string(),
            created_at: Utc::now(),
        };
        let db = self.db.lock().expect("artifact store mutex poisoned");
        db.execute(
            "INSERT INTO artifacts (id, label, css, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                artifact.id,
                artifact.label,
                artifact.css,
                artifact.created_at.to_rfc3339()
            ],
        )
        .context("Failed to insert artifact")?;
        tracing::debug!(id = %artifact.id, label = %artifact.label, "saved artifact");
        Ok(artifact)
    }

    fn list(&self) -> Result<Vec<Artifact>> {
        let db = self.db.lock().expect("artifact store mutex poisoned");
        let mut stmt = db.prepare(
            "SELECT id, label, css, created_at FROM artifacts ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let created_at: String = row.get(3)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                created_at,
            ))
        })?;

        let mut artifacts = Vec::new();
        for row in rows {
            let (id, label, css, created_at) = row?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .with_context(|| format!("invalid timestamp on artifact {id}"))?
                .with_timezone(&Utc);
            artifacts.push(Artifact {
                id,
                label,
                css,
                created_at,
            });
        }
        Ok(artifacts)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().expect("artifact store mutex poisoned");
        let deleted = db.execute("DELETE FROM artifacts WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_list_round_trip() {
        let store = SqliteArtifactStore::open_in_memory().unwrap();
        let saved = store.save("dark theme", "body { background: #111; }").unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], saved);
    }

    #[test]
    fn test_delete_removes_only_target() {
        let store = SqliteArtifactStore::open_in_memory().unwrap();
        let a = store.save("a", "a{}").unwrap();
        let b = store.save("b", "b{}").unwrap();

        assert!(store.delete(&a.id).unwrap());
        let remaining = store.list().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);
    }

    #[test]
    fn test_delete_missing_id_reports_false() {
        let store = SqliteArtifactStore::open_in_memory().unwrap();
        assert!(!store.delete("no-such-id").unwrap());
    }
}

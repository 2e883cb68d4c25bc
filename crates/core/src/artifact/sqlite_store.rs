//! SQLite-backed artifact store implementation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{Artifact, ArtifactError, ArtifactStore, VariationInfo};
use crate::sqlite;

/// SQLite-backed artifact store.
pub struct SqliteArtifactStore {
    conn: Mutex<Connection>,
}

impl SqliteArtifactStore {
    /// Create a new SQLite artifact store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, ArtifactError> {
        let conn = sqlite::open(path).map_err(|e| ArtifactError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite artifact store (useful for testing).
    pub fn in_memory() -> Result<Self, ArtifactError> {
        let conn = sqlite::open_in_memory().map_err(|e| ArtifactError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), ArtifactError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,
                artifact_type TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                bytes INTEGER NOT NULL DEFAULT 0,
                metadata TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS artifact_variations (
                artifact_id TEXT NOT NULL,
                name TEXT NOT NULL,
                bytes INTEGER NOT NULL,
                mime_type TEXT NOT NULL,
                metadata TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (artifact_id, name)
            );
            "#,
        )
        .map_err(|e| ArtifactError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ArtifactError> {
        self.conn
            .lock()
            .map_err(|_| ArtifactError::Database("connection lock poisoned".to_string()))
    }

    fn load(conn: &Connection, id: &str) -> Result<Option<Artifact>, ArtifactError> {
        let row = conn
            .query_row(
                "SELECT id, artifact_type, mime_type, bytes, metadata, created_at FROM artifacts WHERE id = ?",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| ArtifactError::Database(e.to_string()))?;

        let Some((id, artifact_type, mime_type, bytes, metadata, created_at)) = row else {
            return Ok(None);
        };

        let artifact_type = artifact_type
            .parse()
            .map_err(|e: crate::catalog::CatalogError| ArtifactError::Database(e.to_string()))?;
        let metadata = metadata.and_then(|json| serde_json::from_str(&json).ok());

        Ok(Some(Artifact {
            variations: Self::load_variations(conn, &id)?,
            id,
            artifact_type,
            mime_type,
            bytes: bytes.max(0) as u64,
            metadata,
            created_at: sqlite::parse_timestamp(&created_at),
        }))
    }

    fn load_variations(
        conn: &Connection,
        id: &str,
    ) -> Result<BTreeMap<String, VariationInfo>, ArtifactError> {
        let mut stmt = conn
            .prepare(
                "SELECT name, bytes, mime_type, metadata FROM artifact_variations WHERE artifact_id = ?",
            )
            .map_err(|e| ArtifactError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![id], |row| {
                let name: String = row.get(0)?;
                let bytes: i64 = row.get(1)?;
                let mime_type: String = row.get(2)?;
                let metadata_json: String = row.get(3)?;
                Ok((name, bytes, mime_type, metadata_json))
            })
            .map_err(|e| ArtifactError::Database(e.to_string()))?;

        let mut variations = BTreeMap::new();
        for row in rows {
            let (name, bytes, mime_type, metadata_json) =
                row.map_err(|e| ArtifactError::Database(e.to_string()))?;
            let metadata = serde_json::from_str(&metadata_json).unwrap_or(Value::Null);
            variations.insert(
                name,
                VariationInfo {
                    bytes: bytes.max(0) as u64,
                    mime_type,
                    metadata,
                },
            );
        }
        Ok(variations)
    }
}

impl ArtifactStore for SqliteArtifactStore {
    fn insert(&self, artifact: &Artifact) -> Result<(), ArtifactError> {
        let conn = self.conn()?;

        let metadata_json = artifact
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ArtifactError::Database(e.to_string()))?;

        let result = conn.execute(
            "INSERT INTO artifacts (id, artifact_type, mime_type, bytes, metadata, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                artifact.id,
                artifact.artifact_type.as_str(),
                artifact.mime_type,
                artifact.bytes as i64,
                metadata_json,
                artifact.created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(ArtifactError::AlreadyExists(artifact.id.clone()));
            }
            Err(e) => return Err(ArtifactError::Database(e.to_string())),
        }

        for (name, info) in &artifact.variations {
            let metadata_json = serde_json::to_string(&info.metadata)
                .map_err(|e| ArtifactError::Database(e.to_string()))?;
            conn.execute(
                "INSERT OR REPLACE INTO artifact_variations (artifact_id, name, bytes, mime_type, metadata, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    artifact.id,
                    name,
                    info.bytes as i64,
                    info.mime_type,
                    metadata_json,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| ArtifactError::Database(e.to_string()))?;
        }

        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Artifact>, ArtifactError> {
        let conn = self.conn()?;
        Self::load(&conn, id)
    }

    fn set_metadata(&self, id: &str, metadata: &Value, bytes: u64) -> Result<(), ArtifactError> {
        let conn = self.conn()?;

        let metadata_json =
            serde_json::to_string(metadata).map_err(|e| ArtifactError::Database(e.to_string()))?;

        let rows = conn
            .execute(
                "UPDATE artifacts SET metadata = ?, bytes = ? WHERE id = ?",
                params![metadata_json, bytes as i64, id],
            )
            .map_err(|e| ArtifactError::Database(e.to_string()))?;

        if rows == 0 {
            return Err(ArtifactError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn set_variation(
        &self,
        id: &str,
        variation: &str,
        info: &VariationInfo,
    ) -> Result<(), ArtifactError> {
        let conn = self.conn()?;

        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM artifacts WHERE id = ?", params![id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| ArtifactError::Database(e.to_string()))?;
        if exists.is_none() {
            return Err(ArtifactError::NotFound(id.to_string()));
        }

        let metadata_json = serde_json::to_string(&info.metadata)
            .map_err(|e| ArtifactError::Database(e.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO artifact_variations (artifact_id, name, bytes, mime_type, metadata, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (artifact_id, name) DO UPDATE SET
                bytes = excluded.bytes,
                mime_type = excluded.mime_type,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
            params![
                id,
                variation,
                info.bytes as i64,
                info.mime_type,
                metadata_json,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| ArtifactError::Database(e.to_string()))?;

        Ok(())
    }

    fn delete(&self, id: &str) -> Result<Artifact, ArtifactError> {
        let conn = self.conn()?;

        let artifact =
            Self::load(&conn, id)?.ok_or_else(|| ArtifactError::NotFound(id.to_string()))?;

        conn.execute(
            "DELETE FROM artifact_variations WHERE artifact_id = ?",
            params![id],
        )
        .map_err(|e| ArtifactError::Database(e.to_string()))?;
        conn.execute("DELETE FROM artifacts WHERE id = ?", params![id])
            .map_err(|e| ArtifactError::Database(e.to_string()))?;

        Ok(artifact)
    }
}

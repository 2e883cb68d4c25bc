//! SQLite-backed job store implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{
    Job, JobFilter, JobState, JobStore, NewJob, QueueError, QueueKey, QueueStats, Stage, Target,
};
use crate::catalog::MimeCategory;
use crate::processor::ProcessorKind;
use crate::sqlite;

const JOB_COLUMNS: &str = "id, seq, artifact_id, processor, kind, stage, category, src_path, dest_path, src_variation, dest_variation, priority, state, created_at, started_at";

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Create a new SQLite job store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, QueueError> {
        let conn = sqlite::open(path).map_err(|e| QueueError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite job store (useful for testing).
    pub fn in_memory() -> Result<Self, QueueError> {
        let conn = sqlite::open_in_memory().map_err(|e| QueueError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                artifact_id TEXT NOT NULL,
                processor TEXT NOT NULL,
                kind TEXT NOT NULL,
                stage TEXT NOT NULL,
                category TEXT NOT NULL,
                src_path TEXT NOT NULL,
                dest_path TEXT NOT NULL,
                src_variation TEXT,
                dest_variation TEXT,
                target TEXT,
                priority INTEGER NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                started_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_pop ON jobs(stage, category, state, priority, seq);
            CREATE INDEX IF NOT EXISTS idx_jobs_artifact ON jobs(artifact_id, state);

            CREATE TABLE IF NOT EXISTS deletion_markers (
                artifact_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| QueueError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &JobFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref artifact_id) = filter.artifact_id {
            conditions.push("artifact_id = ?");
            params.push(Box::new(artifact_id.clone()));
        }

        match &filter.target {
            Target::Any => {}
            Target::Original => conditions.push("target IS NULL"),
            Target::Variation(name) => {
                conditions.push("target = ?");
                params.push(Box::new(name.clone()));
            }
        }

        if let Some(state) = filter.state {
            conditions.push("state = ?");
            params.push(Box::new(state.as_str()));
        }

        if let Some(queue) = filter.queue {
            conditions.push("stage = ? AND category = ?");
            params.push(Box::new(queue.stage.as_str()));
            params.push(Box::new(queue.category.as_str()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let stage: String = row.get(5)?;
        let category: String = row.get(6)?;
        let src_path: String = row.get(7)?;
        let dest_path: String = row.get(8)?;
        let created_at: String = row.get(13)?;
        let started_at: Option<String> = row.get(14)?;

        Ok(Job {
            id: row.get(0)?,
            seq: row.get(1)?,
            artifact_id: row.get(2)?,
            processor: row.get(3)?,
            kind: parse_column(4, &row.get::<_, String>(4)?)?,
            queue: QueueKey::new(parse_column(5, &stage)?, parse_column(6, &category)?),
            src_path: PathBuf::from(src_path),
            dest_path: PathBuf::from(dest_path),
            src_variation: row.get(9)?,
            dest_variation: row.get(10)?,
            priority: row.get(11)?,
            state: parse_column(12, &row.get::<_, String>(12)?)?,
            created_at: sqlite::parse_timestamp(&created_at),
            started_at: started_at.as_deref().map(sqlite::parse_timestamp),
        })
    }
}

fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e.to_string(),
            )),
        )
    })
}

impl JobStore for SqliteJobStore {
    fn push(&self, job: NewJob) -> Result<Job, QueueError> {
        let conn = self.conn()?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO jobs (id, artifact_id, processor, kind, stage, category, src_path, dest_path, src_variation, dest_variation, target, priority, state, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                job.artifact_id,
                job.processor,
                job.kind.as_str(),
                job.queue.stage.as_str(),
                job.queue.category.as_str(),
                job.src_path.to_string_lossy().to_string(),
                job.dest_path.to_string_lossy().to_string(),
                job.src_variation,
                job.dest_variation,
                job.target(),
                job.priority,
                JobState::Waiting.as_str(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;

        let seq = conn.last_insert_rowid();

        Ok(Job {
            id,
            seq,
            artifact_id: job.artifact_id,
            processor: job.processor,
            kind: job.kind,
            queue: job.queue,
            src_path: job.src_path,
            dest_path: job.dest_path,
            src_variation: job.src_variation,
            dest_variation: job.dest_variation,
            priority: job.priority,
            state: JobState::Waiting,
            created_at: now,
            started_at: None,
        })
    }

    fn pop(&self, queue: QueueKey) -> Result<Option<Job>, QueueError> {
        let mut conn = self.conn()?;

        // IMMEDIATE takes the write lock up front so another process sharing
        // the file cannot claim the same row between SELECT and UPDATE.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let sql = format!(
            "SELECT {} FROM jobs WHERE stage = ? AND category = ? AND state = 'waiting' ORDER BY priority ASC, seq ASC LIMIT 1",
            JOB_COLUMNS
        );
        let job = tx
            .query_row(
                &sql,
                params![queue.stage.as_str(), queue.category.as_str()],
                Self::row_to_job,
            )
            .optional()
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let Some(mut job) = job else {
            return Ok(None);
        };

        let now = Utc::now();
        tx.execute(
            "UPDATE jobs SET state = 'active', started_at = ? WHERE seq = ?",
            params![now.to_rfc3339(), job.seq],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;
        tx.commit()
            .map_err(|e| QueueError::Database(e.to_string()))?;

        job.state = JobState::Active;
        job.started_at = Some(now);
        Ok(Some(job))
    }

    fn remove(&self, id: &str) -> Result<bool, QueueError> {
        let conn = self.conn()?;
        let rows = conn
            .execute("DELETE FROM jobs WHERE id = ?", params![id])
            .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(rows > 0)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM jobs {} ORDER BY priority ASC, seq ASC",
            JOB_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| QueueError::Database(e.to_string()))?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_job)
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let mut jobs = Vec::new();
        for row_result in rows {
            jobs.push(row_result.map_err(|e| QueueError::Database(e.to_string()))?);
        }
        Ok(jobs)
    }

    fn count(&self, filter: &JobFilter) -> Result<usize, QueueError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn
            .query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| QueueError::Database(e.to_string()))?;

        Ok(count.max(0) as usize)
    }

    fn remove_waiting(&self, artifact_id: &str) -> Result<Vec<Job>, QueueError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let jobs = {
            let sql = format!(
                "SELECT {} FROM jobs WHERE artifact_id = ? AND state = 'waiting' ORDER BY seq ASC",
                JOB_COLUMNS
            );
            let mut stmt = tx
                .prepare(&sql)
                .map_err(|e| QueueError::Database(e.to_string()))?;
            let rows = stmt
                .query_map(params![artifact_id], Self::row_to_job)
                .map_err(|e| QueueError::Database(e.to_string()))?;
            let mut jobs = Vec::new();
            for row_result in rows {
                jobs.push(row_result.map_err(|e| QueueError::Database(e.to_string()))?);
            }
            jobs
        };

        tx.execute(
            "DELETE FROM jobs WHERE artifact_id = ? AND state = 'waiting'",
            params![artifact_id],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;
        tx.commit()
            .map_err(|e| QueueError::Database(e.to_string()))?;

        Ok(jobs)
    }

    fn reset_active(&self) -> Result<usize, QueueError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE jobs SET state = 'waiting', started_at = NULL WHERE state = 'active'",
            [],
        )
        .map_err(|e| QueueError::Database(e.to_string()))
    }

    fn stats(&self) -> Result<Vec<QueueStats>, QueueError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare("SELECT stage, category, state, COUNT(*) FROM jobs GROUP BY stage, category, state")
            .map_err(|e| QueueError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let mut counts: HashMap<QueueKey, QueueStats> = QueueKey::all()
            .into_iter()
            .map(|queue| {
                (
                    queue,
                    QueueStats {
                        queue,
                        waiting: 0,
                        active: 0,
                    },
                )
            })
            .collect();

        for row in rows {
            let (stage, category, state, count) =
                row.map_err(|e| QueueError::Database(e.to_string()))?;
            let (Ok(stage), Ok(category), Ok(state)) = (
                stage.parse::<Stage>(),
                category.parse::<MimeCategory>(),
                state.parse::<JobState>(),
            ) else {
                continue;
            };
            if let Some(entry) = counts.get_mut(&QueueKey::new(stage, category)) {
                match state {
                    JobState::Waiting => entry.waiting = count.max(0) as usize,
                    JobState::Active => entry.active = count.max(0) as usize,
                }
            }
        }

        let mut stats: Vec<QueueStats> = counts.into_values().collect();
        stats.sort_by_key(|s| s.queue);
        Ok(stats)
    }

    fn set_deletion_marker(&self, artifact_id: &str) -> Result<(), QueueError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO deletion_markers (artifact_id, created_at) VALUES (?, ?)",
            params![artifact_id, Utc::now().to_rfc3339()],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(())
    }

    fn has_deletion_marker(&self, artifact_id: &str) -> Result<bool, QueueError> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM deletion_markers WHERE artifact_id = ?",
                params![artifact_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(found.is_some())
    }

    fn clear_deletion_marker(&self, artifact_id: &str) -> Result<(), QueueError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM deletion_markers WHERE artifact_id = ?",
            params![artifact_id],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(())
    }
}

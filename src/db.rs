use std::path::Path;

use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialize questions: {0}")]
    Json(#[from] serde_json::Error),
    #[error("create {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// One processed target, keyed by (company, profile).
#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    pub company: String,
    pub profile: String,
    pub questions: Vec<Value>,
    pub source: String,
    pub scraped_at: String,
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if path == ":memory:" {
            return Self::open_in_memory();
        }
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = SqliteStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = SqliteStore {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS mocktest_data (
                company        TEXT NOT NULL,
                profile        TEXT NOT NULL,
                questions      TEXT NOT NULL,
                question_count INTEGER NOT NULL,
                source         TEXT NOT NULL,
                scraped_at     TEXT NOT NULL,
                PRIMARY KEY (company, profile)
            );
            ",
        )?;
        Ok(())
    }

    /// Insert or fully replace the record for (company, profile).
    pub fn upsert(&self, record: &ResultRecord) -> Result<(), StoreError> {
        let questions = serde_json::to_string(&record.questions)?;
        self.conn.execute(
            "INSERT INTO mocktest_data (company, profile, questions, question_count, source, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(company, profile) DO UPDATE SET
                questions      = excluded.questions,
                question_count = excluded.question_count,
                source         = excluded.source,
                scraped_at     = excluded.scraped_at",
            params![
                record.company,
                record.profile,
                questions,
                record.questions.len() as i64,
                record.source,
                record.scraped_at,
            ],
        )?;
        Ok(())
    }

    pub fn fetch_all(&self, limit: usize) -> Result<Vec<ResultRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT company, profile, questions, source, scraped_at
             FROM mocktest_data ORDER BY company, profile LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(company, profile, questions, source, scraped_at)| -> Result<_, StoreError> {
                Ok(ResultRecord {
                    company,
                    profile,
                    questions: serde_json::from_str(&questions)?,
                    source,
                    scraped_at,
                })
            })
            .collect()
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM mocktest_data", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Disabled,
}

/// Best-effort persistence: a missing or broken store turns saves into no-ops.
pub struct PersistenceSink {
    store: Option<SqliteStore>,
}

impl PersistenceSink {
    /// Open the store once at startup. Never fails the process.
    pub fn connect(db_path: Option<&str>) -> Self {
        let Some(path) = db_path.filter(|p| !p.trim().is_empty()) else {
            println!("Warning: MOCKTEST_DB_PATH not set. Data will not be saved to DB.");
            warn!("persistence disabled: no database path configured");
            return PersistenceSink::disabled();
        };
        match SqliteStore::open(path) {
            Ok(store) => {
                println!("Connected to database: {}", path);
                info!(path, "persistence enabled");
                PersistenceSink::with_store(store)
            }
            Err(e) => {
                println!("Database connection failed: {}", e);
                warn!(path, error = %e, "persistence disabled for this run");
                PersistenceSink::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        PersistenceSink { store: None }
    }

    pub fn with_store(store: SqliteStore) -> Self {
        PersistenceSink { store: Some(store) }
    }

    #[cfg(test)]
    pub fn store(&self) -> Option<&SqliteStore> {
        self.store.as_ref()
    }

    pub fn save(&self, record: &ResultRecord) -> Result<SaveOutcome, StoreError> {
        match &self.store {
            Some(store) => {
                store.upsert(record)?;
                Ok(SaveOutcome::Saved)
            }
            None => Ok(SaveOutcome::Disabled),
        }
    }
}

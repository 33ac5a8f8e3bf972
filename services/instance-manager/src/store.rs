//! SQLite-backed object store for engines and replicas.
//!
//! Each object is one row holding its JSON document. Saves are optimistic:
//! the row is only written if its stored `resource_version` still matches
//! the caller's copy, checked in the same statement that writes it.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, warn};

use crate::objects::StoredInstance;

/// Errors from object store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored document changed since the caller read it.
    #[error("version conflict on {name}: expected {expected}, found {actual}")]
    VersionConflict {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("invalid object name: {0:?}")]
    InvalidName(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Engine and replica documents in a local SQLite database.
///
/// Clones share one connection.
#[derive(Clone)]
pub struct InstanceStore {
    conn: Arc<Mutex<Connection>>,
}

impl InstanceStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::init(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS objects (
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                resource_version INTEGER NOT NULL,
                document TEXT NOT NULL,
                PRIMARY KEY (kind, name)
            );
            "#,
        )?;

        debug!("Object store schema initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All stored objects of kind `T`, ordered by name. Undecodable
    /// documents are logged and skipped.
    pub fn list<T: StoredInstance>(&self) -> StoreResult<Vec<T>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name, resource_version, document FROM objects WHERE kind = ?1 ORDER BY name",
        )?;

        let rows = stmt
            .query_map(params![T::KIND.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut objects = Vec::with_capacity(rows.len());
        for (name, version, document) in rows {
            match decode::<T>(version, &document) {
                Ok(obj) => objects.push(obj),
                Err(e) => warn!(kind = %T::KIND, name = %name, error = %e, "Skipping unreadable document"),
            }
        }
        Ok(objects)
    }

    pub fn get<T: StoredInstance>(&self, name: &str) -> StoreResult<Option<T>> {
        check_name(name)?;
        let row = self
            .conn()
            .query_row(
                "SELECT resource_version, document FROM objects WHERE kind = ?1 AND name = ?2",
                params![T::KIND.to_string(), name],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        row.map(|(version, document)| decode(version, &document))
            .transpose()
    }

    /// Save `obj` if the stored version still matches its own, then bump
    /// the version. A missing row counts as version 0.
    ///
    /// On error `obj` keeps its original version.
    pub fn save<T: StoredInstance>(&self, obj: &mut T) -> StoreResult<()> {
        let name = obj.metadata().name.clone();
        check_name(&name)?;

        let expected = obj.metadata().resource_version;
        obj.metadata_mut().resource_version = expected + 1;
        let result = self.write(obj, &name, expected);
        if result.is_err() {
            obj.metadata_mut().resource_version = expected;
        }
        result
    }

    fn write<T: StoredInstance>(&self, obj: &T, name: &str, expected: u64) -> StoreResult<()> {
        let document = serde_json::to_string(obj)?;
        let kind = T::KIND.to_string();
        let conn = self.conn();

        let written = if expected == 0 {
            conn.execute(
                "INSERT INTO objects (kind, name, resource_version, document) VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT(kind, name) DO NOTHING",
                params![kind, name, document],
            )?
        } else {
            conn.execute(
                "UPDATE objects SET resource_version = resource_version + 1, document = ?1
                 WHERE kind = ?2 AND name = ?3 AND resource_version = ?4",
                params![document, kind, name, to_db(expected)],
            )?
        };

        if written == 0 {
            let actual: Option<i64> = conn
                .query_row(
                    "SELECT resource_version FROM objects WHERE kind = ?1 AND name = ?2",
                    params![kind, name],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(StoreError::VersionConflict {
                name: name.to_string(),
                expected,
                actual: actual.map(from_db).unwrap_or(0),
            });
        }

        debug!(
            kind = %T::KIND,
            name = %name,
            resource_version = expected + 1,
            "Saved object"
        );
        Ok(())
    }

    /// Remove an object. Returns false if it did not exist.
    pub fn remove<T: StoredInstance>(&self, name: &str) -> StoreResult<bool> {
        check_name(name)?;
        let removed = self.conn().execute(
            "DELETE FROM objects WHERE kind = ?1 AND name = ?2",
            params![T::KIND.to_string(), name],
        )?;
        Ok(removed > 0)
    }
}

fn check_name(name: &str) -> StoreResult<()> {
    if name.trim().is_empty() {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn to_db(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

fn from_db(version: i64) -> u64 {
    u64::try_from(version).unwrap_or(0)
}

/// The row's version column wins over the one inside the document.
fn decode<T: StoredInstance>(version: i64, document: &str) -> StoreResult<T> {
    let mut obj: T = serde_json::from_str(document)?;
    obj.metadata_mut().resource_version = from_db(version);
    Ok(obj)
}

//! SQLite access layer.
//!
//! [`Db`] holds only the store path; every operation opens its own
//! short-lived connection, so concurrent analytics reads never contend on a
//! shared handle while a write is in flight. WAL journaling gives those
//! readers a consistent snapshot of the graph mid-write.

use crate::error::{PraxisError, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tokio::task;

pub mod migrate;

/// Pragmas applied to every connection. WAL plus a busy timeout lets
/// writers queue instead of failing fast; foreign keys back the composite
/// edge-to-entity references; the large cache and mmap window suit the
/// full-table scans similarity search does.
const CONNECTION_PRAGMAS: &str = "\
    PRAGMA journal_mode = WAL; \
    PRAGMA synchronous = NORMAL; \
    PRAGMA foreign_keys = ON; \
    PRAGMA busy_timeout = 5000; \
    PRAGMA temp_store = MEMORY; \
    PRAGMA cache_size = -65536; \
    PRAGMA mmap_size = 268435456; \
    PRAGMA wal_autocheckpoint = 1000;";

/// Handle to the on-disk knowledge store.
pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Open a configured connection on the current thread. The binaries use
    /// this for one-shot work like schema verification.
    pub fn open_connection(&self) -> Result<Connection> {
        open_configured(&self.path)
    }

    /// Run a closure against a fresh connection on the blocking thread
    /// pool. rusqlite is synchronous, so this is the only place database
    /// work crosses into async code.
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = open_configured(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| PraxisError::Task(e.to_string()))?
    }
}

fn open_configured(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(CONNECTION_PRAGMAS)?;
    Ok(conn)
}

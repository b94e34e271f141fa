//! DuckDB storage layer for archive history synchronization.
//!
//! Holds two tables:
//!
//! - `messages`: canonical message records, one row per stored message
//! - `sync_cursors`: one row of progress markers per conversation
//!
//! A page of synchronized messages and the cursor update derived from the same
//! page are written in a single transaction, so a crash never leaves records
//! persisted with a stale cursor or a cursor pointing past missing records.

mod error;
mod message_store;

pub use error::{StorageError, StorageResult};
pub use message_store::{LocalMessageStore, MessageStore};

use duckdb::Connection;
use std::path::{Path, PathBuf};

/// Memory and thread limits applied to every file-backed store connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub memory_limit: &'static str,
    pub threads: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_limit: "128MB",
            threads: 1,
        }
    }
}

/// Opens the database file at `path` and applies `limits`.
///
/// A message store that was not closed cleanly may leave a write-ahead log
/// that DuckDB refuses to replay. When the first open fails and such a log
/// exists, it is deleted and the open is attempted once more; records of the
/// last uncommitted page are lost and will be fetched again by the next sync.
pub fn open_connection(path: &Path, limits: ResourceLimits) -> StorageResult<Connection> {
    let conn = match Connection::open(path) {
        Ok(conn) => conn,
        Err(err) => {
            let wal = wal_path(path);
            if !wal.exists() {
                return Err(err.into());
            }
            tracing::warn!(
                "[STORE] open of {} failed ({}), discarding {}",
                path.display(),
                err,
                wal.display()
            );
            std::fs::remove_file(&wal)?;
            Connection::open(path)?
        }
    };
    conn.execute_batch(&format!(
        "PRAGMA memory_limit='{}'; PRAGMA threads={};",
        limits.memory_limit, limits.threads
    ))?;
    Ok(conn)
}

/// `messages.duckdb` keeps its log in `messages.duckdb.wal`.
fn wal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".wal");
    PathBuf::from(name)
}

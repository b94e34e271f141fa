//! Message and cursor store backed by DuckDB.

use crate::error::{StorageError, StorageResult};
use crate::ResourceLimits;
use archivesync_types::{AccountId, ConversationKey, MessageRecord, SyncCursor};
use chrono::Utc;
use duckdb::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

/// Storage seam used by the synchronization controllers.
///
/// All methods are blocking; async callers go through `spawn_blocking`.
pub trait LocalMessageStore: Send + Sync {
    /// Returns the cursor for a conversation, creating an empty one on first access.
    fn cursor(&self, key: &ConversationKey) -> StorageResult<SyncCursor>;

    /// True if a stored record of the conversation has this stanza id and text.
    /// `None` matches records stored without a stanza id.
    fn find_by_stanza_and_text(
        &self,
        key: &ConversationKey,
        stanza_id: Option<&str>,
        text: &str,
    ) -> StorageResult<bool>;

    /// Records with this text whose primary or delay timestamp lies in `[from, to]`.
    fn find_by_text_in_time_range(
        &self,
        key: &ConversationKey,
        text: &str,
        from: i64,
        to: i64,
    ) -> StorageResult<Vec<MessageRecord>>;

    /// Inserts records in one transaction.
    fn insert_batch(&self, records: &[MessageRecord]) -> StorageResult<()>;

    /// Inserts records and replaces the conversation cursor in one transaction.
    fn commit_page(
        &self,
        key: &ConversationKey,
        records: &[MessageRecord],
        cursor: &SyncCursor,
    ) -> StorageResult<()>;

    fn mark_remote_history_complete(&self, key: &ConversationKey) -> StorageResult<()>;
}

/// DuckDB implementation of [`LocalMessageStore`].
#[derive(Clone)]
pub struct MessageStore {
    conn: Arc<Mutex<Connection>>,
}

const MESSAGE_COLUMNS: &str = "id, account_id, peer, resource, body, ts, delay_ts, incoming, \
     stanza_id, from_archive, is_read, is_sent, attachment_url";

impl MessageStore {
    /// Opens or creates a message store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = crate::open_connection(path, ResourceLimits::default())?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory message store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All records of a conversation ordered by primary timestamp.
    pub fn messages(&self, key: &ConversationKey) -> StorageResult<Vec<MessageRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE account_id = ? AND peer = ? ORDER BY ts, id"
        ))?;
        let rows = stmt
            .query_map(params![key.account.as_str(), key.peer], read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(row_to_record).collect()
    }

    /// Number of records stored for a conversation.
    pub fn count_messages(&self, key: &ConversationKey) -> StorageResult<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE account_id = ? AND peer = ?",
            params![key.account.as_str(), key.peer],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Returns the stored cursor without creating one.
    pub fn find_cursor(&self, key: &ConversationKey) -> StorageResult<Option<SyncCursor>> {
        let conn = self.conn();
        select_cursor(&conn, key)
    }
}

impl LocalMessageStore for MessageStore {
    fn cursor(&self, key: &ConversationKey) -> StorageResult<SyncCursor> {
        let conn = self.conn();
        if let Some(cursor) = select_cursor(&conn, key)? {
            return Ok(cursor);
        }
        let cursor = SyncCursor::new();
        write_cursor(&conn, key, &cursor)?;
        debug!("[STORE] created cursor for {}", key);
        Ok(cursor)
    }

    fn find_by_stanza_and_text(
        &self,
        key: &ConversationKey,
        stanza_id: Option<&str>,
        text: &str,
    ) -> StorageResult<bool> {
        let conn = self.conn();
        let count: i64 = match stanza_id {
            Some(stanza_id) => conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE account_id = ? AND peer = ? AND stanza_id = ? AND body = ?",
                params![key.account.as_str(), key.peer, stanza_id, text],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE account_id = ? AND peer = ? AND stanza_id IS NULL AND body = ?",
                params![key.account.as_str(), key.peer, text],
                |row| row.get(0),
            )?,
        };
        Ok(count > 0)
    }

    fn find_by_text_in_time_range(
        &self,
        key: &ConversationKey,
        text: &str,
        from: i64,
        to: i64,
    ) -> StorageResult<Vec<MessageRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE account_id = ? AND peer = ? AND body = ? \
             AND ((ts BETWEEN ? AND ?) OR (delay_ts IS NOT NULL AND delay_ts BETWEEN ? AND ?)) \
             ORDER BY ts"
        ))?;
        let rows = stmt
            .query_map(
                params![key.account.as_str(), key.peer, text, from, to, from, to],
                read_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(row_to_record).collect()
    }

    fn insert_batch(&self, records: &[MessageRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let conn = self.conn();
        in_transaction(&conn, |conn| insert_records(conn, records))
    }

    fn commit_page(
        &self,
        key: &ConversationKey,
        records: &[MessageRecord],
        cursor: &SyncCursor,
    ) -> StorageResult<()> {
        let conn = self.conn();
        in_transaction(&conn, |conn| {
            insert_records(conn, records)?;
            write_cursor(conn, key, cursor)
        })?;
        debug!(
            "[STORE] committed {} records for {} (last={:?}, first={:?}, complete={})",
            records.len(),
            key,
            cursor.last_archive_id,
            cursor.first_archive_id,
            cursor.remote_history_complete
        );
        Ok(())
    }

    fn mark_remote_history_complete(&self, key: &ConversationKey) -> StorageResult<()> {
        let conn = self.conn();
        let mut cursor = select_cursor(&conn, key)?.unwrap_or_default();
        cursor.mark_remote_history_complete();
        write_cursor(&conn, key, &cursor)
    }
}

/// Runs `f` between `BEGIN TRANSACTION` and `COMMIT`, rolling back on error.
fn in_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> StorageResult<T>,
) -> StorageResult<T> {
    conn.execute_batch("BEGIN TRANSACTION")?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

fn insert_records(conn: &Connection, records: &[MessageRecord]) -> StorageResult<()> {
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))?;
    for record in records {
        stmt.execute(params![
            record.id.to_string(),
            record.conversation.account.as_str(),
            record.conversation.peer,
            record.resource.as_deref(),
            record.text,
            record.timestamp,
            record.delay_timestamp,
            record.incoming,
            record.stanza_id.as_deref(),
            record.from_archive,
            record.read,
            record.sent,
            record.attachment_url.as_deref(),
        ])?;
    }
    Ok(())
}

fn select_cursor(conn: &Connection, key: &ConversationKey) -> StorageResult<Option<SyncCursor>> {
    let result = conn.query_row(
        "SELECT last_archive_id, first_archive_id, first_stanza_id, remote_history_complete \
         FROM sync_cursors WHERE account_id = ? AND peer = ?",
        params![key.account.as_str(), key.peer],
        |row| {
            Ok(SyncCursor {
                last_archive_id: row.get(0)?,
                first_archive_id: row.get(1)?,
                first_stanza_id: row.get(2)?,
                remote_history_complete: row.get(3)?,
            })
        },
    );

    match result {
        Ok(cursor) => Ok(Some(cursor)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_cursor(conn: &Connection, key: &ConversationKey, cursor: &SyncCursor) -> StorageResult<()> {
    let now = Utc::now().timestamp_millis();
    let updated = conn.execute(
        "UPDATE sync_cursors SET last_archive_id = ?, first_archive_id = ?, first_stanza_id = ?, \
         remote_history_complete = ?, updated_at = ? WHERE account_id = ? AND peer = ?",
        params![
            cursor.last_archive_id.as_deref(),
            cursor.first_archive_id.as_deref(),
            cursor.first_stanza_id.as_deref(),
            cursor.remote_history_complete,
            now,
            key.account.as_str(),
            key.peer,
        ],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO sync_cursors (account_id, peer, last_archive_id, first_archive_id, \
             first_stanza_id, remote_history_complete, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                key.account.as_str(),
                key.peer,
                cursor.last_archive_id.as_deref(),
                cursor.first_archive_id.as_deref(),
                cursor.first_stanza_id.as_deref(),
                cursor.remote_history_complete,
                now,
            ],
        )?;
    }
    Ok(())
}

struct RawRow {
    id: String,
    account_id: String,
    peer: String,
    resource: Option<String>,
    body: String,
    ts: i64,
    delay_ts: Option<i64>,
    incoming: bool,
    stanza_id: Option<String>,
    from_archive: bool,
    is_read: bool,
    is_sent: bool,
    attachment_url: Option<String>,
}

fn read_row(row: &duckdb::Row<'_>) -> duckdb::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        account_id: row.get(1)?,
        peer: row.get(2)?,
        resource: row.get(3)?,
        body: row.get(4)?,
        ts: row.get(5)?,
        delay_ts: row.get(6)?,
        incoming: row.get(7)?,
        stanza_id: row.get(8)?,
        from_archive: row.get(9)?,
        is_read: row.get(10)?,
        is_sent: row.get(11)?,
        attachment_url: row.get(12)?,
    })
}

fn row_to_record(raw: RawRow) -> StorageResult<MessageRecord> {
    let id = Uuid::parse_str(&raw.id)
        .map_err(|e| StorageError::CorruptRow(format!("message id {}: {e}", raw.id)))?;
    Ok(MessageRecord {
        id,
        conversation: ConversationKey {
            account: AccountId(raw.account_id),
            peer: raw.peer,
        },
        resource: raw.resource,
        text: raw.body,
        timestamp: raw.ts,
        delay_timestamp: raw.delay_ts,
        incoming: raw.incoming,
        stanza_id: raw.stanza_id,
        from_archive: raw.from_archive,
        read: raw.is_read,
        sent: raw.is_sent,
        attachment_url: raw.attachment_url,
    })
}

fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id VARCHAR PRIMARY KEY,
            account_id VARCHAR NOT NULL,
            peer VARCHAR NOT NULL,
            resource VARCHAR,
            body VARCHAR NOT NULL,
            ts BIGINT NOT NULL,
            delay_ts BIGINT,
            incoming BOOLEAN NOT NULL,
            stanza_id VARCHAR,
            from_archive BOOLEAN NOT NULL,
            is_read BOOLEAN NOT NULL,
            is_sent BOOLEAN NOT NULL,
            attachment_url VARCHAR
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(account_id, peer);

        CREATE TABLE IF NOT EXISTS sync_cursors (
            account_id VARCHAR NOT NULL,
            peer VARCHAR NOT NULL,
            last_archive_id VARCHAR,
            first_archive_id VARCHAR,
            first_stanza_id VARCHAR,
            remote_history_complete BOOLEAN NOT NULL DEFAULT FALSE,
            updated_at BIGINT NOT NULL,
            PRIMARY KEY (account_id, peer)
        );
        "#,
    )?;
    Ok(())
}

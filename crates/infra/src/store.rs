use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use threadline_domain::mapping::{ProcessedWebhook, ThreadMapping};
use threadline_domain::ports::BoxFuture;
use threadline_domain::ports::store::{InsertOutcome, MappingStore, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS thread_mappings (
    thread_ts       TEXT PRIMARY KEY,
    channel_id      TEXT NOT NULL,
    conversation_id TEXT NOT NULL UNIQUE,
    created_at_ms   INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS processed_webhooks (
    webhook_id      TEXT PRIMARY KEY,
    processed_at_ms INTEGER NOT NULL
);
";

/// File-backed mapping store. The two unique constraints in the schema are
/// the system's only cross-handler synchronization: a losing writer gets
/// `DuplicateKey`, never a second row.
///
/// rusqlite is synchronous, so every call runs the connection work on the
/// blocking pool.
#[derive(Clone)]
pub struct SqliteMappingStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMappingStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    StoreError::Unavailable(format!(
                        "create database directory {}: {err}",
                        parent.display()
                    ))
                })?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|err| StoreError::Unavailable(format!("open database: {err}")))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|err| StoreError::Unavailable(format!("open database: {err}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| {
            row.get::<_, String>(0)
        })
        .map_err(|err| StoreError::Unavailable(format!("set journal_mode: {err}")))?;
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(|err| StoreError::Unavailable(format!("set synchronous: {err}")))?;
        conn.busy_timeout(Duration::from_millis(5_000))
            .map_err(|err| StoreError::Unavailable(format!("set busy_timeout: {err}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|err| StoreError::Unavailable(format!("create schema: {err}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn run_blocking<T>(
    conn: Arc<Mutex<Connection>>,
    op: &'static str,
    f: impl FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
) -> BoxFuture<'static, Result<T, StoreError>>
where
    T: Send + 'static,
{
    Box::pin(async move {
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| {
                tracing::error!(op, "mapping store connection lock poisoned");
                StoreError::Unavailable("connection lock poisoned".into())
            })?;
            f(&guard).map_err(|err| {
                tracing::error!(op, error = %err, "mapping store operation failed");
                StoreError::Operation(format!("{op}: {err}"))
            })
        })
        .await
        .map_err(|err| {
            tracing::error!(op, error = %err, "mapping store task failed");
            StoreError::Unavailable(format!("{op}: {err}"))
        })?
    })
}

fn insert_outcome(result: rusqlite::Result<usize>) -> rusqlite::Result<InsertOutcome> {
    match result {
        Ok(_) => Ok(InsertOutcome::Inserted),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            tracing::debug!("unique constraint hit; reporting duplicate key");
            Ok(InsertOutcome::DuplicateKey)
        }
        Err(err) => Err(err),
    }
}

impl MappingStore for SqliteMappingStore {
    fn create_mapping(
        &self,
        mapping: &ThreadMapping,
    ) -> BoxFuture<'_, Result<InsertOutcome, StoreError>> {
        let mapping = mapping.clone();
        run_blocking(self.conn.clone(), "create_mapping", move |conn| {
            insert_outcome(conn.execute(
                "INSERT INTO thread_mappings (thread_ts, channel_id, conversation_id, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    mapping.thread_ts,
                    mapping.channel_id,
                    mapping.conversation_id,
                    mapping.created_at_ms
                ],
            ))
        })
    }

    fn find_by_conversation_id(
        &self,
        conversation_id: &str,
    ) -> BoxFuture<'_, Result<Option<ThreadMapping>, StoreError>> {
        let conversation_id = conversation_id.to_string();
        run_blocking(self.conn.clone(), "find_by_conversation_id", move |conn| {
            conn.query_row(
                "SELECT thread_ts, channel_id, conversation_id, created_at_ms
                 FROM thread_mappings WHERE conversation_id = ?1",
                params![conversation_id],
                |row| {
                    Ok(ThreadMapping {
                        thread_ts: row.get(0)?,
                        channel_id: row.get(1)?,
                        conversation_id: row.get(2)?,
                        created_at_ms: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    fn has_processed_webhook(
        &self,
        webhook_id: &str,
    ) -> BoxFuture<'_, Result<bool, StoreError>> {
        let webhook_id = webhook_id.to_string();
        run_blocking(self.conn.clone(), "has_processed_webhook", move |conn| {
            conn.query_row(
                "SELECT 1 FROM processed_webhooks WHERE webhook_id = ?1",
                params![webhook_id],
                |_row| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
        })
    }

    fn mark_webhook_processed(
        &self,
        marker: &ProcessedWebhook,
    ) -> BoxFuture<'_, Result<InsertOutcome, StoreError>> {
        let marker = marker.clone();
        run_blocking(self.conn.clone(), "mark_webhook_processed", move |conn| {
            insert_outcome(conn.execute(
                "INSERT INTO processed_webhooks (webhook_id, processed_at_ms) VALUES (?1, ?2)",
                params![marker.webhook_id, marker.processed_at_ms],
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(thread_ts: &str, conversation_id: &str) -> ThreadMapping {
        ThreadMapping::new(thread_ts, "C1", conversation_id).expect("mapping")
    }

    #[tokio::test]
    async fn mapping_round_trips_through_sqlite() {
        let store = SqliteMappingStore::open_in_memory().expect("store");
        let stored = mapping("1712.01", "conv-1");

        assert_eq!(
            store.create_mapping(&stored).await.expect("insert"),
            InsertOutcome::Inserted
        );
        let found = store
            .find_by_conversation_id("conv-1")
            .await
            .expect("lookup")
            .expect("mapping");
        assert_eq!(found, stored);
        assert!(
            store
                .find_by_conversation_id("conv-missing")
                .await
                .expect("lookup")
                .is_none()
        );
    }

    #[tokio::test]
    async fn both_unique_constraints_report_duplicate_key() {
        let store = SqliteMappingStore::open_in_memory().expect("store");
        store
            .create_mapping(&mapping("1712.01", "conv-1"))
            .await
            .expect("insert");

        assert_eq!(
            store
                .create_mapping(&mapping("1712.01", "conv-other"))
                .await
                .expect("insert"),
            InsertOutcome::DuplicateKey
        );
        assert_eq!(
            store
                .create_mapping(&mapping("1712.other", "conv-1"))
                .await
                .expect("insert"),
            InsertOutcome::DuplicateKey
        );
    }

    #[tokio::test]
    async fn webhook_marker_is_claimed_once() {
        let store = SqliteMappingStore::open_in_memory().expect("store");
        let marker = ProcessedWebhook::new("wh-1").expect("marker");

        assert!(!store.has_processed_webhook("wh-1").await.expect("check"));
        assert_eq!(
            store.mark_webhook_processed(&marker).await.expect("mark"),
            InsertOutcome::Inserted
        );
        assert!(store.has_processed_webhook("wh-1").await.expect("check"));
        assert_eq!(
            store.mark_webhook_processed(&marker).await.expect("mark"),
            InsertOutcome::DuplicateKey
        );
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ports::BoxFuture;
use crate::ports::store::{InsertOutcome, MappingStore, StoreError};

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

/// Durable correlation between a channel thread and its support conversation.
/// Append-only: created once when the conversation is opened, never mutated.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadMapping {
    pub thread_ts: String,
    pub channel_id: String,
    pub conversation_id: String,
    pub created_at_ms: i64,
}

impl ThreadMapping {
    pub fn new(
        thread_ts: impl Into<String>,
        channel_id: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let thread_ts = thread_ts.into();
        let channel_id = channel_id.into();
        let conversation_id = conversation_id.into();
        if thread_ts.trim().is_empty()
            || channel_id.trim().is_empty()
            || conversation_id.trim().is_empty()
        {
            return Err(DomainError::Validation(
                "thread_ts, channel_id and conversation_id are required".into(),
            ));
        }
        Ok(Self {
            thread_ts,
            channel_id,
            conversation_id,
            created_at_ms: now_ms(),
        })
    }
}

/// Idempotency marker: a row exists iff the webhook was already handled.
/// Written before the outbound delivery is attempted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessedWebhook {
    pub webhook_id: String,
    pub processed_at_ms: i64,
}

impl ProcessedWebhook {
    pub fn new(webhook_id: impl Into<String>) -> Result<Self, DomainError> {
        let webhook_id = webhook_id.into();
        if webhook_id.trim().is_empty() {
            return Err(DomainError::Validation("Missing webhook id".into()));
        }
        Ok(Self {
            webhook_id,
            processed_at_ms: now_ms(),
        })
    }
}

/// HashMap-backed store used by tests and the `memory` backend. Both unique
/// constraints are checked and inserted under one lock.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMappingStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    by_thread: HashMap<String, ThreadMapping>,
    thread_by_conversation: HashMap<String, String>,
    processed: HashSet<String>,
}

impl MappingStore for InMemoryMappingStore {
    fn create_mapping(
        &self,
        mapping: &ThreadMapping,
    ) -> BoxFuture<'_, Result<InsertOutcome, StoreError>> {
        let inner = self.inner.clone();
        let mapping = mapping.clone();
        Box::pin(async move {
            let mut guard = inner.lock().expect("mapping store lock");
            if guard.by_thread.contains_key(&mapping.thread_ts)
                || guard
                    .thread_by_conversation
                    .contains_key(&mapping.conversation_id)
            {
                return Ok(InsertOutcome::DuplicateKey);
            }
            guard
                .thread_by_conversation
                .insert(mapping.conversation_id.clone(), mapping.thread_ts.clone());
            guard.by_thread.insert(mapping.thread_ts.clone(), mapping);
            Ok(InsertOutcome::Inserted)
        })
    }

    fn find_by_conversation_id(
        &self,
        conversation_id: &str,
    ) -> BoxFuture<'_, Result<Option<ThreadMapping>, StoreError>> {
        let inner = self.inner.clone();
        let conversation_id = conversation_id.to_string();
        Box::pin(async move {
            let guard = inner.lock().expect("mapping store lock");
            let mapping = guard
                .thread_by_conversation
                .get(&conversation_id)
                .and_then(|thread_ts| guard.by_thread.get(thread_ts))
                .cloned();
            Ok(mapping)
        })
    }

    fn has_processed_webhook(
        &self,
        webhook_id: &str,
    ) -> BoxFuture<'_, Result<bool, StoreError>> {
        let inner = self.inner.clone();
        let webhook_id = webhook_id.to_string();
        Box::pin(async move {
            let guard = inner.lock().expect("mapping store lock");
            Ok(guard.processed.contains(&webhook_id))
        })
    }

    fn mark_webhook_processed(
        &self,
        marker: &ProcessedWebhook,
    ) -> BoxFuture<'_, Result<InsertOutcome, StoreError>> {
        let inner = self.inner.clone();
        let webhook_id = marker.webhook_id.clone();
        Box::pin(async move {
            let mut guard = inner.lock().expect("mapping store lock");
            if guard.processed.insert(webhook_id) {
                Ok(InsertOutcome::Inserted)
            } else {
                Ok(InsertOutcome::DuplicateKey)
            }
        })
    }
}

use thiserror::Error;

use super::BoxFuture;
use crate::mapping::{ProcessedWebhook, ThreadMapping};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("mapping store unavailable: {0}")]
    Unavailable(String),
    #[error("mapping store operation failed: {0}")]
    Operation(String),
}

/// Result of an insert against a unique key. `DuplicateKey` means the row
/// already existed; the store's constraint check is the serialization point
/// for concurrent handlers racing on the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateKey,
}

pub trait MappingStore: Send + Sync {
    /// Insert a thread mapping. Returns `DuplicateKey` when either unique
    /// constraint (`thread_ts` or `conversation_id`) would be violated.
    fn create_mapping(
        &self,
        mapping: &ThreadMapping,
    ) -> BoxFuture<'_, Result<InsertOutcome, StoreError>>;

    fn find_by_conversation_id(
        &self,
        conversation_id: &str,
    ) -> BoxFuture<'_, Result<Option<ThreadMapping>, StoreError>>;

    fn has_processed_webhook(&self, webhook_id: &str)
    -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Claim a webhook id before delivering its reply. `DuplicateKey` means a
    /// concurrent handler already claimed it; the caller must abort without
    /// delivering.
    fn mark_webhook_processed(
        &self,
        marker: &ProcessedWebhook,
    ) -> BoxFuture<'_, Result<InsertOutcome, StoreError>>;
}

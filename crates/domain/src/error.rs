use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),
    #[error("Conversation mapping not found")]
    NotFound,
    #[error("mapping store error: {0}")]
    Store(String),
    #[error("upstream call failed: {0}")]
    Upstream(String),
}

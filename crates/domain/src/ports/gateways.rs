use thiserror::Error;

use super::BoxFuture;

/// Material for opening a support conversation from a new channel message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationSeed {
    pub thread_ts: String,
    pub channel_id: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedConversation {
    pub conversation_id: String,
}

/// A support-side reply routed back into its originating channel thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadReply {
    pub channel_id: String,
    pub thread_ts: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway configuration error: {0}")]
    Configuration(String),
    #[error("gateway transport error: {0}")]
    Transport(String),
    #[error("upstream returned status {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("upstream rejected the request: {0}")]
    Rejected(String),
    #[error("gateway response decode error: {0}")]
    InvalidResponse(String),
}

/// Conversation-creation API of the support platform.
pub trait SupportGateway: Send + Sync {
    fn create_conversation(
        &self,
        seed: &ConversationSeed,
    ) -> BoxFuture<'_, Result<CreatedConversation, GatewayError>>;
}

/// Threaded-post API of the chat platform.
pub trait ChatGateway: Send + Sync {
    fn post_thread_reply(&self, reply: &ThreadReply) -> BoxFuture<'_, Result<(), GatewayError>>;
}

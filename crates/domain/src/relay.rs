use std::sync::Arc;

use serde_json::Value;

use crate::error::DomainError;
use crate::events::{self, IgnoreReason, InboundEvent, NewThreadMessage, SlackEnvelope};
use crate::mapping::{ProcessedWebhook, ThreadMapping};
use crate::ports::gateways::{ChatGateway, ConversationSeed, SupportGateway, ThreadReply};
use crate::ports::store::{InsertOutcome, MappingStore, StoreError};

/// What happened to the mapping write after the conversation was created.
/// Neither non-`Recorded` case fails the request: the remote conversation
/// already exists and is not rolled back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MappingPersistence {
    Recorded,
    AlreadyMapped,
    PersistFailed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundOutcome {
    ChallengeEcho(String),
    Ignored(IgnoreReason),
    Relayed {
        conversation_id: String,
        mapping: MappingPersistence,
    },
}

/// Inbound path: a qualifying new channel message opens a support
/// conversation and records the thread mapping.
#[derive(Clone)]
pub struct InboundRelay {
    support: Arc<dyn SupportGateway>,
    store: Arc<dyn MappingStore>,
    bot_user_id: String,
}

impl InboundRelay {
    pub fn new(
        support: Arc<dyn SupportGateway>,
        store: Arc<dyn MappingStore>,
        bot_user_id: impl Into<String>,
    ) -> Self {
        Self {
            support,
            store,
            bot_user_id: bot_user_id.into(),
        }
    }

    pub async fn handle(&self, envelope: &SlackEnvelope) -> Result<InboundOutcome, DomainError> {
        match events::classify(envelope, &self.bot_user_id) {
            InboundEvent::Challenge(value) => Ok(InboundOutcome::ChallengeEcho(value)),
            InboundEvent::Ignored(reason) => Ok(InboundOutcome::Ignored(reason)),
            InboundEvent::NewMessage(message) => self.relay_new_message(message).await,
        }
    }

    async fn relay_new_message(
        &self,
        message: NewThreadMessage,
    ) -> Result<InboundOutcome, DomainError> {
        let seed = ConversationSeed {
            thread_ts: message.thread_ts.clone(),
            channel_id: message.channel_id.clone(),
            text: message.text,
        };
        let created = self
            .support
            .create_conversation(&seed)
            .await
            .map_err(|err| DomainError::Upstream(err.to_string()))?;

        let mapping = ThreadMapping::new(
            message.thread_ts,
            message.channel_id,
            created.conversation_id.clone(),
        )?;
        let mapping = match self.store.create_mapping(&mapping).await {
            Ok(InsertOutcome::Inserted) => MappingPersistence::Recorded,
            Ok(InsertOutcome::DuplicateKey) => MappingPersistence::AlreadyMapped,
            Err(err) => MappingPersistence::PersistFailed(err.to_string()),
        };
        Ok(InboundOutcome::Relayed {
            conversation_id: created.conversation_id,
            mapping,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboundOutcome {
    PingAck,
    AlreadyProcessed,
    Delivered,
}

/// Outbound path: a conversation-update webhook is deduplicated, resolved
/// back to its thread and delivered. The processed marker is written before
/// the delivery call so a crash or a concurrent redelivery cannot post twice.
#[derive(Clone)]
pub struct OutboundRelay {
    chat: Arc<dyn ChatGateway>,
    store: Arc<dyn MappingStore>,
    fallback_channel_id: String,
}

impl OutboundRelay {
    pub fn new(
        chat: Arc<dyn ChatGateway>,
        store: Arc<dyn MappingStore>,
        fallback_channel_id: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            store,
            fallback_channel_id: fallback_channel_id.into(),
        }
    }

    pub async fn handle(&self, payload: &Value) -> Result<OutboundOutcome, DomainError> {
        if events::is_ping(payload) {
            return Ok(OutboundOutcome::PingAck);
        }

        let webhook_id = events::webhook_id(payload)?;
        if self
            .store
            .has_processed_webhook(&webhook_id)
            .await
            .map_err(store_error)?
        {
            return Ok(OutboundOutcome::AlreadyProcessed);
        }

        let update = events::conversation_update(payload)?;
        let mapping = self
            .store
            .find_by_conversation_id(&update.conversation_id)
            .await
            .map_err(store_error)?
            .ok_or(DomainError::NotFound)?;

        let marker = ProcessedWebhook::new(webhook_id)?;
        if self
            .store
            .mark_webhook_processed(&marker)
            .await
            .map_err(store_error)?
            == InsertOutcome::DuplicateKey
        {
            // a concurrent handler claimed this webhook between the check and here
            return Ok(OutboundOutcome::AlreadyProcessed);
        }

        let channel_id = if mapping.channel_id.is_empty() {
            // rows written before channel_id was recorded alongside the thread
            self.fallback_channel_id.clone()
        } else {
            mapping.channel_id
        };
        let reply = ThreadReply {
            channel_id,
            thread_ts: mapping.thread_ts,
            text: update.reply_body,
        };
        self.chat
            .post_thread_reply(&reply)
            .await
            .map_err(|err| DomainError::Upstream(err.to_string()))?;
        Ok(OutboundOutcome::Delivered)
    }
}

fn store_error(err: StoreError) -> DomainError {
    DomainError::Store(err.to_string())
}

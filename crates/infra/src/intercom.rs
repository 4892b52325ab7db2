use std::time::Duration;

use serde_json::{Value, json};

use threadline_domain::events::json_id;
use threadline_domain::ports::BoxFuture;
use threadline_domain::ports::gateways::{
    ConversationSeed, CreatedConversation, GatewayError, SupportGateway,
};

use crate::config::AppConfig;

/// Conversation-creation client for the support platform. Conversations are
/// opened from the configured admin actor, not the human author: the platform
/// only accepts a known actor type. The thread timestamp rides along as
/// `external_id` and inside `custom_attributes` so conversations stay
/// traceable to their thread even outside the mapping store.
#[derive(Clone, Debug)]
pub struct IntercomClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    admin_id: String,
    actor_type: String,
}

impl IntercomClient {
    pub fn from_config(config: &AppConfig) -> Self {
        let timeout = Duration::from_millis(config.http_timeout_ms.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: config.intercom_base_url.trim_end_matches('/').to_string(),
            access_token: config.intercom_access_token.trim().to_string(),
            admin_id: config.intercom_admin_id.trim().to_string(),
            actor_type: config.intercom_actor_type.trim().to_string(),
        }
    }

    async fn create(&self, seed: ConversationSeed) -> Result<CreatedConversation, GatewayError> {
        if self.access_token.is_empty() {
            return Err(GatewayError::Configuration(
                "intercom access token is not configured".into(),
            ));
        }
        let url = format!("{}/conversations", self.base_url);
        let body = json!({
            "from": { "type": self.actor_type, "id": self.admin_id },
            "body": seed.text,
            "message_type": "inapp",
            "external_id": seed.thread_ts,
            "custom_attributes": {
                "slack_thread_ts": seed.thread_ts,
                "slack_channel": seed.channel_id,
            },
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "conversation creation failed upstream");
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;
        let conversation_id = payload.get("id").and_then(json_id).ok_or_else(|| {
            GatewayError::InvalidResponse("conversation id missing from response".into())
        })?;
        Ok(CreatedConversation { conversation_id })
    }
}

impl SupportGateway for IntercomClient {
    fn create_conversation(
        &self,
        seed: &ConversationSeed,
    ) -> BoxFuture<'_, Result<CreatedConversation, GatewayError>> {
        let seed = seed.clone();
        Box::pin(async move { self.create(seed).await })
    }
}

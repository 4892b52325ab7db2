use std::time::Duration;

use serde_json::{Value, json};

use threadline_domain::ports::BoxFuture;
use threadline_domain::ports::gateways::{ChatGateway, GatewayError, ThreadReply};

use crate::config::AppConfig;

/// Threaded-post client for the chat platform.
#[derive(Clone, Debug)]
pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: String,
}

impl SlackClient {
    pub fn from_config(config: &AppConfig) -> Self {
        let timeout = Duration::from_millis(config.http_timeout_ms.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: config.slack_base_url.trim_end_matches('/').to_string(),
            bot_token: config.slack_bot_token.trim().to_string(),
        }
    }

    async fn post(&self, reply: ThreadReply) -> Result<(), GatewayError> {
        if self.bot_token.is_empty() {
            return Err(GatewayError::Configuration(
                "slack bot token is not configured".into(),
            ));
        }
        let url = format!("{}/chat.postMessage", self.base_url);
        let body = json!({
            "channel": reply.channel_id,
            "thread_ts": reply.thread_ts,
            "text": reply.text,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "thread reply failed upstream");
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        // the platform reports application failure inside a 200 body; the
        // transport status alone does not mean the message was posted
        let payload = response
            .json::<Value>()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;
        if payload.get("ok").and_then(Value::as_bool) != Some(true) {
            let error = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            tracing::warn!(error, "thread reply rejected by the platform");
            return Err(GatewayError::Rejected(error.to_string()));
        }
        Ok(())
    }
}

impl ChatGateway for SlackClient {
    fn post_thread_reply(&self, reply: &ThreadReply) -> BoxFuture<'_, Result<(), GatewayError>> {
        let reply = reply.clone();
        Box::pin(async move { self.post(reply).await })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Json, Router, routing::post};
    use tokio::net::TcpListener;

    use super::*;

    fn test_client(base_url: String) -> SlackClient {
        let config = AppConfig {
            app_env: "test".into(),
            port: 0,
            log_level: "info".into(),
            data_backend: "memory".into(),
            database_path: ":memory:".into(),
            slack_base_url: base_url,
            slack_bot_token: "xoxb-test".into(),
            slack_bot_user_id: "U0BOT".into(),
            fallback_channel_id: String::new(),
            intercom_base_url: "http://127.0.0.1:1".into(),
            intercom_access_token: String::new(),
            intercom_admin_id: String::new(),
            intercom_actor_type: "admin".into(),
            http_timeout_ms: 2_000,
        };
        SlackClient::from_config(&config)
    }

    fn reply() -> ThreadReply {
        ThreadReply {
            channel_id: "C1".into(),
            thread_ts: "1712.01".into(),
            text: "<p>hello</p>".into(),
        }
    }

    async fn spawn_stub(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve stub");
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn threaded_post_sends_channel_thread_and_text() {
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let seen_by_stub = seen.clone();
        let app = Router::new().route(
            "/chat.postMessage",
            post(move |Json(body): Json<Value>| {
                let seen = seen_by_stub.clone();
                async move {
                    seen.lock().expect("seen lock").push(body);
                    Json(json!({ "ok": true }))
                }
            }),
        );
        let base_url = spawn_stub(app).await;

        test_client(base_url).post(reply()).await.expect("posted");

        let requests = seen.lock().expect("seen lock").clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["channel"], "C1");
        assert_eq!(requests[0]["thread_ts"], "1712.01");
        assert_eq!(requests[0]["text"], "<p>hello</p>");
    }

    #[tokio::test]
    async fn ok_false_inside_a_200_is_a_delivery_failure() {
        let app = Router::new().route(
            "/chat.postMessage",
            post(|| async { Json(json!({ "ok": false, "error": "channel_not_found" })) }),
        );
        let base_url = spawn_stub(app).await;

        let err = test_client(base_url).post(reply()).await.expect_err("error");
        assert!(matches!(err, GatewayError::Rejected(message) if message == "channel_not_found"));
    }
}

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};

use threadline_domain::error::DomainError;
use threadline_domain::events::SlackEnvelope;
use threadline_domain::relay::{InboundOutcome, MappingPersistence, OutboundOutcome};

use crate::error::ApiError;
use crate::middleware as app_middleware;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/slack/events", post(slack_events))
        .route("/intercom/webhook", post(intercom_webhook))
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
    })
}

async fn slack_events(
    State(state): State<AppState>,
    Json(envelope): Json<SlackEnvelope>,
) -> Response {
    match state.inbound.handle(&envelope).await {
        Ok(InboundOutcome::ChallengeEcho(challenge)) => {
            Json(json!({ "challenge": challenge })).into_response()
        }
        Ok(InboundOutcome::Ignored(reason)) => {
            tracing::debug!(reason = reason.as_str(), "event ignored");
            "Ignored".into_response()
        }
        Ok(InboundOutcome::Relayed {
            conversation_id,
            mapping,
        }) => {
            match mapping {
                MappingPersistence::Recorded => {
                    tracing::info!(%conversation_id, "conversation created and mapped");
                }
                MappingPersistence::AlreadyMapped => {
                    tracing::warn!(%conversation_id, "thread already mapped; keeping first mapping");
                }
                MappingPersistence::PersistFailed(error) => {
                    tracing::error!(%conversation_id, %error, "failed to persist thread mapping");
                }
            }
            "OK".into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to create conversation");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Error creating Intercom conversation",
            )
                .into_response()
        }
    }
}

async fn intercom_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Response, ApiError> {
    match state.outbound.handle(&payload).await {
        Ok(OutboundOutcome::PingAck) => {
            Ok(Json(json!({ "message": "Webhook test received successfully" })).into_response())
        }
        Ok(OutboundOutcome::AlreadyProcessed) => {
            Ok(Json(json!({ "message": "Webhook already processed" })).into_response())
        }
        Ok(OutboundOutcome::Delivered) => Ok(Json(json!({ "success": true })).into_response()),
        Err(DomainError::Upstream(message)) => {
            tracing::error!(error = %message, "failed to deliver reply");
            Err(ApiError::Upstream("Failed to process webhook".into()))
        }
        Err(err) => Err(ApiError::from(err)),
    }
}

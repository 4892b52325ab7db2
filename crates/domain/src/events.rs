use serde::Deserialize;
use serde_json::Value;

use crate::error::DomainError;

/// Envelope posted by the chat platform's events API. `challenge` is the
/// endpoint-verification handshake and short-circuits everything else.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SlackEnvelope {
    pub challenge: Option<String>,
    pub event: Option<SlackEvent>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub subtype: Option<String>,
    pub ts: Option<String>,
    pub channel: Option<String>,
    pub user: Option<String>,
    pub text: Option<String>,
    pub thread_ts: Option<String>,
}

/// A qualifying new top-level channel message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewThreadMessage {
    pub thread_ts: String,
    pub channel_id: String,
    pub author_id: String,
    pub text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    NotAMessage,
    Subtyped,
    ThreadReply,
    OwnBot,
    MissingFields,
}

impl IgnoreReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotAMessage => "not_a_message",
            Self::Subtyped => "subtyped_event",
            Self::ThreadReply => "thread_reply",
            Self::OwnBot => "own_bot_message",
            Self::MissingFields => "missing_fields",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Challenge(String),
    NewMessage(NewThreadMessage),
    Ignored(IgnoreReason),
}

/// Filter an inbound envelope down to the events the relay acts on: plain new
/// top-level messages. Edits, system subtypes, thread replies and the relay's
/// own bot messages are skipped (the last two prevent feedback loops).
pub fn classify(envelope: &SlackEnvelope, bot_user_id: &str) -> InboundEvent {
    if let Some(challenge) = &envelope.challenge {
        return InboundEvent::Challenge(challenge.clone());
    }
    let Some(event) = &envelope.event else {
        return InboundEvent::Ignored(IgnoreReason::NotAMessage);
    };
    if event.event_type.as_deref() != Some("message") {
        return InboundEvent::Ignored(IgnoreReason::NotAMessage);
    }
    if event.subtype.is_some() {
        return InboundEvent::Ignored(IgnoreReason::Subtyped);
    }
    if event.thread_ts.is_some() {
        return InboundEvent::Ignored(IgnoreReason::ThreadReply);
    }
    if !bot_user_id.is_empty() && event.user.as_deref() == Some(bot_user_id) {
        return InboundEvent::Ignored(IgnoreReason::OwnBot);
    }
    let (Some(ts), Some(channel)) = (event.ts.as_deref(), event.channel.as_deref()) else {
        return InboundEvent::Ignored(IgnoreReason::MissingFields);
    };
    InboundEvent::NewMessage(NewThreadMessage {
        thread_ts: ts.to_string(),
        channel_id: channel.to_string(),
        author_id: event.user.clone().unwrap_or_default(),
        text: event.text.clone().unwrap_or_default(),
    })
}

pub const FALLBACK_REPLY_BODY: &str = "No message content";

/// The support platform's connectivity-test notification.
pub fn is_ping(payload: &Value) -> bool {
    payload
        .get("data")
        .and_then(|data| data.get("item"))
        .and_then(|item| item.get("type"))
        .and_then(Value::as_str)
        == Some("ping")
}

pub fn webhook_id(payload: &Value) -> Result<String, DomainError> {
    payload
        .get("id")
        .and_then(json_id)
        .ok_or_else(|| DomainError::Validation("Missing webhook id".into()))
}

/// Conversation-update content extracted from a webhook notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationUpdate {
    pub conversation_id: String,
    pub reply_body: String,
}

/// The latest reply is the first element of the delivered reply list. That
/// ordering is the support platform's contract; whether it is guaranteed
/// chronological is not documented.
pub fn conversation_update(payload: &Value) -> Result<ConversationUpdate, DomainError> {
    let item = payload.get("data").and_then(|data| data.get("item"));
    let part = item
        .and_then(|item| item.get("conversation_parts"))
        .and_then(|parts| parts.get("conversation_parts"))
        .and_then(|parts| parts.get(0))
        .ok_or_else(|| DomainError::Validation("No conversation part found".into()))?;
    let reply_body = part
        .get("body")
        .and_then(Value::as_str)
        .filter(|body| !body.trim().is_empty())
        .unwrap_or(FALLBACK_REPLY_BODY)
        .to_string();
    let conversation_id = item
        .and_then(|item| item.get("id"))
        .and_then(json_id)
        .ok_or_else(|| DomainError::Validation("Missing conversation id".into()))?;
    Ok(ConversationUpdate {
        conversation_id,
        reply_body,
    })
}

/// Identifier fields arrive as strings or bare numbers depending on the
/// platform and payload revision.
pub fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event: Value) -> SlackEnvelope {
        serde_json::from_value(json!({ "event": event })).expect("envelope")
    }

    fn message_event() -> Value {
        json!({
            "type": "message",
            "ts": "1712.01",
            "channel": "C1",
            "user": "U1",
            "text": "help me"
        })
    }

    #[test]
    fn challenge_wins_over_everything() {
        let envelope: SlackEnvelope =
            serde_json::from_value(json!({ "challenge": "abc", "event": message_event() }))
                .expect("envelope");
        assert_eq!(
            classify(&envelope, "U0BOT"),
            InboundEvent::Challenge("abc".into())
        );
    }

    #[test]
    fn plain_top_level_message_qualifies() {
        let got = classify(&envelope(message_event()), "U0BOT");
        assert_eq!(
            got,
            InboundEvent::NewMessage(NewThreadMessage {
                thread_ts: "1712.01".into(),
                channel_id: "C1".into(),
                author_id: "U1".into(),
                text: "help me".into(),
            })
        );
    }

    #[test]
    fn subtyped_and_non_message_events_are_ignored() {
        let mut edited = message_event();
        edited["subtype"] = json!("message_changed");
        assert_eq!(
            classify(&envelope(edited), ""),
            InboundEvent::Ignored(IgnoreReason::Subtyped)
        );

        let mut reaction = message_event();
        reaction["type"] = json!("reaction_added");
        assert_eq!(
            classify(&envelope(reaction), ""),
            InboundEvent::Ignored(IgnoreReason::NotAMessage)
        );
    }

    #[test]
    fn thread_replies_are_ignored() {
        let mut reply = message_event();
        reply["thread_ts"] = json!("1700.00");
        assert_eq!(
            classify(&envelope(reply), ""),
            InboundEvent::Ignored(IgnoreReason::ThreadReply)
        );
    }

    #[test]
    fn own_bot_messages_are_ignored() {
        let mut bot_message = message_event();
        bot_message["user"] = json!("U0BOT");
        assert_eq!(
            classify(&envelope(bot_message), "U0BOT"),
            InboundEvent::Ignored(IgnoreReason::OwnBot)
        );
        // empty bot id disables the filter
        let mut unfiltered = message_event();
        unfiltered["user"] = json!("U0BOT");
        assert!(matches!(
            classify(&envelope(unfiltered), ""),
            InboundEvent::NewMessage(_)
        ));
    }

    fn webhook_payload() -> Value {
        json!({
            "id": "wh-1",
            "type": "notification_event",
            "data": {
                "item": {
                    "type": "conversation",
                    "id": "conv-1",
                    "source": { "id": "src-1" },
                    "conversation_parts": {
                        "conversation_parts": [
                            { "body": "<p>hello</p>", "author": { "type": "admin" } }
                        ]
                    }
                }
            }
        })
    }

    #[test]
    fn ping_is_detected_by_item_type() {
        let payload = json!({ "type": "notification_event", "data": { "item": { "type": "ping" } } });
        assert!(is_ping(&payload));
        assert!(!is_ping(&webhook_payload()));
    }

    #[test]
    fn webhook_id_requires_a_non_blank_id() {
        assert_eq!(webhook_id(&webhook_payload()).expect("id"), "wh-1");
        let err = webhook_id(&json!({ "type": "notification_event" })).expect_err("error");
        assert!(matches!(err, DomainError::Validation(message) if message == "Missing webhook id"));
    }

    #[test]
    fn conversation_update_extracts_body_and_id() {
        let update = conversation_update(&webhook_payload()).expect("update");
        assert_eq!(update.conversation_id, "conv-1");
        assert_eq!(update.reply_body, "<p>hello</p>");
    }

    #[test]
    fn conversation_update_requires_a_part() {
        let mut payload = webhook_payload();
        payload["data"]["item"]["conversation_parts"]["conversation_parts"] = json!([]);
        let err = conversation_update(&payload).expect_err("error");
        assert!(
            matches!(err, DomainError::Validation(message) if message == "No conversation part found")
        );
    }

    #[test]
    fn conversation_update_defaults_a_missing_body() {
        let mut payload = webhook_payload();
        payload["data"]["item"]["conversation_parts"]["conversation_parts"][0]["body"] =
            Value::Null;
        let update = conversation_update(&payload).expect("update");
        assert_eq!(update.reply_body, FALLBACK_REPLY_BODY);
    }

    #[test]
    fn conversation_update_accepts_numeric_item_ids() {
        let mut payload = webhook_payload();
        payload["data"]["item"]["id"] = json!(421);
        let update = conversation_update(&payload).expect("update");
        assert_eq!(update.conversation_id, "421");
    }
}

use serde::Deserialize;
use thiserror::Error;

use skipper_core::event::InboundEvent;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventParseError {
    #[error("envelope is not valid JSON: {0}")]
    Json(String),
    #[error("events_api envelope is missing an envelope_id")]
    MissingEnvelopeId,
}

/// One frame off the Socket Mode connection, pre-filtered down to what the
/// agent cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    /// Present for `events_api` envelopes, which must be acknowledged.
    pub envelope_id: Option<String>,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    /// Sent by Slack right after the connection opens.
    Hello,
    /// Slack is about to close this connection; reconnect.
    Disconnect { reason: String },
    /// A human-authored channel or DM message.
    Message(InboundEvent),
    /// Anything filtered out: bot echoes, edits, joins, unknown types.
    Ignored { reason: String },
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    payload: Option<RawPayload>,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    event: Option<RawEvent>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

/// Parses a raw Socket Mode frame. Bot echoes and subtyped messages (edits,
/// deletions, joins) come back as [`SlackEvent::Ignored`] so the caller still
/// acknowledges the envelope without acting on it.
pub fn parse_envelope(raw: &str) -> Result<SlackEnvelope, EventParseError> {
    let envelope: RawEnvelope =
        serde_json::from_str(raw).map_err(|error| EventParseError::Json(error.to_string()))?;

    match envelope.frame_type.as_str() {
        "hello" => Ok(SlackEnvelope { envelope_id: None, event: SlackEvent::Hello }),
        "disconnect" => Ok(SlackEnvelope {
            envelope_id: None,
            event: SlackEvent::Disconnect {
                reason: envelope.reason.unwrap_or_else(|| "unspecified".to_string()),
            },
        }),
        "events_api" => {
            let envelope_id =
                envelope.envelope_id.ok_or(EventParseError::MissingEnvelopeId)?;
            let event = envelope
                .payload
                .and_then(|payload| payload.event)
                .map(classify_event)
                .unwrap_or(SlackEvent::Ignored { reason: "empty payload".to_string() });
            Ok(SlackEnvelope { envelope_id: Some(envelope_id), event })
        }
        other => Ok(SlackEnvelope {
            envelope_id: envelope.envelope_id,
            event: SlackEvent::Ignored { reason: format!("frame type {other}") },
        }),
    }
}

fn classify_event(event: RawEvent) -> SlackEvent {
    if event.event_type != "message" && event.event_type != "app_mention" {
        return SlackEvent::Ignored {
            reason: format!("event type {}", event.event_type),
        };
    }
    if event.bot_id.is_some() {
        return SlackEvent::Ignored { reason: "bot message".to_string() };
    }
    if let Some(subtype) = event.subtype {
        return SlackEvent::Ignored { reason: format!("subtype {subtype}") };
    }

    let (Some(user), Some(channel)) = (event.user, event.channel) else {
        return SlackEvent::Ignored { reason: "missing user or channel".to_string() };
    };

    let mut inbound = InboundEvent::new(event.text.unwrap_or_default(), channel, user);
    if let Some(ts) = event.ts {
        inbound = inbound.with_ts(ts);
    }
    if let Some(thread_ts) = event.thread_ts {
        inbound = inbound.with_thread(thread_ts);
    }
    SlackEvent::Message(inbound)
}

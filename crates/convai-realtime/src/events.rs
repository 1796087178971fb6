//! Typed events for the upstream conversational-AI wire protocol.
//!
//! Inbound frames are decoded exactly once, at the socket boundary, into
//! [`ServerEvent`]. Event kinds the bridge does not act on are not an error:
//! they decode to [`ServerEvent::Passthrough`] and carry the original JSON so
//! the relay can forward them unchanged.

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of the `conversation_initiation_metadata` event.
///
/// The upstream sends this once, after it has accepted our initiation data.
/// Audio must not be sent before it arrives.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InitiationMetadata {
    pub conversation_id: String,
    #[serde(default)]
    pub agent_output_audio_format: Option<String>,
    #[serde(default)]
    pub user_input_audio_format: Option<String>,
}

/// Body of a keepalive `ping` event. Every ping must be answered with a
/// [`ClientEvent::Pong`] echoing the same `event_id`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PingEvent {
    pub event_id: String,
    #[serde(default)]
    pub ping_ms: Option<u64>,
}

/// One frame received from the upstream socket.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    InitiationMetadata(InitiationMetadata),
    Ping(PingEvent),
    /// An `audio` event. Kept as raw JSON: clients consume the upstream's
    /// audio-event schema directly, so the relay forwards it verbatim.
    Audio(Value),
    /// Any event kind the bridge does not recognize. Relayed verbatim.
    Passthrough(Value),
}

impl ServerEvent {
    /// Decodes one text frame from the upstream socket.
    ///
    /// An unknown `type` tag is fine (pass-through). Text that is not valid
    /// JSON, or a recognized event with a malformed body, is an error.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let value: Value =
            serde_json::from_str(text).context("upstream frame is not valid JSON")?;
        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();

        match kind {
            "conversation_initiation_metadata" => {
                let body = value
                    .get("conversation_initiation_metadata_event")
                    .cloned()
                    .ok_or_else(|| anyhow!("conversation_initiation_metadata without event body"))?;
                let metadata = serde_json::from_value(body)
                    .context("malformed conversation_initiation_metadata_event")?;
                Ok(Self::InitiationMetadata(metadata))
            }
            "ping" => {
                let body = value
                    .get("ping_event")
                    .cloned()
                    .ok_or_else(|| anyhow!("ping without ping_event body"))?;
                let ping = serde_json::from_value(body).context("malformed ping_event")?;
                Ok(Self::Ping(ping))
            }
            "audio" => Ok(Self::Audio(value)),
            _ => Ok(Self::Passthrough(value)),
        }
    }
}

/// Control frames sent to the upstream socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Mandatory greeting, sent immediately after the socket opens. The
    /// upstream will not accept anything else until it has processed this.
    ConversationInitiationClientData {
        dynamic_variables: serde_json::Map<String, Value>,
    },
    /// One-shot situational briefing for the agent.
    ContextualUpdate { text: String },
    /// Keepalive reply; `event_id` echoes the ping being answered.
    Pong { event_id: String },
}

impl ClientEvent {
    /// The initiation greeting with no dynamic variables.
    pub fn initiation() -> Self {
        Self::ConversationInitiationClientData {
            dynamic_variables: serde_json::Map::new(),
        }
    }
}

/// Outbound audio frame. The one upstream message without a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAudioChunk {
    pub user_audio_chunk: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_initiation_metadata() {
        let event = ServerEvent::parse(
            r#"{"type":"conversation_initiation_metadata","conversation_initiation_metadata_event":{"conversation_id":"conv-1","agent_output_audio_format":"pcm_16000"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ServerEvent::InitiationMetadata(InitiationMetadata {
                conversation_id: "conv-1".into(),
                agent_output_audio_format: Some("pcm_16000".into()),
                user_input_audio_format: None,
            })
        );
    }

    #[test]
    fn parses_metadata_without_audio_format() {
        let event = ServerEvent::parse(
            r#"{"type":"conversation_initiation_metadata","conversation_initiation_metadata_event":{"conversation_id":"conv-2"}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::InitiationMetadata(metadata) => {
                assert_eq!(metadata.conversation_id, "conv-2");
                assert_eq!(metadata.agent_output_audio_format, None);
            }
            other => panic!("expected metadata, got {other:?}"),
        }
    }

    #[test]
    fn parses_ping() {
        let event =
            ServerEvent::parse(r#"{"type":"ping","ping_event":{"event_id":"e-7"}}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::Ping(PingEvent {
                event_id: "e-7".into(),
                ping_ms: None,
            })
        );
    }

    #[test]
    fn audio_keeps_the_raw_object() {
        let text = r#"{"type":"audio","audio_event":{"audio_base_64":"QUJD","event_id":"e1"}}"#;
        let event = ServerEvent::parse(text).unwrap();
        match event {
            ServerEvent::Audio(value) => {
                assert_eq!(value, serde_json::from_str::<Value>(text).unwrap());
            }
            other => panic!("expected audio, got {other:?}"),
        }
    }

    #[test]
    fn unknown_kinds_are_passthrough_not_errors() {
        for text in [
            r#"{"type":"agent_response","agent_response_event":{"agent_response":"hi"}}"#,
            r#"{"type":"user_transcript","user_transcription_event":{"user_transcript":"hey"}}"#,
            r#"{"type":"interruption","interruption_event":{"reason":"user"}}"#,
            r#"{"type":"brand_new_event"}"#,
            r#"{"no_type_at_all":true}"#,
        ] {
            let event = ServerEvent::parse(text).unwrap();
            match event {
                ServerEvent::Passthrough(value) => {
                    assert_eq!(value, serde_json::from_str::<Value>(text).unwrap());
                }
                other => panic!("expected passthrough for {text}, got {other:?}"),
            }
        }
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(ServerEvent::parse("not json").is_err());
    }

    #[test]
    fn recognized_kind_with_missing_body_is_an_error() {
        assert!(ServerEvent::parse(r#"{"type":"ping"}"#).is_err());
        assert!(ServerEvent::parse(r#"{"type":"conversation_initiation_metadata"}"#).is_err());
    }

    #[test]
    fn serializes_initiation_greeting() {
        let value = serde_json::to_value(ClientEvent::initiation()).unwrap();
        assert_eq!(
            value,
            json!({"type": "conversation_initiation_client_data", "dynamic_variables": {}})
        );
    }

    #[test]
    fn serializes_contextual_update_and_pong() {
        let update = ClientEvent::ContextualUpdate {
            text: "quarterly review".into(),
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"type": "contextual_update", "text": "quarterly review"})
        );

        let pong = ClientEvent::Pong {
            event_id: "e-7".into(),
        };
        assert_eq!(
            serde_json::to_value(&pong).unwrap(),
            json!({"type": "pong", "event_id": "e-7"})
        );
    }

    #[test]
    fn serializes_audio_chunk_without_type_tag() {
        let chunk = UserAudioChunk {
            user_audio_chunk: "QUJD".into(),
        };
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({"user_audio_chunk": "QUJD"})
        );
    }
}

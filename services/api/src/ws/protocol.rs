//! Defines the WebSocket message protocol between the browser client and the bridge.

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde_json::Value;

/// A JSON text frame received from the client, decoded once at the boundary.
///
/// Raw binary audio frames never reach this type; they are handled at the
/// socket layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Audio wrapped in JSON, for clients that cannot send raw binary frames.
    /// The base64 payload is forwarded as-is, never re-encoded.
    AudioChunk { audio_base_64: String },
    /// A contextual briefing for the agent.
    ContextualUpdate { text: String },
    /// Any other JSON object is relayed to the upstream verbatim, so clients
    /// can use upstream protocol additions the bridge does not know about.
    Passthrough(Value),
}

impl ClientFrame {
    /// Decodes one client text frame. Text that is not valid JSON is an
    /// error; an object of unknown shape is not.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_str(text).context("client frame is not valid JSON")?;

        if let Some(audio) = value.get("user_audio_chunk").and_then(Value::as_str) {
            return Ok(Self::AudioChunk {
                audio_base_64: audio.to_string(),
            });
        }

        match value.get("type").and_then(Value::as_str) {
            Some("contextual_update") => {
                let text = value
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("contextual_update without a text field"))?
                    .to_string();
                Ok(Self::ContextualUpdate { text })
            }
            _ => Ok(Self::Passthrough(value)),
        }
    }
}

/// Control messages emitted by the bridge itself. Relayed upstream events
/// bypass this type and are forwarded exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The upstream acknowledged initialization; audio may flow. Carries the
    /// upstream's negotiated output format so the client can configure its
    /// decoder.
    ConnectionReady {
        conversation_id: String,
        audio_format: String,
    },
    /// The upstream link is gone.
    ConnectionClosed { code: u16, reason: String },
    /// A session-fatal condition, reported before the bridge closes.
    Error { message: String, error: String },
}

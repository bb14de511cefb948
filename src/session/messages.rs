// Wire message types for the agent session
//
// Every message is a tagged JSON object; inbound messages decode into the
// closed ServerEvent enum so the coordinator can match exhaustively instead
// of probing optional fields.

use serde::{Deserialize, Serialize};

use crate::audio::codec;
use crate::session::config::LiveConfig;

/// Sample rate assumed when a chunk's mime descriptor carries no rate
pub const DEFAULT_CHUNK_RATE: u32 = 24_000;

/// One frame's worth of 16-bit PCM, base64-encoded for the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioChunk {
    /// Base64-encoded little-endian PCM16 bytes
    pub data: String,
    /// Format descriptor, e.g. "audio/pcm;rate=16000"
    pub mime_type: String,
}

impl AudioChunk {
    /// Wrap raw PCM16 bytes for transmission
    pub fn from_pcm16(bytes: &[u8], sample_rate: u32) -> Self {
        Self {
            data: codec::encode_base64(bytes),
            mime_type: format!("audio/pcm;rate={}", sample_rate),
        }
    }

    /// Sample rate parsed from the mime descriptor's `rate=` parameter
    pub fn sample_rate(&self) -> u32 {
        self.mime_type
            .split(';')
            .find_map(|part| part.trim().strip_prefix("rate="))
            .and_then(|rate| rate.parse().ok())
            .unwrap_or(DEFAULT_CHUNK_RATE)
    }
}

/// Which side of the conversation a transcript fragment belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// A function call requested by the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Acknowledgment for one handled function call, correlated by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub result: serde_json::Value,
}

/// Outbound messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Session configuration; always the first message on the wire
    Setup { config: LiveConfig },
    /// One block of microphone audio
    Audio { chunk: AudioChunk },
    /// Acknowledgments for a batch of function calls
    ToolResponse { responses: Vec<ToolResult> },
}

/// Inbound messages as they appear on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Transcript { speaker: Speaker, text: String },
    TurnComplete,
    ToolCall { calls: Vec<FunctionCall> },
    Audio { chunk: AudioChunk },
    Error { message: String },
}

/// Inbound events delivered to the coordinator, in arrival order
///
/// Transport-level outcomes (errors, close) are folded in so the
/// coordinator has a single stream to dispatch on.
#[derive(Debug)]
pub enum ServerEvent {
    Transcript { speaker: Speaker, text: String },
    TurnComplete,
    ToolCalls(Vec<FunctionCall>),
    Audio(AudioChunk),
    SessionError(String),
    Closed,
}

impl From<ServerMessage> for ServerEvent {
    fn from(message: ServerMessage) -> Self {
        match message {
            ServerMessage::Transcript { speaker, text } => {
                ServerEvent::Transcript { speaker, text }
            }
            ServerMessage::TurnComplete => ServerEvent::TurnComplete,
            ServerMessage::ToolCall { calls } => ServerEvent::ToolCalls(calls),
            ServerMessage::Audio { chunk } => ServerEvent::Audio(chunk),
            ServerMessage::Error { message } => ServerEvent::SessionError(message),
        }
    }
}

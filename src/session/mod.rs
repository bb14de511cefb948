//! Remote agent session
//!
//! This module owns the wire protocol for the conversational agent:
//! - Open-time configuration (model, voice, transcription, tools)
//! - Tagged message types for both directions
//! - The WebSocket client that turns the socket into an ordered event stream

pub mod client;
pub mod config;
pub mod messages;

pub use client::{AgentSession, WsSession};
pub use config::{LiveConfig, ResponseModality, ToolDeclaration};
pub use messages::{
    AudioChunk, ClientMessage, FunctionCall, ServerEvent, ServerMessage, Speaker, ToolResult,
};

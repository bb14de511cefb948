//! Voice widget session coordination
//!
//! This module provides the `VoiceWidget` abstraction that manages:
//! - The capture -> encode -> send uplink
//! - Dispatch of inbound session events (transcripts, tool calls, audio)
//! - The idle/listening/thinking/speaking status machine
//! - Navigation intents emitted for the embedding application
//! - Best-effort teardown back to idle

pub mod navigation;
pub mod status;
pub mod transcript;
mod widget;

pub use navigation::{AppView, NavigationIntent, NAVIGATE_TOOL};
pub use status::{AssistantStatus, StatusPublisher};
pub use transcript::{TranscriptBuffers, TurnTranscript};
pub use widget::{SessionParts, VoiceWidget, WidgetStats};

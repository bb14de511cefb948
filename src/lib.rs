pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod widget;

pub use audio::{
    AudioFrame, CaptureBackend, CaptureConfig, CpalSpeaker, MicCapture, OutputSink,
    PlaybackScheduler, WavTap,
};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{AgentSession, AudioChunk, LiveConfig, ServerEvent, Speaker, WsSession};
pub use widget::{AppView, AssistantStatus, NavigationIntent, VoiceWidget, WidgetStats};

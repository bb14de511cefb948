use anyhow::Result;
use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub agent: AgentConfig,
    #[serde(default)]
    pub audio: AudioSettings,
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    /// WebSocket endpoint of the conversational agent
    pub endpoint: String,

    /// API key for the agent endpoint. Usually supplied through the
    /// environment (VOICELINK__AGENT__API_KEY) rather than the file.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier
    pub model: String,

    /// Voice identifier for speech synthesis
    pub voice: String,

    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,

    #[serde(default = "default_language_codes")]
    pub language_codes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Microphone capture rate in Hz
    pub capture_sample_rate: u32,

    /// Samples per capture block sent to the agent
    pub capture_block_size: usize,

    /// Speaker output rate in Hz (matches the agent's synthesis rate)
    pub playback_sample_rate: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16_000,
            capture_block_size: 4096,
            playback_sample_rate: 24_000,
        }
    }
}

fn default_system_instruction() -> String {
    "You are a friendly in-app voice assistant. Keep answers brief, and use \
     the navigation tool when the user asks to see a different part of the app."
        .to_string()
}

fn default_language_codes() -> Vec<String> {
    vec!["en-US".to_string()]
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("VOICELINK").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// The agent API key, or a configuration error if it was never set
    pub fn api_key(&self) -> crate::error::Result<&str> {
        match self.agent.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(Error::Config(
                "agent API key is not set (agent.api_key or VOICELINK__AGENT__API_KEY)"
                    .to_string(),
            )),
        }
    }
}

use serde::{Deserialize, Serialize};

/// What the agent responds with. Audio is the only modality the widget
/// plays, but the field is explicit on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseModality {
    Audio,
}

/// A remote action the agent may invoke during the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema for the call arguments
    pub parameters: serde_json::Value,
}

/// Configuration presented to the remote agent when the session opens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Model identifier, e.g. "live-voice-2.0"
    pub model: String,

    pub response_modality: ResponseModality,

    /// Transcribe the user's microphone audio
    pub input_transcription: bool,

    /// Transcribe the agent's synthesized speech
    pub output_transcription: bool,

    /// Voice identifier for speech synthesis
    pub voice: String,

    /// System instruction text framing the conversation
    pub system_instruction: String,

    /// Actions the agent may invoke
    pub tools: Vec<ToolDeclaration>,

    /// BCP-47 codes the agent should understand and speak
    pub language_codes: Vec<String>,
}

impl LiveConfig {
    pub fn new(model: String, voice: String, system_instruction: String) -> Self {
        Self {
            model,
            response_modality: ResponseModality::Audio,
            input_transcription: true,
            output_transcription: true,
            voice,
            system_instruction,
            tools: Vec::new(),
            language_codes: vec!["en-US".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_config_serializes_audio_modality() {
        let config = LiveConfig::new(
            "live-voice-2.0".to_string(),
            "aria".to_string(),
            "You are a helpful assistant.".to_string(),
        );

        let value = serde_json::to_value(&config).unwrap();

        assert_eq!(value["response_modality"], "audio");
        assert_eq!(value["input_transcription"], true);
        assert_eq!(value["language_codes"][0], "en-US");
    }
}

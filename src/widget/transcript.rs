use std::sync::Mutex;

use crate::session::Speaker;

/// Running transcript text for the current turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnTranscript {
    pub user: String,
    pub assistant: String,
}

/// Per-turn transcript buffers for both sides of the conversation
///
/// Fragments accumulate as they arrive; a turn-complete signal clears both
/// buffers, so the transcript is per-turn, not cumulative.
#[derive(Debug, Default)]
pub struct TranscriptBuffers {
    inner: Mutex<TurnTranscript>,
}

impl TranscriptBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to the speaker's buffer
    pub fn append(&self, speaker: Speaker, text: &str) {
        let mut transcript = self.inner.lock().unwrap();
        match speaker {
            Speaker::User => transcript.user.push_str(text),
            Speaker::Assistant => transcript.assistant.push_str(text),
        }
    }

    /// Clear both buffers at the end of a turn
    pub fn clear_turn(&self) {
        let mut transcript = self.inner.lock().unwrap();
        transcript.user.clear();
        transcript.assistant.clear();
    }

    /// Copy of the current turn's transcript
    pub fn snapshot(&self) -> TurnTranscript {
        self.inner.lock().unwrap().clone()
    }
}

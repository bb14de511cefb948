use std::fmt;

use tokio::sync::watch;
use tracing::info;

/// What the assistant is doing right now
///
/// Exactly one value is active; Idle is both the initial and the
/// post-teardown state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssistantStatus {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
}

impl fmt::Display for AssistantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssistantStatus::Idle => "idle",
            AssistantStatus::Listening => "listening",
            AssistantStatus::Thinking => "thinking",
            AssistantStatus::Speaking => "speaking",
        };
        write!(f, "{}", name)
    }
}

/// Publishes status transitions to any number of observers
pub struct StatusPublisher {
    tx: watch::Sender<AssistantStatus>,
}

impl StatusPublisher {
    pub fn new() -> (Self, watch::Receiver<AssistantStatus>) {
        let (tx, rx) = watch::channel(AssistantStatus::Idle);
        (Self { tx }, rx)
    }

    pub fn current(&self) -> AssistantStatus {
        *self.tx.borrow()
    }

    /// Move to `status` unconditionally
    pub fn set(&self, status: AssistantStatus) {
        self.tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            info!("Status: {} -> {}", current, status);
            *current = status;
            true
        });
    }

    /// Move to `to` only if currently `from`; returns whether it moved.
    ///
    /// Used for the speaking->listening drain transition, which must fire
    /// at most once even when several playback units end together.
    pub fn transition_if(&self, from: AssistantStatus, to: AssistantStatus) -> bool {
        self.tx.send_if_modified(|current| {
            if *current != from {
                return false;
            }
            info!("Status: {} -> {}", from, to);
            *current = to;
            true
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<AssistantStatus> {
        self.tx.subscribe()
    }
}

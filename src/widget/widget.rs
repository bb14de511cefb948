use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::audio::capture::CaptureBackend;
use crate::audio::codec;
use crate::audio::playback::PlaybackScheduler;
use crate::audio::tap::WavTap;
use crate::error::Result;
use crate::session::{AgentSession, AudioChunk, FunctionCall, ServerEvent, ToolResult};
use crate::widget::navigation::{self, NavigationIntent, NAVIGATE_TOOL};
use crate::widget::status::{AssistantStatus, StatusPublisher};
use crate::widget::transcript::{TranscriptBuffers, TurnTranscript};

/// A connected agent session plus its inbound event stream
pub type SessionParts = (Arc<dyn AgentSession>, mpsc::Receiver<ServerEvent>);

/// Snapshot of a widget's state
#[derive(Debug, Clone)]
pub struct WidgetStats {
    pub status: AssistantStatus,
    pub opened_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub frames_sent: usize,
    pub playing_units: usize,
}

/// The voice widget session coordinator
///
/// Owns one capture pipeline, one agent session, and one playback scheduler
/// for the duration of a widget-open lifecycle, and drives the
/// idle/listening/thinking/speaking status machine from the session's
/// inbound events. Teardown is best-effort and idempotent: every cleanup
/// step runs even if an earlier one failed, and the widget always lands
/// back on idle.
pub struct VoiceWidget {
    widget_id: String,
    opened_at: DateTime<Utc>,
    session: Arc<dyn AgentSession>,
    capture: Arc<tokio::sync::Mutex<Box<dyn CaptureBackend>>>,
    scheduler: Arc<PlaybackScheduler>,
    status: Arc<StatusPublisher>,
    status_rx: watch::Receiver<AssistantStatus>,
    transcripts: Arc<TranscriptBuffers>,
    last_error: Arc<Mutex<Option<String>>>,
    closing: Arc<AtomicBool>,
    frames_sent: Arc<AtomicUsize>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl VoiceWidget {
    /// Open the widget: start capture, connect the session, begin streaming.
    ///
    /// The capture device is acquired before `connect` runs, so a device
    /// failure means no session is ever opened. If `connect` itself fails
    /// the already-started capture is stopped before the error is returned.
    ///
    /// Navigation intents are delivered on `nav_tx`; `drained_rx` must be
    /// the receiver returned by the scheduler's constructor. An optional
    /// `tap` records the outgoing microphone stream to a WAV file.
    pub async fn open<F, Fut>(
        mut capture: Box<dyn CaptureBackend>,
        connect: F,
        scheduler: Arc<PlaybackScheduler>,
        drained_rx: mpsc::UnboundedReceiver<()>,
        nav_tx: mpsc::UnboundedSender<NavigationIntent>,
        tap: Option<WavTap>,
    ) -> Result<Self>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SessionParts>>,
    {
        let widget_id = uuid::Uuid::new_v4().to_string();
        info!("Opening voice widget {} ({})", widget_id, capture.name());

        let frames = capture.start().await?;

        let (session, events) = match connect().await {
            Ok(parts) => parts,
            Err(e) => {
                capture.stop().await;
                return Err(e);
            }
        };

        let (status, status_rx) = StatusPublisher::new();
        let status = Arc::new(status);
        let capture = Arc::new(tokio::sync::Mutex::new(capture));
        let transcripts = Arc::new(TranscriptBuffers::new());
        let last_error = Arc::new(Mutex::new(None));
        let closing = Arc::new(AtomicBool::new(false));
        let frames_sent = Arc::new(AtomicUsize::new(0));

        status.set(AssistantStatus::Listening);

        let mut tasks = Vec::new();
        tasks.push(Self::spawn_uplink(
            frames,
            Arc::clone(&session),
            Arc::clone(&closing),
            Arc::clone(&frames_sent),
            tap,
        ));
        tasks.push(Self::spawn_dispatch(
            events,
            Arc::clone(&session),
            Arc::clone(&capture),
            Arc::clone(&scheduler),
            Arc::clone(&status),
            Arc::clone(&transcripts),
            Arc::clone(&last_error),
            Arc::clone(&closing),
            nav_tx,
        ));
        tasks.push(Self::spawn_drain(
            drained_rx,
            Arc::clone(&status),
            Arc::clone(&closing),
        ));

        Ok(Self {
            widget_id,
            opened_at: Utc::now(),
            session,
            capture,
            scheduler,
            status,
            status_rx,
            transcripts,
            last_error,
            closing,
            frames_sent,
            tasks: Mutex::new(tasks),
        })
    }

    /// Close the widget and tear everything down. Idempotent.
    pub async fn close(&self) {
        teardown(
            &self.closing,
            &self.capture,
            self.session.as_ref(),
            &self.scheduler,
            &self.status,
        )
        .await;

        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        info!("Voice widget {} closed", self.widget_id);
    }

    /// Observe status transitions
    pub fn status(&self) -> watch::Receiver<AssistantStatus> {
        self.status_rx.clone()
    }

    pub fn current_status(&self) -> AssistantStatus {
        self.status.current()
    }

    /// Current turn's transcript (cleared on every turn-complete signal)
    pub fn transcripts(&self) -> TurnTranscript {
        self.transcripts.snapshot()
    }

    /// Message for the last terminal error, if any
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    pub fn is_open(&self) -> bool {
        !self.closing.load(Ordering::SeqCst)
    }

    pub fn widget_id(&self) -> &str {
        &self.widget_id
    }

    pub fn stats(&self) -> WidgetStats {
        let duration = Utc::now().signed_duration_since(self.opened_at);
        WidgetStats {
            status: self.status.current(),
            opened_at: self.opened_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_sent: self.frames_sent.load(Ordering::SeqCst),
            playing_units: self.scheduler.active_count(),
        }
    }

    /// Forward capture blocks to the session as base64 PCM16 chunks.
    ///
    /// Blocks keep streaming while the assistant speaks; the agent protocol
    /// alone decides how to treat barge-in audio.
    fn spawn_uplink(
        mut frames: mpsc::Receiver<crate::audio::AudioFrame>,
        session: Arc<dyn AgentSession>,
        closing: Arc<AtomicBool>,
        frames_sent: Arc<AtomicUsize>,
        mut tap: Option<WavTap>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                if closing.load(Ordering::SeqCst) {
                    break;
                }

                if let Some(tap) = tap.as_mut() {
                    if let Err(e) = tap.write(&frame.samples) {
                        warn!("Session tap write failed: {}", e);
                    }
                }

                let pcm = codec::float_to_pcm16(&frame.samples);
                let chunk = AudioChunk::from_pcm16(&pcm, frame.sample_rate);
                if let Err(e) = session.send_audio(chunk).await {
                    if !closing.load(Ordering::SeqCst) {
                        warn!("Failed to send capture block: {}", e);
                    }
                    break;
                }
                frames_sent.fetch_add(1, Ordering::SeqCst);
            }

            if let Some(tap) = tap.take() {
                if let Err(e) = tap.finish() {
                    warn!("Failed to finalize session tap: {}", e);
                }
            }
            info!("Capture uplink stopped");
        })
    }

    /// Handle inbound session events one at a time, in arrival order.
    #[allow(clippy::too_many_arguments)]
    fn spawn_dispatch(
        mut events: mpsc::Receiver<ServerEvent>,
        session: Arc<dyn AgentSession>,
        capture: Arc<tokio::sync::Mutex<Box<dyn CaptureBackend>>>,
        scheduler: Arc<PlaybackScheduler>,
        status: Arc<StatusPublisher>,
        transcripts: Arc<TranscriptBuffers>,
        last_error: Arc<Mutex<Option<String>>>,
        closing: Arc<AtomicBool>,
        nav_tx: mpsc::UnboundedSender<NavigationIntent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ServerEvent::Transcript { speaker, text } => {
                        info!("Transcript ({:?}): {}", speaker, text);
                        transcripts.append(speaker, &text);
                    }
                    ServerEvent::TurnComplete => {
                        info!("Turn complete");
                        transcripts.clear_turn();
                    }
                    ServerEvent::ToolCalls(calls) => {
                        status.set(AssistantStatus::Thinking);
                        let responses = handle_tool_calls(calls, &nav_tx);
                        if !responses.is_empty() {
                            if let Err(e) = session.send_tool_results(responses).await {
                                warn!("Failed to acknowledge function calls: {}", e);
                            }
                        }
                    }
                    ServerEvent::Audio(chunk) => {
                        status.set(AssistantStatus::Speaking);
                        if let Err(e) = scheduler.enqueue(&chunk) {
                            warn!("Failed to schedule audio chunk: {}", e);
                        }
                    }
                    ServerEvent::SessionError(message) => {
                        error!("Agent session error: {}", message);
                        *last_error.lock().unwrap() = Some(message);
                        teardown(&closing, &capture, session.as_ref(), &scheduler, &status)
                            .await;
                        break;
                    }
                    ServerEvent::Closed => {
                        if !closing.load(Ordering::SeqCst) {
                            *last_error.lock().unwrap() =
                                Some("agent session closed by remote".to_string());
                        }
                        teardown(&closing, &capture, session.as_ref(), &scheduler, &status)
                            .await;
                        break;
                    }
                }
            }
            info!("Session dispatch stopped");
        })
    }

    /// Turn scheduler-drained signals into speaking -> listening.
    fn spawn_drain(
        mut drained_rx: mpsc::UnboundedReceiver<()>,
        status: Arc<StatusPublisher>,
        closing: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while drained_rx.recv().await.is_some() {
                if closing.load(Ordering::SeqCst) {
                    break;
                }
                status.transition_if(AssistantStatus::Speaking, AssistantStatus::Listening);
            }
        })
    }
}

/// Handle one batch of function calls, emitting navigation intents and one
/// acknowledgment per recognized call.
///
/// Unrecognized names are skipped entirely; a recognized navigation call
/// with a bad `view` argument is acknowledged with an error payload and
/// emits no intent.
fn handle_tool_calls(
    calls: Vec<FunctionCall>,
    nav_tx: &mpsc::UnboundedSender<NavigationIntent>,
) -> Vec<ToolResult> {
    let mut responses = Vec::new();

    for call in calls {
        if call.name != NAVIGATE_TOOL {
            info!("Ignoring unrecognized function call '{}'", call.name);
            continue;
        }

        match navigation::parse_view_argument(&call.args) {
            Some(view) => {
                info!("Navigation request: {}", view.as_str());
                let _ = nav_tx.send(NavigationIntent { target: view });
                responses.push(ToolResult {
                    id: call.id,
                    name: call.name,
                    result: json!({ "status": "ok", "view": view.as_str() }),
                });
            }
            None => {
                warn!("Function call {} carried an invalid view argument", call.id);
                responses.push(ToolResult {
                    id: call.id,
                    name: call.name,
                    result: json!({ "error": "unknown view" }),
                });
            }
        }
    }

    responses
}

/// Best-effort teardown back to idle.
///
/// Runs at most once per widget lifecycle; every step is attempted
/// independently so one failure cannot skip the rest.
async fn teardown(
    closing: &AtomicBool,
    capture: &tokio::sync::Mutex<Box<dyn CaptureBackend>>,
    session: &dyn AgentSession,
    scheduler: &PlaybackScheduler,
    status: &StatusPublisher,
) {
    if closing.swap(true, Ordering::SeqCst) {
        return;
    }
    info!("Tearing down voice widget");

    capture.lock().await.stop().await;

    scheduler.shutdown();

    if let Err(e) = session.close().await {
        warn!("Failed to close agent session: {}", e);
    }

    status.set(AssistantStatus::Idle);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, name: &str, args: serde_json::Value) -> FunctionCall {
        FunctionCall {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn test_navigation_call_yields_intent_and_ack() {
        let (nav_tx, mut nav_rx) = mpsc::unbounded_channel();

        let responses = handle_tool_calls(
            vec![call("call-1", NAVIGATE_TOOL, json!({"view": "dashboard"}))],
            &nav_tx,
        );

        let intent = nav_rx.try_recv().unwrap();
        assert_eq!(intent.target.as_str(), "dashboard");
        assert!(nav_rx.try_recv().is_err(), "exactly one intent expected");

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, "call-1");
        assert_eq!(responses[0].result["status"], "ok");
    }

    #[test]
    fn test_unknown_function_is_ignored_without_ack() {
        let (nav_tx, mut nav_rx) = mpsc::unbounded_channel();

        let responses = handle_tool_calls(
            vec![call("call-2", "set_volume", json!({"level": 3}))],
            &nav_tx,
        );

        assert!(responses.is_empty());
        assert!(nav_rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_view_is_acked_with_error_and_no_intent() {
        let (nav_tx, mut nav_rx) = mpsc::unbounded_channel();

        let responses = handle_tool_calls(
            vec![call("call-3", NAVIGATE_TOOL, json!({"view": "nowhere"}))],
            &nav_tx,
        );

        assert!(nav_rx.try_recv().is_err());
        assert_eq!(responses.len(), 1);
        assert!(responses[0].result.get("error").is_some());
    }

    #[test]
    fn test_multiple_calls_each_get_their_own_ack() {
        let (nav_tx, mut nav_rx) = mpsc::unbounded_channel();

        let responses = handle_tool_calls(
            vec![
                call("a", NAVIGATE_TOOL, json!({"view": "tasks"})),
                call("b", "unknown_tool", json!({})),
                call("c", NAVIGATE_TOOL, json!({"view": "settings"})),
            ],
            &nav_tx,
        );

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].id, "a");
        assert_eq!(responses[1].id, "c");
        assert!(nav_rx.try_recv().is_ok());
        assert!(nav_rx.try_recv().is_ok());
        assert!(nav_rx.try_recv().is_err());
    }
}

// Gapless playback scheduling for synthesized audio chunks
//
// Chunks arrive from the session at irregular intervals relative to their
// playback duration. Each chunk is scheduled on the output clock at
// max(cursor, now) and the cursor advances by the chunk's duration, so
// consecutive chunks play back-to-back regardless of network jitter. The
// scheduler tracks every unit still playing; when the last one ends it
// emits a single "drained" event, which is the agent-finished-speaking
// signal for the status machine.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::audio::codec;
use crate::error::Result;
use crate::session::AudioChunk;

/// A unit handed to an output sink, with its ended-notification
pub struct ScheduledSource {
    /// Sink-assigned source id
    pub id: u64,
    /// Resolved when the unit finishes playing naturally
    pub ended: oneshot::Receiver<()>,
}

/// Output device seam for the scheduler
///
/// `clock_time` must be monotonically non-decreasing; `schedule` queues
/// samples to begin at `start_time` on that same clock.
pub trait OutputSink: Send + Sync {
    /// Current position of the output clock, in seconds
    fn clock_time(&self) -> f64;

    /// Sample rate the sink renders at
    fn sample_rate(&self) -> u32;

    /// Schedule mono samples to start at `start_time` on the sink clock
    fn schedule(&self, samples: Vec<f32>, start_time: f64) -> Result<ScheduledSource>;
}

/// Schedules decoded audio chunks back-to-back on an output sink
pub struct PlaybackScheduler {
    sink: Arc<dyn OutputSink>,

    /// Next start time on the sink clock. Read-then-advanced as one step
    /// per chunk so no two chunks ever see a stale cursor.
    next_start: Mutex<f64>,

    /// Source ids currently playing
    active: Arc<Mutex<HashSet<u64>>>,

    /// Emits once whenever the active set drains to empty
    drained_tx: mpsc::UnboundedSender<()>,

    /// Set at teardown; no new units are scheduled afterwards
    closed: AtomicBool,
}

impl PlaybackScheduler {
    /// Create a scheduler over the given sink.
    ///
    /// The returned receiver yields one message each time the set of
    /// playing units becomes empty.
    pub fn new(sink: Arc<dyn OutputSink>) -> (Arc<Self>, mpsc::UnboundedReceiver<()>) {
        let (drained_tx, drained_rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(Self {
            sink,
            next_start: Mutex::new(0.0),
            active: Arc::new(Mutex::new(HashSet::new())),
            drained_tx,
            closed: AtomicBool::new(false),
        });
        (scheduler, drained_rx)
    }

    /// Decode a wire chunk and schedule it after everything already queued.
    pub fn enqueue(&self, chunk: &AudioChunk) -> Result<()> {
        let bytes = codec::decode_base64(&chunk.data)?;
        let mut channels = codec::pcm16_to_float(&bytes, 1);
        let samples = channels.pop().unwrap_or_default();
        self.enqueue_samples(samples, chunk.sample_rate())
    }

    /// Schedule already-decoded mono samples after everything queued so far.
    pub fn enqueue_samples(&self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            debug!("Scheduler is shut down; dropping {} samples", samples.len());
            return Ok(());
        }
        if samples.is_empty() || sample_rate == 0 {
            return Ok(());
        }

        if sample_rate != self.sink.sample_rate() {
            warn!(
                "Chunk rate {}Hz differs from output rate {}Hz",
                sample_rate,
                self.sink.sample_rate()
            );
        }

        let duration = samples.len() as f64 / sample_rate as f64;

        // One critical section covers reading the cursor, clamping it to
        // "now", and advancing it, so concurrent chunks serialize here.
        let start_time = {
            let mut next_start = self.next_start.lock().unwrap();
            let start = next_start.max(self.sink.clock_time());
            *next_start = start + duration;
            start
        };

        let source = self.sink.schedule(samples, start_time)?;
        debug!(
            "Scheduled source {} at {:.3}s for {:.3}s",
            source.id, start_time, duration
        );

        self.active.lock().unwrap().insert(source.id);

        let active = Arc::clone(&self.active);
        let drained_tx = self.drained_tx.clone();
        let id = source.id;
        tokio::spawn(async move {
            // A dropped sender also counts as ended; either way the unit
            // leaves the active set exactly once.
            let _ = source.ended.await;

            let now_empty = {
                let mut active = active.lock().unwrap();
                active.remove(&id) && active.is_empty()
            };
            if now_empty {
                let _ = drained_tx.send(());
            }
        });

        Ok(())
    }

    /// Number of units currently playing
    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    /// Next start time on the sink clock (for inspection)
    pub fn next_start_time(&self) -> f64 {
        *self.next_start.lock().unwrap()
    }

    /// Stop accepting new units. Units already playing run to completion.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

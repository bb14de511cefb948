// Integration tests for the playback scheduler
//
// A fake output sink with a manually-advanced clock verifies the gapless
// scheduling contract without any audio device: back-to-back start times,
// cursor reset after silence, and the drained signal.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use voicelink::audio::codec;
use voicelink::audio::playback::{OutputSink, PlaybackScheduler, ScheduledSource};
use voicelink::session::AudioChunk;

struct FakeSink {
    sample_rate: u32,
    clock: Mutex<f64>,
    /// (id, sample count, start time) per schedule call
    scheduled: Mutex<Vec<(u64, usize, f64)>>,
    ended: Mutex<VecDeque<oneshot::Sender<()>>>,
    next_id: Mutex<u64>,
}

impl FakeSink {
    fn new(sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            sample_rate,
            clock: Mutex::new(0.0),
            scheduled: Mutex::new(Vec::new()),
            ended: Mutex::new(VecDeque::new()),
            next_id: Mutex::new(0),
        })
    }

    fn advance_clock(&self, seconds: f64) {
        *self.clock.lock().unwrap() += seconds;
    }

    fn finish_next(&self) {
        let sender = self.ended.lock().unwrap().pop_front().expect("no unit to finish");
        let _ = sender.send(());
    }

    fn finish_all(&self) {
        let mut ended = self.ended.lock().unwrap();
        while let Some(sender) = ended.pop_front() {
            let _ = sender.send(());
        }
    }

    fn start_times(&self) -> Vec<f64> {
        self.scheduled.lock().unwrap().iter().map(|s| s.2).collect()
    }

    fn schedule_count(&self) -> usize {
        self.scheduled.lock().unwrap().len()
    }
}

impl OutputSink for FakeSink {
    fn clock_time(&self) -> f64 {
        *self.clock.lock().unwrap()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn schedule(&self, samples: Vec<f32>, start_time: f64) -> voicelink::Result<ScheduledSource> {
        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;

        let (ended_tx, ended) = oneshot::channel();
        self.scheduled.lock().unwrap().push((id, samples.len(), start_time));
        self.ended.lock().unwrap().push_back(ended_tx);

        Ok(ScheduledSource { id, ended })
    }
}

/// Give spawned bookkeeping tasks a chance to run
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_chunks_are_scheduled_back_to_back() {
    let sink = FakeSink::new(1000);
    let (scheduler, _drained_rx) = PlaybackScheduler::new(Arc::clone(&sink) as Arc<dyn OutputSink>);

    // Durations: 1.0s, 0.5s, 0.25s at 1000 Hz
    scheduler.enqueue_samples(vec![0.0; 1000], 1000).unwrap();
    scheduler.enqueue_samples(vec![0.0; 500], 1000).unwrap();
    scheduler.enqueue_samples(vec![0.0; 250], 1000).unwrap();

    assert_eq!(sink.start_times(), vec![0.0, 1.0, 1.5]);
    assert_eq!(scheduler.active_count(), 3, "all three units in flight");
}

#[tokio::test]
async fn test_cursor_resets_after_silence() {
    let sink = FakeSink::new(1000);
    let (scheduler, _drained_rx) = PlaybackScheduler::new(Arc::clone(&sink) as Arc<dyn OutputSink>);

    scheduler.enqueue_samples(vec![0.0; 1000], 1000).unwrap();
    assert_eq!(sink.start_times(), vec![0.0]);

    // Long gap: the clock has moved past the cursor when the next chunk lands
    sink.advance_clock(5.0);
    scheduler.enqueue_samples(vec![0.0; 1000], 1000).unwrap();

    assert_eq!(sink.start_times(), vec![0.0, 5.0]);
    assert_eq!(scheduler.next_start_time(), 6.0);
}

#[tokio::test]
async fn test_wire_chunk_durations_come_from_the_mime_rate() {
    let sink = FakeSink::new(24_000);
    let (scheduler, _drained_rx) = PlaybackScheduler::new(Arc::clone(&sink) as Arc<dyn OutputSink>);

    // 12000 samples at 24kHz = 0.5s per chunk
    let pcm = codec::float_to_pcm16(&vec![0.1; 12_000]);
    let chunk = AudioChunk::from_pcm16(&pcm, 24_000);

    scheduler.enqueue(&chunk).unwrap();
    scheduler.enqueue(&chunk).unwrap();

    assert_eq!(sink.start_times(), vec![0.0, 0.5]);
}

#[tokio::test]
async fn test_drained_fires_once_when_all_units_end_together() {
    let sink = FakeSink::new(1000);
    let (scheduler, mut drained_rx) =
        PlaybackScheduler::new(Arc::clone(&sink) as Arc<dyn OutputSink>);

    scheduler.enqueue_samples(vec![0.0; 100], 1000).unwrap();
    scheduler.enqueue_samples(vec![0.0; 100], 1000).unwrap();
    scheduler.enqueue_samples(vec![0.0; 100], 1000).unwrap();

    sink.finish_all();
    settle().await;

    assert_eq!(scheduler.active_count(), 0);
    assert!(drained_rx.try_recv().is_ok(), "one drained signal expected");
    assert!(
        drained_rx.try_recv().is_err(),
        "drained must fire exactly once for one silence"
    );
}

#[tokio::test]
async fn test_drained_fires_per_silence_period() {
    let sink = FakeSink::new(1000);
    let (scheduler, mut drained_rx) =
        PlaybackScheduler::new(Arc::clone(&sink) as Arc<dyn OutputSink>);

    scheduler.enqueue_samples(vec![0.0; 100], 1000).unwrap();
    sink.finish_next();
    settle().await;
    assert!(drained_rx.try_recv().is_ok());

    scheduler.enqueue_samples(vec![0.0; 100], 1000).unwrap();
    sink.finish_next();
    settle().await;
    assert!(drained_rx.try_recv().is_ok());
    assert!(drained_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_no_drain_while_units_remain() {
    let sink = FakeSink::new(1000);
    let (scheduler, mut drained_rx) =
        PlaybackScheduler::new(Arc::clone(&sink) as Arc<dyn OutputSink>);

    scheduler.enqueue_samples(vec![0.0; 100], 1000).unwrap();
    scheduler.enqueue_samples(vec![0.0; 100], 1000).unwrap();

    sink.finish_next();
    settle().await;

    assert_eq!(scheduler.active_count(), 1);
    assert!(
        drained_rx.try_recv().is_err(),
        "no drain signal while a unit is still playing"
    );
}

#[tokio::test]
async fn test_shutdown_stops_accepting_units() {
    let sink = FakeSink::new(1000);
    let (scheduler, _drained_rx) = PlaybackScheduler::new(Arc::clone(&sink) as Arc<dyn OutputSink>);

    scheduler.enqueue_samples(vec![0.0; 100], 1000).unwrap();
    scheduler.shutdown();
    scheduler.enqueue_samples(vec![0.0; 100], 1000).unwrap();

    assert_eq!(sink.schedule_count(), 1, "no units scheduled after shutdown");
    assert_eq!(scheduler.active_count(), 1, "in-flight unit keeps playing");
}

#[tokio::test]
async fn test_empty_chunk_is_a_no_op() {
    let sink = FakeSink::new(1000);
    let (scheduler, _drained_rx) = PlaybackScheduler::new(Arc::clone(&sink) as Arc<dyn OutputSink>);

    scheduler.enqueue_samples(Vec::new(), 1000).unwrap();

    assert_eq!(sink.schedule_count(), 0);
    assert_eq!(scheduler.next_start_time(), 0.0);
}

// Speaker output through cpal
//
// Implements the scheduler's OutputSink over a cpal output stream. The
// clock is frames-rendered divided by the sample rate, so it only advances
// while the device is running and matches what the render callback has
// actually produced. Scheduled units are mixed sample-accurately at their
// start frame; ended notifications fire from the render callback the moment
// a unit's last sample has been written.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::audio::playback::{OutputSink, ScheduledSource};
use crate::error::{Error, Result};

/// Sample rate for synthesized speech playback
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

struct ScheduledUnit {
    start_frame: u64,
    samples: Vec<f32>,
    position: usize,
    ended_tx: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct SpeakerState {
    frames_rendered: u64,
    units: Vec<ScheduledUnit>,
}

/// cpal-backed output sink
///
/// The output stream is owned by a dedicated thread (cpal streams are not
/// Send); schedule/clock calls only touch the shared state.
pub struct CpalSpeaker {
    state: Arc<Mutex<SpeakerState>>,
    sample_rate: u32,
    next_id: AtomicU64,
    stop_tx: Mutex<Option<std::sync::mpsc::Sender<()>>>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

/// Pick an output stream config: mono at the target rate, else stereo
fn select_output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::StreamConfig> {
    let find = |channels: u16| -> Option<cpal::StreamConfig> {
        device
            .supported_output_configs()
            .ok()?
            .find(|c| {
                c.channels() == channels
                    && c.sample_format() == cpal::SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(target_rate)
                    && c.max_sample_rate() >= SampleRate(target_rate)
            })
            .map(|c| c.with_sample_rate(SampleRate(target_rate)).config())
    };

    find(1).or_else(|| find(2)).ok_or_else(|| {
        Error::DeviceAcquisition(format!(
            "no output config supports {}Hz mono or stereo",
            target_rate
        ))
    })
}

/// Render due units into one mono output frame, firing ended notifications
fn mix_frame(state: &mut SpeakerState) -> f32 {
    let frame = state.frames_rendered;
    let mut value = 0.0f32;

    for unit in &mut state.units {
        if unit.start_frame > frame {
            continue;
        }
        if let Some(&sample) = unit.samples.get(unit.position) {
            value += sample;
            unit.position += 1;
        }
        if unit.position >= unit.samples.len() {
            if let Some(ended_tx) = unit.ended_tx.take() {
                let _ = ended_tx.send(());
            }
        }
    }

    state.units.retain(|unit| unit.ended_tx.is_some());
    state.frames_rendered += 1;
    value
}

impl CpalSpeaker {
    /// Open the default output device and start the render stream.
    pub fn start(sample_rate: u32) -> Result<Self> {
        let state: Arc<Mutex<SpeakerState>> = Arc::new(Mutex::new(SpeakerState::default()));
        let (setup_tx, setup_rx) = std::sync::mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let thread_state = Arc::clone(&state);
        let thread = std::thread::spawn(move || {
            let host = cpal::default_host();

            let device = match host.default_output_device() {
                Some(device) => device,
                None => {
                    let _ = setup_tx.send(Err(Error::UnsupportedEnvironment(
                        "no output device available".to_string(),
                    )));
                    return;
                }
            };

            let config = match select_output_config(&device, sample_rate) {
                Ok(config) => config,
                Err(e) => {
                    let _ = setup_tx.send(Err(e));
                    return;
                }
            };
            let channels = config.channels as usize;

            let stream = device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut state = thread_state.lock().unwrap();
                    for frame in data.chunks_mut(channels) {
                        let value = mix_frame(&mut state);
                        for out in frame.iter_mut() {
                            *out = value;
                        }
                    }
                },
                |e| {
                    error!("Playback stream error: {}", e);
                },
                None,
            );

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = setup_tx.send(Err(Error::DeviceAcquisition(format!(
                        "failed to open output stream: {}",
                        e
                    ))));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = setup_tx.send(Err(Error::DeviceAcquisition(format!(
                    "failed to start output stream: {}",
                    e
                ))));
                return;
            }

            info!(
                "Speaker output started ({}Hz, {} channels)",
                sample_rate, channels
            );
            let _ = setup_tx.send(Ok(()));

            let _ = stop_rx.recv();
            drop(stream);
            info!("Speaker output stopped");
        });

        match setup_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                state,
                sample_rate,
                next_id: AtomicU64::new(0),
                stop_tx: Mutex::new(Some(stop_tx)),
                thread: Mutex::new(Some(thread)),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::DeviceAcquisition(
                    "output thread exited during setup".to_string(),
                ))
            }
        }
    }

    /// Stop the render stream and release the device. Idempotent.
    pub fn stop(&self) {
        if let Some(stop_tx) = self.stop_tx.lock().unwrap().take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.lock().unwrap().take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CpalSpeaker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl OutputSink for CpalSpeaker {
    fn clock_time(&self) -> f64 {
        let state = self.state.lock().unwrap();
        state.frames_rendered as f64 / self.sample_rate as f64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn schedule(&self, samples: Vec<f32>, start_time: f64) -> Result<ScheduledSource> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (ended_tx, ended) = oneshot::channel();

        let start_frame = (start_time * self.sample_rate as f64).round() as u64;
        let mut state = self.state.lock().unwrap();
        state.units.push(ScheduledUnit {
            start_frame,
            samples,
            position: 0,
            ended_tx: Some(ended_tx),
        });

        Ok(ScheduledSource { id, ended })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(start_frame: u64, samples: Vec<f32>) -> (ScheduledUnit, oneshot::Receiver<()>) {
        let (ended_tx, ended_rx) = oneshot::channel();
        (
            ScheduledUnit {
                start_frame,
                samples,
                position: 0,
                ended_tx: Some(ended_tx),
            },
            ended_rx,
        )
    }

    #[test]
    fn test_mix_frame_waits_for_start_frame() {
        let mut state = SpeakerState::default();
        let (u, _rx) = unit(2, vec![0.5, 0.5]);
        state.units.push(u);

        assert_eq!(mix_frame(&mut state), 0.0);
        assert_eq!(mix_frame(&mut state), 0.0);
        assert_eq!(mix_frame(&mut state), 0.5);
        assert_eq!(mix_frame(&mut state), 0.5);
    }

    #[test]
    fn test_mix_frame_sums_overlapping_units() {
        let mut state = SpeakerState::default();
        let (a, _rx_a) = unit(0, vec![0.25, 0.25]);
        let (b, _rx_b) = unit(1, vec![0.5]);
        state.units.push(a);
        state.units.push(b);

        assert_eq!(mix_frame(&mut state), 0.25);
        assert_eq!(mix_frame(&mut state), 0.75);
    }

    #[test]
    fn test_mix_frame_fires_ended_and_retires_unit() {
        let mut state = SpeakerState::default();
        let (u, mut ended_rx) = unit(0, vec![0.1]);
        state.units.push(u);

        mix_frame(&mut state);

        assert!(state.units.is_empty());
        assert!(ended_rx.try_recv().is_ok());
    }

    #[test]
    fn test_clock_advances_one_frame_per_mix() {
        let mut state = SpeakerState::default();
        mix_frame(&mut state);
        mix_frame(&mut state);

        assert_eq!(state.frames_rendered, 2);
    }
}

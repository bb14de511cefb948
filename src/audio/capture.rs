// Microphone capture pipeline
//
// Bridges a live input device into fixed-size mono blocks at the capture
// rate the agent expects. The cpal stream is owned by a dedicated thread
// (cpal streams are not Send); full blocks are handed to the session layer
// through a bounded channel, so capture latency stays within one block.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// Sample rate the agent expects for microphone audio
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Samples per block handed to the session layer
pub const CAPTURE_BLOCK_SIZE: usize = 4096;

/// One fixed-size block of mono capture audio, samples in [-1.0, 1.0]
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioFrame {
    /// Block duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Configuration for the capture pipeline
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate (device audio is decimated down if needed)
    pub sample_rate: u32,
    /// Samples per emitted block
    pub block_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: CAPTURE_SAMPLE_RATE,
            block_size: CAPTURE_BLOCK_SIZE,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations own the input device for the lifetime of a session.
/// `stop` must be idempotent and must release the hardware handle so no
/// further blocks are produced.
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive fixed-size blocks.
    /// Failure to acquire the device is terminal; the backend never retries.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio and release the device
    async fn stop(&mut self);

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Accumulates arbitrary-sized device callbacks into exact fixed-size blocks
///
/// The device driver picks its own callback sizes; this keeps the remainder
/// between callbacks so every emitted block has exactly `block_size` samples.
#[derive(Debug)]
pub struct BlockFramer {
    block_size: usize,
    pending: Vec<f32>,
}

impl BlockFramer {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
        }
    }

    /// Feed device samples in; get every completed block out.
    pub fn push(&mut self, input: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(input);

        let mut blocks = Vec::new();
        while self.pending.len() >= self.block_size {
            let rest = self.pending.split_off(self.block_size);
            blocks.push(std::mem::replace(&mut self.pending, rest));
        }
        blocks
    }

    /// Samples held back waiting for the next block boundary
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Average interleaved multi-channel samples down to mono
fn fold_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Downsample by decimation (take every Nth sample)
///
/// Integer ratios only; upsampling is not supported.
fn decimate(samples: &[f32], ratio: usize) -> Vec<f32> {
    if ratio <= 1 {
        return samples.to_vec();
    }
    samples.iter().step_by(ratio).copied().collect()
}

/// Captures microphone audio through cpal
///
/// Prefers a native 16 kHz mono input config; otherwise captures at the
/// device's default rate and decimates/folds down in the stream callback.
pub struct MicCapture {
    config: CaptureConfig,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MicCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            stop_tx: None,
            thread: None,
        }
    }
}

/// Pick an input stream config, preferring native target-rate mono
fn select_input_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::StreamConfig> {
    let mut supported = device
        .supported_input_configs()
        .map_err(|e| Error::DeviceAcquisition(format!("failed to query input configs: {}", e)))?;

    let native = supported.find(|c| {
        c.channels() == 1
            && c.sample_format() == cpal::SampleFormat::F32
            && c.min_sample_rate() <= SampleRate(target_rate)
            && c.max_sample_rate() >= SampleRate(target_rate)
    });

    if let Some(config) = native {
        return Ok(config.with_sample_rate(SampleRate(target_rate)).config());
    }

    let default = device
        .default_input_config()
        .map_err(|e| Error::DeviceAcquisition(format!("no usable input config: {}", e)))?;
    Ok(default.config())
}

#[async_trait::async_trait]
impl CaptureBackend for MicCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.thread.is_some() {
            return Err(Error::DeviceAcquisition(
                "capture already started".to_string(),
            ));
        }

        let target_rate = self.config.sample_rate;
        let block_size = self.config.block_size;

        let (frame_tx, frame_rx) = mpsc::channel::<AudioFrame>(32);
        let (setup_tx, setup_rx) = std::sync::mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        // The stream lives on this thread until stop() signals it.
        let thread = std::thread::spawn(move || {
            let host = cpal::default_host();

            let device = match host.default_input_device() {
                Some(device) => device,
                None => {
                    let _ = setup_tx.send(Err(Error::UnsupportedEnvironment(
                        "no input device available".to_string(),
                    )));
                    return;
                }
            };

            let stream_config = match select_input_config(&device, target_rate) {
                Ok(config) => config,
                Err(e) => {
                    let _ = setup_tx.send(Err(e));
                    return;
                }
            };

            let device_rate = stream_config.sample_rate.0;
            let device_channels = stream_config.channels as usize;
            let ratio = (device_rate / target_rate).max(1) as usize;
            if device_rate % target_rate != 0 {
                warn!(
                    "Input device rate {}Hz is not a multiple of {}Hz; decimating by {}",
                    device_rate, target_rate, ratio
                );
            }

            let mut framer = BlockFramer::new(block_size);
            let stream = device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = fold_to_mono(data, device_channels);
                    let resampled = decimate(&mono, ratio);
                    for samples in framer.push(&resampled) {
                        let frame = AudioFrame {
                            samples,
                            sample_rate: target_rate,
                        };
                        if frame_tx.try_send(frame).is_err() {
                            warn!("Capture receiver is behind; dropping one block");
                        }
                    }
                },
                |e| {
                    error!("Capture stream error: {}", e);
                },
                None,
            );

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = setup_tx.send(Err(Error::DeviceAcquisition(format!(
                        "failed to open input stream: {}",
                        e
                    ))));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = setup_tx.send(Err(Error::DeviceAcquisition(format!(
                    "failed to start input stream: {}",
                    e
                ))));
                return;
            }

            info!(
                "Microphone capture started ({}Hz device, {} channels, {} sample blocks)",
                device_rate, device_channels, block_size
            );
            let _ = setup_tx.send(Ok(()));

            // Park until stop() signals or the handle is dropped.
            let _ = stop_rx.recv();
            drop(stream);
            info!("Microphone capture stopped");
        });

        match setup_rx.recv() {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.thread = Some(thread);
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::DeviceAcquisition(
                    "capture thread exited during setup".to_string(),
                ))
            }
        }
    }

    async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framer_emits_exact_blocks() {
        let mut framer = BlockFramer::new(4);

        let blocks = framer.push(&[0.1, 0.2, 0.3, 0.4, 0.5]);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0], vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(framer.pending_len(), 1);
    }

    #[test]
    fn test_framer_carries_remainder_across_pushes() {
        let mut framer = BlockFramer::new(4);

        assert!(framer.push(&[0.1, 0.2, 0.3]).is_empty());
        let blocks = framer.push(&[0.4, 0.5]);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0], vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(framer.pending_len(), 1);
    }

    #[test]
    fn test_framer_emits_multiple_blocks_from_one_push() {
        let mut framer = BlockFramer::new(2);

        let blocks = framer.push(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], vec![1.0, 2.0]);
        assert_eq!(blocks[1], vec![3.0, 4.0]);
        assert_eq!(framer.pending_len(), 1);
    }

    #[test]
    fn test_fold_to_mono_averages_channels() {
        let mono = fold_to_mono(&[0.2, 0.4, -0.2, -0.4], 2);

        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!((mono[1] + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_fold_to_mono_passthrough_for_mono() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(fold_to_mono(&samples, 1), samples);
    }

    #[test]
    fn test_decimate_takes_every_nth() {
        let samples = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0];

        assert_eq!(decimate(&samples, 3), vec![0.0, 3.0]);
        assert_eq!(decimate(&samples, 1), samples);
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame {
            samples: vec![0.0; 4096],
            sample_rate: 16_000,
        };

        assert!((frame.duration_secs() - 0.256).abs() < 1e-9);
    }
}

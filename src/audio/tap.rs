use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Debug recording of one side of the conversation to a WAV file
///
/// Appends f32 blocks as 16-bit mono PCM. Finalize explicitly with
/// `finish`; dropping an unfinished tap finalizes best-effort. Write
/// failures are the caller's to log; the tap is never load-bearing.
pub struct WavTap {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    samples_written: usize,
}

impl WavTap {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create tap output directory")?;
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        info!("Session tap recording to {}", path.display());

        Ok(Self {
            writer: Some(writer),
            path,
            samples_written: 0,
        })
    }

    /// Append one block of f32 samples as 16-bit PCM
    pub fn write(&mut self, samples: &[f32]) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in samples {
                let value = (sample * 32768.0) as i16;
                writer
                    .write_sample(value)
                    .context("Failed to write sample to WAV")?;
            }
            self.samples_written += samples.len();
        }
        Ok(())
    }

    /// Total samples written so far
    pub fn samples_written(&self) -> usize {
        self.samples_written
    }

    /// Finalize the WAV header and return the file path
    pub fn finish(mut self) -> Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }
        info!(
            "Session tap finished: {} ({} samples)",
            self.path.display(),
            self.samples_written
        );
        Ok(self.path.clone())
    }
}

impl Drop for WavTap {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV tap on drop: {}", e);
            }
        }
    }
}

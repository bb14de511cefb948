pub mod capture;
pub mod codec;
pub mod output;
pub mod playback;
pub mod tap;

pub use capture::{
    AudioFrame, BlockFramer, CaptureBackend, CaptureConfig, MicCapture, CAPTURE_BLOCK_SIZE,
    CAPTURE_SAMPLE_RATE,
};
pub use output::{CpalSpeaker, PLAYBACK_SAMPLE_RATE};
pub use playback::{OutputSink, PlaybackScheduler, ScheduledSource};
pub use tap::WavTap;

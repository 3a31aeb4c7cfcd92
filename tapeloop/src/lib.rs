pub mod buffers;
pub mod cpal_helpers;
pub mod devices;
pub mod error;
pub mod history;
pub mod playback;
pub mod recorder;
pub mod session;
pub mod speed;
pub mod state;
pub mod stretch;
pub mod tempo;
pub mod units;
pub mod wav;
mod tests;

use std::time::Duration;

pub use buffers::{Buffer, LoopBuffer};
pub use devices::{AudioInput, AudioOutput, NullOutput, SilentInput};
pub use error::{Error, Result};
pub use session::{RecordToggle, Session};
pub use speed::SpeedRatio;
pub use state::PlaybackState;
pub use units::{Milliseconds, Sample, SamplePosition, SAMPLE_RATE};

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Rate used for the devices and for converting positions to samples.
    pub sample_rate: u32,
    /// Samples per capture read.
    pub frame_size: usize,
    /// How often the playback position is published, and the longest a
    /// worker waits before noticing it has been stopped.
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sample_rate: SAMPLE_RATE,
            frame_size: 1024,
            poll_interval: Duration::from_millis(10),
        }
    }
}

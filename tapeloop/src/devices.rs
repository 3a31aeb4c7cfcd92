//! Audio device seams.
//!
//! Playback starts one independent, cancellable output operation per loop
//! iteration. Capture opens a stream and pulls fixed-size frames from it.
//! The cpal implementations live in `cpal_helpers`; the wall-clock paced
//! null devices here stand in when running without audio hardware.

use std::thread::sleep;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::units::{Sample, SamplePosition};

pub trait AudioOutput: Send + Sync {
    /// Begin playing `samples` from the start and return at once.
    fn start(&self, samples: Vec<Sample>) -> Result<Box<dyn OutputHandle>>;
}

/// One playing buffer.
pub trait OutputHandle {
    /// Samples handed to the device so far.
    fn position(&self) -> SamplePosition;
    fn is_finished(&self) -> bool;
    /// Silence the output; the handle is finished afterwards.
    fn cancel(&mut self);
}

pub trait AudioInput: Send + Sync {
    fn open(&self) -> Result<Box<dyn InputStream>>;
}

pub trait InputStream {
    /// Wait at most `timeout` for the next frame of exactly `frame_size`
    /// samples. `Ok(None)` means no complete frame arrived in time.
    fn read(&mut self, frame_size: usize, timeout: Duration) -> Result<Option<Vec<Sample>>>;

    /// Close the stream, returning samples captured but not yet read.
    fn finish(&mut self) -> Vec<Sample>;
}

fn elapsed_samples(since: Instant, sample_rate: u32) -> SamplePosition {
    (since.elapsed().as_secs_f64() * sample_rate as f64) as SamplePosition
}

/// Discards audio but takes as long to "play" it as a real device would.
pub struct NullOutput {
    sample_rate: u32,
}

impl NullOutput {
    pub fn new(sample_rate: u32) -> NullOutput {
        NullOutput { sample_rate }
    }
}

struct NullOutputHandle {
    started: Instant,
    length: SamplePosition,
    sample_rate: u32,
    cancelled_at: Option<SamplePosition>,
}

impl AudioOutput for NullOutput {
    fn start(&self, samples: Vec<Sample>) -> Result<Box<dyn OutputHandle>> {
        Ok(Box::new(NullOutputHandle {
            started: Instant::now(),
            length: samples.len(),
            sample_rate: self.sample_rate,
            cancelled_at: None,
        }))
    }
}

impl OutputHandle for NullOutputHandle {
    fn position(&self) -> SamplePosition {
        match self.cancelled_at {
            Some(position) => position,
            None => elapsed_samples(self.started, self.sample_rate).min(self.length),
        }
    }

    fn is_finished(&self) -> bool {
        self.cancelled_at.is_some() || self.position() >= self.length
    }

    fn cancel(&mut self) {
        self.cancelled_at = Some(self.position());
    }
}

/// Produces silence in real time.
pub struct SilentInput {
    sample_rate: u32,
}

impl SilentInput {
    pub fn new(sample_rate: u32) -> SilentInput {
        SilentInput { sample_rate }
    }
}

struct SilentInputStream {
    opened: Instant,
    delivered: SamplePosition,
    sample_rate: u32,
}

impl AudioInput for SilentInput {
    fn open(&self) -> Result<Box<dyn InputStream>> {
        Ok(Box::new(SilentInputStream {
            opened: Instant::now(),
            delivered: 0,
            sample_rate: self.sample_rate,
        }))
    }
}

impl SilentInputStream {
    fn available(&self) -> SamplePosition {
        elapsed_samples(self.opened, self.sample_rate).saturating_sub(self.delivered)
    }
}

impl InputStream for SilentInputStream {
    fn read(&mut self, frame_size: usize, timeout: Duration) -> Result<Option<Vec<Sample>>> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.available() >= frame_size {
                self.delivered += frame_size;
                return Ok(Some(vec![0; frame_size]));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep((deadline - now).min(Duration::from_millis(2)));
        }
    }

    fn finish(&mut self) -> Vec<Sample> {
        let rest = self.available();
        self.delivered += rest;
        vec![0; rest]
    }
}

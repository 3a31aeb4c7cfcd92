//! State shared between the control, playback and capture threads.
//!
//! The loop buffer is published through an `ArcSwapOption`: writers build a
//! complete new buffer and swap the reference, readers take a point-in-time
//! `Arc` and never hold a lock while they work with it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use atomic_float::AtomicF64;

use crate::buffers::LoopBuffer;
use crate::speed::SpeedRatio;

/// What the front end displays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackState {
    /// Fraction of the loop already played, in [0, 1).
    pub position: f64,
    pub speed: SpeedRatio,
    pub is_playing: bool,
    pub is_recording: bool,
}

impl PlaybackState {
    pub fn progress_percent(self: &Self) -> u32 {
        (self.position * 100.0) as u32
    }
}

pub struct SharedState {
    buffer: ArcSwapOption<LoopBuffer>,
    position: AtomicF64,
    speed: AtomicF64,
    playing: AtomicBool,
    recording: AtomicBool,
}

impl SharedState {
    pub fn new() -> SharedState {
        SharedState {
            buffer: ArcSwapOption::empty(),
            position: AtomicF64::new(0.0),
            speed: AtomicF64::new(SpeedRatio::normal().ratio()),
            playing: AtomicBool::new(false),
            recording: AtomicBool::new(false),
        }
    }

    pub fn buffer(&self) -> Option<Arc<LoopBuffer>> {
        self.buffer.load_full()
    }

    pub fn replace_buffer(&self, buffer: Option<Arc<LoopBuffer>>) {
        self.buffer.store(buffer);
    }

    /// Atomically replace the current buffer with `f(current)`.
    ///
    /// `f` may run more than once if another writer gets in first.
    pub fn update_buffer<F>(&self, mut f: F)
    where
        F: FnMut(&LoopBuffer) -> LoopBuffer,
    {
        self.buffer.rcu(|current| {
            current.as_ref().map(|buffer| Arc::new(f(&**buffer)))
        });
    }

    pub fn position(&self) -> f64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn set_position(&self, position: f64) {
        let clamped = if position.is_finite() && position > 0.0 { position.min(1.0) } else { 0.0 };
        // [0, 1): a finished iteration reads as the start of the next one.
        self.position.store(if clamped >= 1.0 { 0.0 } else { clamped }, Ordering::Release);
    }

    pub fn speed(&self) -> SpeedRatio {
        SpeedRatio::from_ratio(self.speed.load(Ordering::Acquire))
    }

    pub fn set_speed(&self, speed: SpeedRatio) {
        self.speed.store(speed.ratio(), Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::Release);
    }

    pub fn snapshot(&self) -> PlaybackState {
        PlaybackState {
            position: self.position(),
            speed: self.speed(),
            is_playing: self.is_playing(),
            is_recording: self.is_recording(),
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        SharedState::new()
    }
}

//! One looping session: the commands the front end issues and the state it
//! reads back.

use std::path::Path;
use std::sync::Arc;

use log::*;

use crate::buffers::LoopBuffer;
use crate::devices::{AudioInput, AudioOutput};
use crate::error::{Error, Result};
use crate::history::UndoHistory;
use crate::playback::PlaybackDriver;
use crate::recorder::Recorder;
use crate::speed::SpeedRatio;
use crate::state::{PlaybackState, SharedState};
use crate::tempo::compute_loop_length;
use crate::units::{Milliseconds, SamplePosition};
use crate::wav;
use crate::Config;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordToggle {
    /// A take began at this position in the loop.
    Started { position_ms: Milliseconds },
    /// The take ended and this many samples were overdubbed.
    Stopped { samples: SamplePosition },
}

pub struct Session {
    shared: Arc<SharedState>,
    history: UndoHistory,
    loop_length_ms: Option<Milliseconds>,
    playback: PlaybackDriver,
    recorder: Recorder,
}

impl Session {
    pub fn new(config: Config, output: Arc<dyn AudioOutput>, input: Arc<dyn AudioInput>) -> Session {
        Session {
            shared: Arc::new(SharedState::new()),
            history: UndoHistory::new(),
            loop_length_ms: None,
            playback: PlaybackDriver::new(&config, output),
            recorder: Recorder::new(&config, input),
        }
    }

    /// Replace the loop with silence of the quantized length and forget the
    /// undo history. Stops playback first if it is running.
    pub fn configure(self: &mut Self, bpm: u32, minutes: u32, seconds: u32) -> Result<Milliseconds> {
        let length_ms = compute_loop_length(bpm, minutes, seconds)?;

        if self.playback.is_running() || self.recorder.has_take() {
            self.stop();
        }

        self.shared.replace_buffer(Some(Arc::new(LoopBuffer::silent(length_ms))));
        self.history.clear();
        self.loop_length_ms = Some(length_ms);
        info!("configured {} bpm, {}m{}s: loop is {} ms", bpm, minutes, seconds, length_ms);
        Ok(length_ms)
    }

    pub fn play(self: &mut Self) -> Result<()> {
        self.playback.start(&self.shared)
    }

    /// Stop playback. A take in progress is ended and its audio discarded.
    pub fn stop(self: &mut Self) {
        if self.recorder.has_take() {
            if let Err(err) = self.recorder.abort_recording(&self.shared) {
                warn!("while stopping: {}", err);
            }
        }
        self.playback.stop(&self.shared);
    }

    /// The record control: starts a take, or ends the current one.
    pub fn toggle_record(self: &mut Self) -> Result<RecordToggle> {
        if self.recorder.has_take() {
            let samples = self.stop_recording()?;
            Ok(RecordToggle::Stopped { samples })
        } else {
            let position_ms = self.start_recording()?;
            Ok(RecordToggle::Started { position_ms })
        }
    }

    pub fn start_recording(self: &mut Self) -> Result<Milliseconds> {
        self.recorder.start_recording(&self.shared, &mut self.history)
    }

    pub fn stop_recording(self: &mut Self) -> Result<SamplePosition> {
        self.recorder.stop_recording(&self.shared)
    }

    /// Report a take whose capture has failed since it started. The take is
    /// closed, so the next record command starts a fresh one.
    pub fn check_recording(self: &mut Self) -> Option<Error> {
        self.recorder.collect_failed_take(&self.shared)
    }

    /// Set the speed from the control value in [-5, 5]. Takes effect at the
    /// next loop iteration.
    pub fn set_speed(self: &mut Self, control: f64) -> Result<SpeedRatio> {
        let speed = SpeedRatio::from_control(control)?;
        self.shared.set_speed(speed);
        debug!("{}", speed);
        Ok(speed)
    }

    /// Restore the buffer from before the last overdub. Refused while a
    /// take is running, since its snapshot is the top of the history.
    pub fn undo(self: &mut Self) -> Result<()> {
        if self.recorder.has_take() {
            warn!("undo requested while recording");
            return Err(Error::RecordingInProgress);
        }
        let snapshot = self.history.pop()?;
        self.shared.replace_buffer(Some(snapshot));
        info!("undo, {} snapshots left", self.history.len());
        Ok(())
    }

    pub fn save(self: &Self, path: &Path) -> Result<()> {
        let buffer = self.shared.buffer().ok_or(Error::NotConfigured)?;
        wav::write_wav(path, &buffer)
    }

    /// The current loop as WAV bytes.
    pub fn export(self: &Self) -> Result<Vec<u8>> {
        let buffer = self.shared.buffer().ok_or(Error::NotConfigured)?;
        wav::encode_wav(&buffer)
    }

    pub fn state(self: &Self) -> PlaybackState {
        self.shared.snapshot()
    }

    pub fn buffer(self: &Self) -> Option<Arc<LoopBuffer>> {
        self.shared.buffer()
    }

    /// The length chosen by the last `configure`. Overdubs past the end
    /// can make the buffer itself longer.
    pub fn loop_length_ms(self: &Self) -> Option<Milliseconds> {
        self.loop_length_ms
    }

    pub fn undo_depth(self: &Self) -> usize {
        self.history.len()
    }

    pub fn is_configured(self: &Self) -> bool {
        self.loop_length_ms.is_some()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

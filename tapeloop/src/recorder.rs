//! Overdub recording.
//!
//! A take captures input frames on its own thread from the moment recording
//! starts. When the take is stopped the captured audio is mixed into the
//! loop at the position playback had reached when the take began, and the
//! new buffer is swapped in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::*;

use crate::devices::AudioInput;
use crate::error::{Error, Result};
use crate::history::UndoHistory;
use crate::state::SharedState;
use crate::units::{Milliseconds, Sample, SamplePosition, ms_to_samples};
use crate::Config;

struct Take {
    stop: Arc<AtomicBool>,
    keep: Arc<AtomicBool>,
    insert_ms: Milliseconds,
    handle: JoinHandle<Result<SamplePosition>>,
}

pub struct Recorder {
    config: Config,
    input: Arc<dyn AudioInput>,
    take: Option<Take>,
}

impl Recorder {
    pub fn new(config: &Config, input: Arc<dyn AudioInput>) -> Recorder {
        Recorder { config: *config, input, take: None }
    }

    /// True from `start_recording` until the take is stopped, including a
    /// take whose device has failed but which has not been collected yet.
    pub fn has_take(self: &Self) -> bool {
        self.take.is_some()
    }

    /// Begin a take. Pushes the pre-overdub buffer onto `history`.
    ///
    /// Returns the insertion point in milliseconds.
    pub fn start_recording(self: &mut Self,
                           shared: &Arc<SharedState>,
                           history: &mut UndoHistory) -> Result<Milliseconds> {
        if !shared.is_playing() {
            warn!("record requested while not playing");
            return Err(Error::NotPlaying);
        }
        if let Some(take) = &self.take {
            return Ok(take.insert_ms);
        }
        let buffer = shared.buffer().ok_or(Error::NotConfigured)?;

        let insert_ms = (shared.position() * buffer.duration_ms() as f64) as Milliseconds;
        let insert_at = ms_to_samples(insert_ms, self.config.sample_rate);

        let stop = Arc::new(AtomicBool::new(false));
        let keep = Arc::new(AtomicBool::new(true));

        // The take thread clears the flag if capture fails, so set it first.
        history.push(buffer);
        shared.set_recording(true);

        let config = self.config;
        let input = self.input.clone();
        let take_shared = shared.clone();
        let take_stop = stop.clone();
        let take_keep = keep.clone();
        let spawned = thread::Builder::new()
            .name("tapeloop-record".to_string())
            .spawn(move || run_take(config, input, take_shared, take_stop, take_keep, insert_at));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                history.pop()?;
                shared.set_recording(false);
                return Err(Error::Io(err));
            },
        };
        info!("recording started at {} ms", insert_ms);

        self.take = Some(Take { stop, keep, insert_ms, handle });
        Ok(insert_ms)
    }

    /// Collect a take whose capture thread has already given up. A running
    /// take only ends when asked to, so a finished thread means a failure.
    pub fn collect_failed_take(self: &mut Self, shared: &SharedState) -> Option<Error> {
        let failed = match &self.take {
            Some(take) => take.handle.is_finished(),
            None => false,
        };
        if !failed {
            return None;
        }
        self.finish_take(shared, false).err()
    }

    /// End the take and overdub it. Returns the number of samples mixed in.
    pub fn stop_recording(self: &mut Self, shared: &SharedState) -> Result<SamplePosition> {
        self.finish_take(shared, true)
    }

    /// End the take and throw the captured audio away.
    pub fn abort_recording(self: &mut Self, shared: &SharedState) -> Result<SamplePosition> {
        self.finish_take(shared, false)
    }

    fn finish_take(self: &mut Self, shared: &SharedState, keep: bool) -> Result<SamplePosition> {
        let take = match self.take.take() {
            Some(take) => take,
            None => return Ok(0),
        };

        take.keep.store(keep, Ordering::Release);
        take.stop.store(true, Ordering::Release);
        let result = match take.handle.join() {
            Ok(result) => result,
            Err(_) => Err(Error::RecordingFailed("capture thread panicked".to_string())),
        };
        shared.set_recording(false);

        match &result {
            Ok(count) if keep => info!("recording stopped, {} samples overdubbed at {} ms", count, take.insert_ms),
            Ok(_) => info!("recording aborted"),
            Err(err) => warn!("{}", err),
        }
        result
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(take) = self.take.take() {
            take.keep.store(false, Ordering::Release);
            take.stop.store(true, Ordering::Release);
            let _ = take.handle.join();
        }
    }
}

fn capture(config: &Config, input: &dyn AudioInput, stop: &AtomicBool) -> Result<Vec<Sample>> {
    let mut stream = input.open()?;
    let mut captured: Vec<Sample> = Vec::new();

    while !stop.load(Ordering::Acquire) {
        match stream.read(config.frame_size, config.poll_interval) {
            Ok(Some(frame)) => captured.extend_from_slice(&frame),
            Ok(None) => {},
            Err(err) => {
                stream.finish();
                return Err(err);
            },
        }
    }

    captured.extend(stream.finish());
    Ok(captured)
}

fn run_take(config: Config,
            input: Arc<dyn AudioInput>,
            shared: Arc<SharedState>,
            stop: Arc<AtomicBool>,
            keep: Arc<AtomicBool>,
            insert_at: SamplePosition) -> Result<SamplePosition> {
    let captured = match capture(&config, &*input, &stop) {
        Ok(captured) => captured,
        Err(err) => {
            error!("capture failed: {}", err);
            shared.set_recording(false);
            return Err(Error::RecordingFailed(err.to_string()));
        },
    };

    if !keep.load(Ordering::Acquire) {
        debug!("discarding {} captured samples", captured.len());
        return Ok(0);
    }

    shared.update_buffer(|buffer| buffer.overlay(&captured, insert_at));
    Ok(captured.len())
}

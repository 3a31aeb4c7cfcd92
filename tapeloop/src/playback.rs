//! The playback loop.
//!
//! Each iteration takes the loop buffer as it is right now, stretches it at
//! the current speed and plays the result to completion while publishing
//! the playback position. Overdubs, undos and speed changes made during an
//! iteration are heard from the next one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, sleep, JoinHandle};

use log::*;

use crate::devices::AudioOutput;
use crate::error::{Error, Result};
use crate::state::SharedState;
use crate::stretch::stretch_interruptible;
use crate::Config;

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn finish(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            error!("playback thread panicked");
        }
    }
}

pub struct PlaybackDriver {
    config: Config,
    output: Arc<dyn AudioOutput>,
    worker: Option<Worker>,
}

impl PlaybackDriver {
    pub fn new(config: &Config, output: Arc<dyn AudioOutput>) -> PlaybackDriver {
        PlaybackDriver { config: *config, output, worker: None }
    }

    /// Spawn the playback loop. Requires a configured buffer.
    pub fn start(self: &mut Self, shared: &Arc<SharedState>) -> Result<()> {
        if shared.buffer().is_none() {
            warn!("play requested before the loop was configured");
            return Err(Error::NotConfigured);
        }
        if self.worker.is_some() && shared.is_playing() {
            warn!("play requested while already playing");
            return Err(Error::AlreadyPlaying);
        }

        // A loop that ended on its own (device failure) is still joinable.
        if let Some(worker) = self.worker.take() {
            worker.finish();
        }

        let stop = Arc::new(AtomicBool::new(false));
        shared.set_position(0.0);
        shared.set_playing(true);

        let config = self.config;
        let output = self.output.clone();
        let loop_shared = shared.clone();
        let loop_stop = stop.clone();
        let spawned = thread::Builder::new()
            .name("tapeloop-playback".to_string())
            .spawn(move || run_playback_loop(config, output, loop_shared, loop_stop));

        match spawned {
            Ok(handle) => {
                info!("playback started");
                self.worker = Some(Worker { stop, handle });
                Ok(())
            },
            Err(err) => {
                shared.set_playing(false);
                Err(Error::Io(err))
            },
        }
    }

    /// Stop the loop and wait for its thread. Nothing more is sent to the
    /// output once this returns.
    pub fn stop(self: &mut Self, shared: &SharedState) {
        if let Some(worker) = self.worker.take() {
            worker.finish();
            info!("playback stopped");
        }
        shared.set_playing(false);
        shared.set_position(0.0);
    }

    pub fn is_running(self: &Self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for PlaybackDriver {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.finish();
        }
    }
}

fn run_playback_loop(config: Config,
                     output: Arc<dyn AudioOutput>,
                     shared: Arc<SharedState>,
                     stop: Arc<AtomicBool>) {
    let mut iteration: u64 = 0;

    while !stop.load(Ordering::Acquire) {
        let buffer = match shared.buffer() {
            Some(buffer) => buffer,
            None => break,
        };

        if buffer.is_empty() {
            // Zero-length loop. Wait for an overdub to give it some length.
            sleep(config.poll_interval);
            continue;
        }

        let speed = shared.speed();
        let stretched = match stretch_interruptible(buffer.samples(), config.sample_rate, speed.ratio(), &stop) {
            Ok(Some(stretched)) => stretched,
            Ok(None) => break,
            Err(err) => {
                error!("iteration {}: {}", iteration, err);
                sleep(config.poll_interval);
                continue;
            },
        };

        if stop.load(Ordering::Acquire) {
            break;
        }

        let length = stretched.len();
        debug!("iteration {}: {} samples at {:.2}x, playing {}", iteration, buffer.len(), speed.ratio(), length);

        let mut handle = match output.start(stretched) {
            Ok(handle) => handle,
            Err(err) => {
                error!("cannot start output: {}", err);
                break;
            },
        };

        shared.set_position(0.0);
        loop {
            if stop.load(Ordering::Acquire) {
                handle.cancel();
                break;
            }
            shared.set_position(handle.position() as f64 / length as f64);
            if handle.is_finished() {
                break;
            }
            sleep(config.poll_interval);
        }

        iteration += 1;
    }

    shared.set_playing(false);
    shared.set_position(0.0);
}

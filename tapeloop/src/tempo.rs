//! Bar-quantized loop lengths.
//!
//! A loop is always a whole number of 4/4 bars at the configured tempo. The
//! requested duration is rounded up to the next bar boundary and the result
//! is truncated to whole milliseconds. Lengths are computed with integer
//! arithmetic so that feeding a result back in returns the same value.

use log::*;

use crate::error::{Error, Result};
use crate::units::Milliseconds;

pub const BEATS_PER_BAR: u64 = 4;

const MS_PER_MINUTE: u64 = 60_000;

/// Defaults offered by the front end before the user configures anything.
pub const DEFAULT_BPM: u32 = 80;
pub const DEFAULT_MINUTES: u32 = 0;
pub const DEFAULT_SECONDS: u32 = 10;

/// Fastest accepted tempo. Truncated lengths quantize back to themselves
/// for any tempo below 240000 bpm.
pub const MAX_BPM: u32 = 1000;

fn check_bpm(bpm: u32) -> Result<()> {
    if bpm == 0 {
        return Err(Error::InvalidConfiguration("BPM must be greater than zero".to_string()));
    }
    if bpm > MAX_BPM {
        return Err(Error::InvalidConfiguration(format!("BPM must be at most {}", MAX_BPM)));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TempoGrid {
    bpm: u32,
}

impl TempoGrid {
    pub fn new(bpm: u32) -> Result<TempoGrid> {
        check_bpm(bpm)?;
        Ok(TempoGrid { bpm })
    }

    pub fn bpm(self: &Self) -> u32 {
        self.bpm
    }

    /// Duration of one bar. Not a whole number of milliseconds for most tempos.
    pub fn bar_ms(self: &Self) -> f64 {
        (BEATS_PER_BAR * MS_PER_MINUTE) as f64 / self.bpm as f64
    }

    /// Number of bars needed to hold `requested_ms`, rounded up.
    pub fn bars_for(self: &Self, requested_ms: Milliseconds) -> u64 {
        let bar_numerator = BEATS_PER_BAR as u128 * MS_PER_MINUTE as u128;
        let beats_times = requested_ms as u128 * self.bpm as u128;
        ((beats_times + bar_numerator - 1) / bar_numerator) as u64
    }

    /// Length of `bars` bars, truncated to whole milliseconds.
    pub fn bars_to_ms(self: &Self, bars: u64) -> Milliseconds {
        (bars as u128 * BEATS_PER_BAR as u128 * MS_PER_MINUTE as u128 / self.bpm as u128) as Milliseconds
    }

    pub fn loop_length_ms(self: &Self, requested_ms: Milliseconds) -> Milliseconds {
        self.bars_to_ms(self.bars_for(requested_ms))
    }

    pub fn loop_length(self: &Self, minutes: u32, seconds: u32) -> Milliseconds {
        let requested_ms = (minutes as u64 * 60 + seconds as u64) * 1000;
        let length = self.loop_length_ms(requested_ms);
        debug!("{} bpm, {}m{}s requested: {} bars, {} ms",
               self.bpm, minutes, seconds, self.bars_for(requested_ms), length);
        length
    }
}

/// Bar-quantized loop length for a tempo and a requested duration.
///
/// A zero duration yields a zero-length loop.
pub fn compute_loop_length(bpm: u32, minutes: u32, seconds: u32) -> Result<Milliseconds> {
    Ok(TempoGrid::new(bpm)?.loop_length(minutes, seconds))
}

fn parse_field(name: &str, text: &str) -> Result<u32> {
    let value = text.trim().parse::<i64>()
        .map_err(|_| Error::InvalidConfiguration(format!("{} must be a whole number, got '{}'", name, text.trim())))?;
    if value < 0 {
        return Err(Error::InvalidConfiguration(format!("{} must not be negative", name)));
    }
    if value > u32::MAX as i64 {
        return Err(Error::InvalidConfiguration(format!("{} is too large", name)));
    }
    Ok(value as u32)
}

/// Parse the three configuration fields as typed by the user.
pub fn parse_configuration(bpm: &str, minutes: &str, seconds: &str) -> Result<(u32, u32, u32)> {
    let bpm = parse_field("BPM", bpm)?;
    check_bpm(bpm)?;
    let minutes = parse_field("Minutes", minutes)?;
    let seconds = parse_field("Seconds", seconds)?;
    Ok((bpm, minutes, seconds))
}

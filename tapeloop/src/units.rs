use std::convert::TryFrom;

/// This is the sample format used inside the audio engine.
///
/// Loops are mono and keep 16-bit precision end to end, so a buffer written
/// out to WAV and read back is sample-identical.
pub type Sample = i16;

pub type SamplePosition = usize;

/// Durations visible to the user are whole milliseconds.
pub type Milliseconds = u64;

/// The fixed capture and playback rate.
pub const SAMPLE_RATE: u32 = 44100;

/// Convert a duration to a sample count at `sample_rate`, truncating.
pub fn ms_to_samples(ms: Milliseconds, sample_rate: u32) -> SamplePosition {
    let samples = ms as u128 * sample_rate as u128 / 1000;
    usize::try_from(samples).unwrap_or(usize::MAX)
}

/// Convert a sample count to whole milliseconds at `sample_rate`, truncating.
pub fn samples_to_ms(samples: SamplePosition, sample_rate: u32) -> Milliseconds {
    if sample_rate == 0 {
        return 0;
    }
    (samples as u128 * 1000 / sample_rate as u128) as Milliseconds
}

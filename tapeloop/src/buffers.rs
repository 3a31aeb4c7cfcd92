//! The loop buffer.
//!
//! A `LoopBuffer` is an immutable value. Overdubbing produces a new buffer
//! which the session publishes in place of the old one, so readers always
//! see a complete buffer and snapshots can share storage with it.

use std::cmp::max;

use crate::units::{Milliseconds, Sample, SamplePosition, SAMPLE_RATE, ms_to_samples, samples_to_ms};

pub type Buffer = Vec<Sample>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopBuffer {
    samples: Buffer,
}

impl LoopBuffer {
    /// A silent buffer of exactly `length_ms`.
    pub fn silent(length_ms: Milliseconds) -> LoopBuffer {
        LoopBuffer {
            samples: vec![0; ms_to_samples(length_ms, SAMPLE_RATE)],
        }
    }

    pub fn from_samples(samples: Buffer) -> LoopBuffer {
        LoopBuffer { samples }
    }

    pub fn samples(self: &Self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Buffer {
        self.samples
    }

    pub fn len(self: &Self) -> SamplePosition {
        self.samples.len()
    }

    pub fn is_empty(self: &Self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(self: &Self) -> Milliseconds {
        samples_to_ms(self.samples.len(), SAMPLE_RATE)
    }

    /// Mix `segment` onto a copy of this buffer starting at sample `position`.
    ///
    /// The result is never shorter than the receiver: if the segment runs
    /// past the end, the copy is first extended with silence. Mixing is
    /// additive and saturates at the sample range, so material recorded over
    /// silence is reproduced exactly.
    pub fn overlay(self: &Self, segment: &[Sample], position: SamplePosition) -> LoopBuffer {
        let length = max(self.samples.len(), position.saturating_add(segment.len()));
        let mut samples = Vec::with_capacity(length);
        samples.extend_from_slice(&self.samples);
        samples.resize(length, 0);

        for (dest, &s) in samples[position..].iter_mut().zip(segment) {
            *dest = dest.saturating_add(s);
        }

        LoopBuffer { samples }
    }

    pub fn overlay_at_ms(self: &Self, segment: &[Sample], position_ms: Milliseconds) -> LoopBuffer {
        self.overlay(segment, ms_to_samples(position_ms, SAMPLE_RATE))
    }
}

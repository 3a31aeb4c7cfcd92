//! Pitch-preserving time stretch.
//!
//! A phase vocoder working on a whole block at once: the input is cut into
//! Hann-windowed frames, each frame's bin phases are advanced according to
//! the bin's measured instantaneous frequency, and the frames are
//! overlap-added at a different hop. Both hops stay at or below a quarter of
//! the FFT size so extreme ratios neither leave gaps in the output nor skip
//! input. Nothing is kept between calls.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dasp::Sample as _;
use log::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::{Error, Result};
use crate::units::Sample;

const TWO_PI: f32 = 2.0 * PI;

/// Analysis frames span roughly this many seconds.
const FRAME_SECONDS: f64 = 0.0464;

const MIN_FFT_SIZE: usize = 256;

/// Ratios beyond this in either direction are rejected.
pub const MAX_RATIO: f64 = 64.0;

/// Stretch `samples` so that they play `ratio` times faster with the same
/// pitch. The output holds `len / ratio` samples, rounded.
pub fn stretch(samples: &[Sample], sample_rate: u32, ratio: f64) -> Result<Vec<Sample>> {
    let never = AtomicBool::new(false);
    stretch_interruptible(samples, sample_rate, ratio, &never)?
        .ok_or_else(|| Error::StretchError("interrupted".to_string()))
}

/// As `stretch`, but gives up between analysis frames once `stop` is set
/// and returns `Ok(None)`.
pub fn stretch_interruptible(samples: &[Sample], sample_rate: u32, ratio: f64, stop: &AtomicBool) -> Result<Option<Vec<Sample>>> {
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(Error::StretchError(format!("invalid speed ratio {}", ratio)));
    }
    if ratio > MAX_RATIO || ratio < 1.0 / MAX_RATIO {
        return Err(Error::StretchError(format!("speed ratio {} out of range", ratio)));
    }
    if samples.is_empty() {
        return Err(Error::StretchError("no audio to stretch".to_string()));
    }
    if sample_rate == 0 {
        return Err(Error::StretchError("sample rate must be positive".to_string()));
    }

    if ratio == 1.0 {
        return Ok(Some(samples.to_vec()));
    }

    let vocoder = PhaseVocoder::new(fft_size_for(sample_rate));
    let mut output: Vec<Sample> = Vec::with_capacity(output_len(samples.len(), ratio));
    let finished = vocoder.process(samples, ratio, stop, |s| {
        output.push(s.max(-1.0).min(1.0).to_sample::<Sample>())
    });
    if !finished {
        debug!("stretch of {} samples interrupted", samples.len());
        return Ok(None);
    }
    debug!("stretched {} samples by {:.3}: {} samples", samples.len(), ratio, output.len());
    Ok(Some(output))
}

fn output_len(input_len: usize, ratio: f64) -> usize {
    ((input_len as f64 / ratio).round() as usize).max(1)
}

fn fft_size_for(sample_rate: u32) -> usize {
    ((sample_rate as f64 * FRAME_SECONDS) as usize)
        .next_power_of_two()
        .max(MIN_FFT_SIZE)
}

/// Wrap phase to [-π, π]
fn wrap_phase(phase: f32) -> f32 {
    phase - TWO_PI * (phase / TWO_PI).round()
}

struct PhaseVocoder {
    fft_size: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl PhaseVocoder {
    fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let window = (0..fft_size)
            .map(|i| 0.5 - 0.5 * (TWO_PI * i as f32 / fft_size as f32).cos())
            .collect();

        Self {
            fft_size,
            window,
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
        }
    }

    /// (analysis hop, synthesis hop), whose ratio is the speed ratio.
    fn hops(&self, ratio: f64) -> (f64, f64) {
        let max_hop = (self.fft_size / 4) as f64;
        if ratio >= 1.0 {
            (max_hop, max_hop / ratio)
        } else {
            (max_hop * ratio, max_hop)
        }
    }

    /// Run the vocoder over `input`, passing each output sample to `emit`
    /// as soon as no later frame can change it. Returns false if `stop` was
    /// set before the end.
    fn process<F: FnMut(f32)>(&self, input: &[Sample], ratio: f64, stop: &AtomicBool, mut emit: F) -> bool {
        let n = self.fft_size;
        let half = n / 2;
        let num_bins = half + 1;
        let (analysis_hop, synthesis_hop) = self.hops(ratio);
        let output_len = output_len(input.len(), ratio);

        // Output sample m lives at index m + half, so frames centred near
        // the start can be added without going negative. Only the indices
        // from `base` onwards are still being accumulated.
        let mut sink = Emitter { base: 0, half, output_len, emitted: 0, accum: Vec::new(), norm: Vec::new() };

        let mut frame = vec![Complex::new(0.0f32, 0.0f32); n];
        let mut prev_phase = vec![0.0f32; num_bins];
        let mut synth_phase = vec![0.0f32; num_bins];

        let mut prev_analysis = 0usize;
        let mut prev_synthesis = 0usize;
        let mut t = 0usize;

        while t == 0 || prev_synthesis < output_len {
            if stop.load(Ordering::Acquire) {
                return false;
            }

            let analysis_pos = (t as f64 * analysis_hop).round() as usize;
            let synthesis_pos = (t as f64 * synthesis_hop).round() as usize;

            for (i, bin) in frame.iter_mut().enumerate() {
                let x = (analysis_pos + i)
                    .checked_sub(half)
                    .and_then(|idx| input.get(idx))
                    .map(|s| s.to_sample::<f32>())
                    .unwrap_or(0.0);
                *bin = Complex::new(x * self.window[i], 0.0);
            }
            self.forward.process(&mut frame);

            let ha = (analysis_pos - prev_analysis) as f32;
            let hs = (synthesis_pos - prev_synthesis) as f32;
            for k in 0..num_bins {
                let magnitude = frame[k].norm();
                let phase = frame[k].arg();

                if t == 0 {
                    synth_phase[k] = phase;
                } else {
                    let omega = TWO_PI * k as f32 / n as f32;
                    let freq = if ha > 0.0 {
                        omega + wrap_phase(phase - prev_phase[k] - omega * ha) / ha
                    } else {
                        omega
                    };
                    synth_phase[k] = wrap_phase(synth_phase[k] + freq * hs);
                }

                prev_phase[k] = phase;
                frame[k] = Complex::from_polar(magnitude, synth_phase[k]);
            }
            for k in 1..half {
                frame[n - k] = frame[k].conj();
            }
            self.inverse.process(&mut frame);

            sink.reserve(synthesis_pos + n);
            let offset = synthesis_pos - sink.base;
            let scale = 1.0 / n as f32;
            for (i, bin) in frame.iter().enumerate() {
                let w = self.window[i];
                sink.accum[offset + i] += bin.re * scale * w;
                sink.norm[offset + i] += w * w;
            }

            // Later frames start at the next synthesis position or after it.
            let next_synthesis = ((t + 1) as f64 * synthesis_hop).round() as usize;
            sink.flush(next_synthesis, &mut emit);

            prev_analysis = analysis_pos;
            prev_synthesis = synthesis_pos;
            t += 1;
        }

        sink.finish(&mut emit);
        true
    }
}

/// The overlap-add tail of the vocoder output.
struct Emitter {
    base: usize,
    half: usize,
    output_len: usize,
    emitted: usize,
    accum: Vec<f32>,
    norm: Vec<f32>,
}

impl Emitter {
    /// Make room for absolute indices up to `end`.
    fn reserve(&mut self, end: usize) {
        let length = end.saturating_sub(self.base);
        if self.accum.len() < length {
            self.accum.resize(length, 0.0);
            self.norm.resize(length, 0.0);
        }
    }

    /// Emit every index below `end`; they are final.
    fn flush<F: FnMut(f32)>(&mut self, end: usize, emit: &mut F) {
        let count = end.saturating_sub(self.base).min(self.accum.len());
        for k in 0..count {
            let j = self.base + k;
            if j >= self.half && self.emitted < self.output_len {
                let norm = self.norm[k];
                emit(if norm > 1e-6 { self.accum[k] / norm } else { 0.0 });
                self.emitted += 1;
            }
        }
        self.accum.drain(..count);
        self.norm.drain(..count);
        self.base += count;
    }

    fn finish<F: FnMut(f32)>(&mut self, emit: &mut F) {
        let end = self.base + self.accum.len();
        self.flush(end, emit);
        while self.emitted < self.output_len {
            emit(0.0);
            self.emitted += 1;
        }
    }
}

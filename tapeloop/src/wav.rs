//! Reading and writing loops as WAV.
//!
//! Loops are written as 16-bit mono PCM at the engine rate, which holds the
//! engine's samples exactly.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::Path;

use dasp::Sample as _;
use hound;
use log::*;

use crate::buffers::{Buffer, LoopBuffer};
use crate::error::{Error, Result};
use crate::units::{Sample, SAMPLE_RATE};

pub const WAV_SPEC: hound::WavSpec = hound::WavSpec {
    channels: 1,
    sample_rate: SAMPLE_RATE,
    bits_per_sample: 16,
    sample_format: hound::SampleFormat::Int,
};

pub fn write_samples<W: Write + Seek>(writer: W, samples: &[Sample]) -> Result<()> {
    let mut writer = hound::WavWriter::new(writer, WAV_SPEC)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

pub fn encode_wav(buffer: &LoopBuffer) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    write_samples(&mut bytes, buffer.samples())?;
    Ok(bytes.into_inner())
}

pub fn write_wav(path: &Path, buffer: &LoopBuffer) -> Result<()> {
    let file = File::create(path)?;
    write_samples(std::io::BufWriter::new(file), buffer.samples())?;
    info!("wrote {} ({} ms)", path.display(), buffer.duration_ms());
    Ok(())
}

/// Read a mono WAV. Integer samples of any width and float samples are
/// converted to the engine's sample format.
pub fn read_wav<R: Read>(reader: R) -> Result<LoopBuffer> {
    let reader = hound::WavReader::new(reader)?;
    let spec = reader.spec();

    if spec.channels != 1 {
        return Err(Error::Wav(hound::Error::FormatError("expected a mono WAV file")));
    }
    if spec.sample_rate != SAMPLE_RATE {
        warn!("WAV sample rate is {} Hz, treating it as {} Hz", spec.sample_rate, SAMPLE_RATE);
    }

    debug!("read wav: {:?}", spec);
    let samples: Buffer = match spec.sample_format {
        hound::SampleFormat::Int => {
            let shift = 32 - spec.bits_per_sample as u32;
            reader.into_samples::<i32>()
                .map(|s| s.map(|s: i32| (s << shift).to_sample::<Sample>()))
                .collect::<std::result::Result<_, _>>()?
        },
        hound::SampleFormat::Float => {
            reader.into_samples::<f32>()
                .map(|s| s.map(|s: f32| s.max(-1.0).min(1.0).to_sample::<Sample>()))
                .collect::<std::result::Result<_, _>>()?
        },
    };

    Ok(LoopBuffer::from_samples(samples))
}

pub fn decode_wav(bytes: &[u8]) -> Result<LoopBuffer> {
    read_wav(Cursor::new(bytes))
}

pub fn open_wav(path: &Path) -> Result<LoopBuffer> {
    let file = File::open(path)?;
    read_wav(BufReader::new(file))
}

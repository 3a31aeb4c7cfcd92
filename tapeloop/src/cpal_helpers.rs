// Helpers to integrate the loop engine with the CPAL audio library.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample as _;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::*;

use crate::devices::{AudioInput, AudioOutput, InputStream, OutputHandle};
use crate::error::{Error, Result};
use crate::units::{Sample, SamplePosition};
use crate::Config;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Direction { Input, Output }

fn find_device(direction: Direction, name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    let device = match (direction, name) {
        (Direction::Input, Some(name)) => host.input_devices()?
            .find(|d| name == d.name().unwrap_or_default()),
        (Direction::Output, Some(name)) => host.output_devices()?
            .find(|d| name == d.name().unwrap_or_default()),
        (Direction::Input, None) => host.default_input_device(),
        (Direction::Output, None) => host.default_output_device(),
    };
    device.ok_or_else(|| match name {
        Some(name) => Error::Device(format!("no {:?} device found matching '{}'", direction, name)),
        None => Error::Device(format!("no {:?} device available", direction)),
    })
}

/// Pick a config at the engine's sample rate, preferring the fewest channels.
fn get_audio_config(lib_config: &Config, device: &cpal::Device, direction: Direction) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Input => device.supported_input_configs()?.collect(),
        Direction::Output => device.supported_output_configs()?.collect(),
    };
    let rate = lib_config.sample_rate;
    let supported_config = ranges.into_iter()
        .filter(|r| r.min_sample_rate().0 <= rate && r.max_sample_rate().0 >= rate)
        .min_by_key(|r| r.channels())
        .ok_or_else(|| Error::Device(format!("device does not support {} Hz", rate)))?
        .with_sample_rate(cpal::SampleRate(rate));
    info!("audio config: {:?}", supported_config);
    Ok(supported_config)
}

pub struct CpalOutput {
    config: Config,
    device_name: Option<String>,
}

impl CpalOutput {
    pub fn new(config: &Config, device_name: Option<&str>) -> CpalOutput {
        CpalOutput { config: *config, device_name: device_name.map(str::to_string) }
    }
}

struct CpalOutputHandle {
    stream: cpal::Stream,
    cursor: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
    length: SamplePosition,
}

fn open_out_stream<T: cpal::Sample>(device: &cpal::Device,
                                    config: &cpal::StreamConfig,
                                    samples: Vec<Sample>,
                                    cursor: Arc<AtomicUsize>,
                                    cancelled: Arc<AtomicBool>) -> Result<cpal::Stream> {
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let mut play_pos = cursor.load(Ordering::Relaxed);
            let silent = cancelled.load(Ordering::Relaxed);
            for frame in data.chunks_mut(channels) {
                let s: Sample = if !silent && play_pos < samples.len() {
                    play_pos += 1;
                    samples[play_pos - 1]
                } else {
                    0
                };
                let value: T = cpal::Sample::from(&s);
                for out in frame.iter_mut() {
                    *out = value;
                }
            }
            cursor.store(play_pos, Ordering::Relaxed);
        },
        move |err| { warn!("{}", err) }
    )?;
    Ok(stream)
}

impl AudioOutput for CpalOutput {
    fn start(&self, samples: Vec<Sample>) -> Result<Box<dyn OutputHandle>> {
        let device = find_device(Direction::Output, self.device_name.as_deref())?;
        let supported_config = get_audio_config(&self.config, &device, Direction::Output)?;
        let sample_format = supported_config.sample_format();
        let stream_config: cpal::StreamConfig = supported_config.into();

        let length = samples.len();
        let cursor = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicBool::new(false));

        let stream = match sample_format {
            cpal::SampleFormat::F32 => open_out_stream::<f32>(&device, &stream_config, samples, cursor.clone(), cancelled.clone())?,
            cpal::SampleFormat::I16 => open_out_stream::<i16>(&device, &stream_config, samples, cursor.clone(), cancelled.clone())?,
            cpal::SampleFormat::U16 => open_out_stream::<u16>(&device, &stream_config, samples, cursor.clone(), cancelled.clone())?,
        };
        stream.play()?;

        Ok(Box::new(CpalOutputHandle { stream, cursor, cancelled, length }))
    }
}

impl OutputHandle for CpalOutputHandle {
    fn position(&self) -> SamplePosition {
        self.cursor.load(Ordering::Relaxed).min(self.length)
    }

    fn is_finished(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed) || self.position() >= self.length
    }

    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
        if let Err(err) = self.stream.pause() {
            debug!("pause on cancel: {}", err);
        }
    }
}

pub struct CpalInput {
    config: Config,
    device_name: Option<String>,
}

impl CpalInput {
    pub fn new(config: &Config, device_name: Option<&str>) -> CpalInput {
        CpalInput { config: *config, device_name: device_name.map(str::to_string) }
    }
}

type Chunk = std::result::Result<Vec<Sample>, String>;

struct CpalInputStream {
    stream: Option<cpal::Stream>,
    receiver: Receiver<Chunk>,
    pending: VecDeque<Sample>,
}

fn open_in_stream<T: cpal::Sample>(device: &cpal::Device,
                                   config: &cpal::StreamConfig,
                                   sender: Sender<Chunk>) -> Result<cpal::Stream> {
    let channels = config.channels as usize;
    let error_sender = sender.clone();
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            // Keep the first channel of each frame.
            let chunk: Vec<Sample> = data.chunks(channels).map(|frame| frame[0].to_i16()).collect();
            let _ = sender.send(Ok(chunk));
        },
        move |err| {
            warn!("{}", err);
            let _ = error_sender.send(Err(err.to_string()));
        }
    )?;
    Ok(stream)
}

impl AudioInput for CpalInput {
    fn open(&self) -> Result<Box<dyn InputStream>> {
        let device = find_device(Direction::Input, self.device_name.as_deref())?;
        let supported_config = get_audio_config(&self.config, &device, Direction::Input)?;
        let sample_format = supported_config.sample_format();
        let stream_config: cpal::StreamConfig = supported_config.into();

        let (sender, receiver) = unbounded();
        let stream = match sample_format {
            cpal::SampleFormat::F32 => open_in_stream::<f32>(&device, &stream_config, sender)?,
            cpal::SampleFormat::I16 => open_in_stream::<i16>(&device, &stream_config, sender)?,
            cpal::SampleFormat::U16 => open_in_stream::<u16>(&device, &stream_config, sender)?,
        };
        stream.play()?;

        Ok(Box::new(CpalInputStream {
            stream: Some(stream),
            receiver,
            pending: VecDeque::new(),
        }))
    }
}

impl InputStream for CpalInputStream {
    fn read(&mut self, frame_size: usize, timeout: Duration) -> Result<Option<Vec<Sample>>> {
        let deadline = Instant::now() + timeout;
        while self.pending.len() < frame_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(Ok(chunk)) => self.pending.extend(chunk),
                Ok(Err(message)) => return Err(Error::Device(message)),
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Device("input stream closed".to_string()))
                },
            }
        }
        Ok(Some(self.pending.drain(..frame_size).collect()))
    }

    fn finish(&mut self) -> Vec<Sample> {
        // Dropping the stream stops the callbacks, then drain what they sent.
        self.stream = None;
        for chunk in self.receiver.try_iter() {
            if let Ok(chunk) = chunk {
                self.pending.extend(chunk);
            }
        }
        self.pending.drain(..).collect()
    }
}

use std::path::Path;

use log::*;

use tapeloop::speed::SpeedRatio;
use tapeloop::stretch::stretch;
use tapeloop::wav::{open_wav, write_wav};
use tapeloop::LoopBuffer;

use crate::app_config::AppConfig;
use crate::app_error::AppError;

/// Stretch a mono WAV file offline. `speed` is the same control value the
/// live `speed` command takes.
pub fn run_stretch(app_config: &AppConfig, input_path: &Path, output_path: &Path, speed: f64) -> Result<LoopBuffer, AppError> {
    let speed = SpeedRatio::from_control(speed)?;
    let input = open_wav(input_path)?;
    info!("Read input {}: {} samples", input_path.display(), input.len());

    let stretched = LoopBuffer::from_samples(stretch(input.samples(), app_config.sample_rate, speed.ratio())?);
    write_wav(output_path, &stretched)?;
    println!("{}: {} -> {} ms", speed, input.duration_ms(), stretched.duration_ms());
    Ok(stretched)
}

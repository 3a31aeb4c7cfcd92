use tapeloop::tempo::TempoGrid;
use tapeloop::Milliseconds;

use crate::app_error::AppError;

pub fn run_quantize(bpm: u32, minutes: u32, seconds: u32) -> Result<Milliseconds, AppError> {
    let grid = TempoGrid::new(bpm)?;
    let requested_ms = (minutes as u64 * 60 + seconds as u64) * 1000;
    let length = grid.loop_length_ms(requested_ms);
    println!("{} bars of {:.1} ms at {} bpm: {} ms",
             grid.bars_for(requested_ms), grid.bar_ms(), bpm, length);
    Ok(length)
}

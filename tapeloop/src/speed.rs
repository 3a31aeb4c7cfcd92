//! Mapping from the speed control to a playback ratio.
//!
//! The control runs from -5 to 5. Zero is normal speed, positive values
//! speed up linearly (5 is 6x) and negative values slow down reciprocally
//! (-5 is 1/6x), so the ratio never reaches zero or changes sign.

use std::fmt;

use crate::error::{Error, Result};

pub const CONTROL_MIN: f64 = -5.0;
pub const CONTROL_MAX: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeedRatio {
    ratio: f64,
}

impl SpeedRatio {
    pub fn normal() -> SpeedRatio {
        SpeedRatio { ratio: 1.0 }
    }

    pub fn from_control(value: f64) -> Result<SpeedRatio> {
        if !value.is_finite() || value < CONTROL_MIN || value > CONTROL_MAX {
            return Err(Error::InvalidConfiguration(
                format!("speed must be between {} and {}, got {}", CONTROL_MIN, CONTROL_MAX, value)));
        }
        let ratio = if value >= 0.0 {
            value + 1.0
        } else {
            -1.0 / (value - 1.0)
        };
        Ok(SpeedRatio { ratio })
    }

    pub(crate) fn from_ratio(ratio: f64) -> SpeedRatio {
        SpeedRatio { ratio }
    }

    pub fn ratio(self: &Self) -> f64 {
        self.ratio
    }
}

impl Default for SpeedRatio {
    fn default() -> Self {
        SpeedRatio::normal()
    }
}

impl fmt::Display for SpeedRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Speed: {:.2}x", self.ratio)
    }
}

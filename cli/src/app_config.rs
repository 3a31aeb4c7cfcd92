use std::path::PathBuf;

pub const DEFAULT_OUTPUT_FILE: &str = "output.wav";

pub struct AppConfig {
    pub sample_rate: u32,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub output_file: PathBuf,
    /// Use the silent null devices instead of real audio hardware.
    pub headless: bool,
}

impl AppConfig {
    pub fn new(sample_rate: u32) -> Self {
        AppConfig {
            sample_rate,
            input_device: None,
            output_device: None,
            output_file: PathBuf::from(DEFAULT_OUTPUT_FILE),
            headless: false,
        }
    }

    pub fn engine_config(self: &Self) -> tapeloop::Config {
        tapeloop::Config {
            sample_rate: self.sample_rate,
            ..tapeloop::Config::default()
        }
    }
}

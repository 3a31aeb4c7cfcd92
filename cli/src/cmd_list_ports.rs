use cpal::traits::{DeviceTrait, HostTrait};

use crate::app_config::AppConfig;
use crate::app_error::*;

fn supports_rate(ranges: impl Iterator<Item = cpal::SupportedStreamConfigRange>, rate: u32) -> bool {
    ranges.into_iter().any(|r| r.min_sample_rate().0 <= rate && r.max_sample_rate().0 >= rate)
}

fn marker(is_default: bool, usable: bool) -> &'static str {
    match (is_default, usable) {
        (true, true) => " (default)",
        (true, false) => " (default, unsupported rate)",
        (false, true) => "",
        (false, false) => " (unsupported rate)",
    }
}

pub fn run_list_ports(app_config: &AppConfig) -> Result<(), AppError> {
    let host = cpal::default_host();
    let rate = app_config.sample_rate;

    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    println!("Available audio input devices for host {}:", host.id().name());
    for dev in host.input_devices()? {
        let name = dev.name()?;
        let usable = dev.supported_input_configs().map(|r| supports_rate(r, rate)).unwrap_or(false);
        println!(" • {}{}", name, marker(default_input.as_deref() == Some(name.as_str()), usable));
    }

    println!();
    let default_output = host.default_output_device().and_then(|d| d.name().ok());
    println!("Available audio output devices for host {}:", host.id().name());
    for dev in host.output_devices()? {
        let name = dev.name()?;
        let usable = dev.supported_output_configs().map(|r| supports_rate(r, rate)).unwrap_or(false);
        println!(" • {}{}", name, marker(default_output.as_deref() == Some(name.as_str()), usable));
    }

    return Ok(())
}

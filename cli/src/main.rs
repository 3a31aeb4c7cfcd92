mod app_config;
mod app_error;
mod cmd_list_ports;
mod cmd_live;
mod cmd_quantize;
mod cmd_stretch;
mod commands;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Arg, App, ArgMatches};
use log::*;

use tapeloop::tempo::{parse_configuration, DEFAULT_BPM, DEFAULT_MINUTES, DEFAULT_SECONDS};
use tapeloop::SAMPLE_RATE;

use app_config::AppConfig;
use app_error::AppError;

fn parse_speed(text: Option<&str>) -> Result<f64, AppError> {
    let text = text.unwrap_or("0");
    text.parse::<f64>()
        .map_err(|_| AppError { message: format!("speed must be a number, got '{}'", text) })
}

fn run_subcommand(app_m: &ArgMatches) -> Result<(), AppError> {
    let mut app_config = AppConfig::new(SAMPLE_RATE);

    match app_m.subcommand() {
        ("live", Some(sub_m)) => {
            app_config.input_device = sub_m.value_of("input-device").map(str::to_string);
            app_config.output_device = sub_m.value_of("output-device").map(str::to_string);
            if let Some(path) = sub_m.value_of("output-file") {
                app_config.output_file = PathBuf::from(path);
            }
            app_config.headless = sub_m.is_present("headless");
            cmd_live::run_live(&app_config)
        },
        ("quantize", Some(sub_m)) => {
            let (bpm, minutes, seconds) = parse_configuration(
                sub_m.value_of("bpm").unwrap_or(""),
                sub_m.value_of("minutes").unwrap_or("0"),
                sub_m.value_of("seconds").unwrap_or("0"))?;
            cmd_quantize::run_quantize(bpm, minutes, seconds)?;
            Ok(())
        },
        ("stretch", Some(sub_m)) => {
            let input = sub_m.value_of("INPUT").unwrap_or_default();
            let output = sub_m.value_of("OUTPUT").unwrap_or_default();
            let speed = parse_speed(sub_m.value_of("speed"))?;
            cmd_stretch::run_stretch(&app_config, Path::new(input), Path::new(output), speed)?;
            Ok(())
        },
        ("list-ports", Some(_)) => {
            cmd_list_ports::run_list_ports(&app_config)
        },
        _ => Err(AppError { message: app_m.usage().to_string() }),
    }
}

fn main() {
    env_logger::init();

    let default_bpm = DEFAULT_BPM.to_string();
    let default_minutes = DEFAULT_MINUTES.to_string();
    let default_seconds = DEFAULT_SECONDS.to_string();

    let app_m = App::new("tapeloop")
        .version("0.1")
        .about("Bar-quantized overdub looper")
        .subcommand(App::new("live")
            .about("Run an interactive looping session, reading commands from stdin")
            .arg(Arg::with_name("input-device")
                 .long("input-device")
                 .short("i")
                 .help("Record audio from device")
                 .takes_value(true)
                 .value_name("NAME"))
            .arg(Arg::with_name("output-device")
                 .long("output-device")
                 .short("o")
                 .help("Play audio to device")
                 .takes_value(true)
                 .value_name("NAME"))
            .arg(Arg::with_name("output-file")
                 .long("output-file")
                 .short("f")
                 .help("Where 'save' writes the loop")
                 .takes_value(true)
                 .value_name("FILE"))
            .arg(Arg::with_name("headless")
                 .long("headless")
                 .help("Use silent null devices instead of audio hardware")))
        .subcommand(App::new("quantize")
            .about("Print the bar-quantized loop length")
            .arg(Arg::with_name("bpm")
                 .long("bpm")
                 .help("Beats per minute")
                 .takes_value(true)
                 .default_value(&default_bpm)
                 .value_name("BPM"))
            .arg(Arg::with_name("minutes")
                 .long("minutes")
                 .short("m")
                 .help("Requested length, minutes part")
                 .takes_value(true)
                 .default_value(&default_minutes)
                 .value_name("MINUTES"))
            .arg(Arg::with_name("seconds")
                 .long("seconds")
                 .short("s")
                 .help("Requested length, seconds part")
                 .takes_value(true)
                 .default_value(&default_seconds)
                 .value_name("SECONDS")))
        .subcommand(App::new("stretch")
            .about("Change the speed of a mono WAV file without changing its pitch")
            .arg(Arg::with_name("INPUT")
                 .required(true)
                 .index(1))
            .arg(Arg::with_name("OUTPUT")
                 .required(true)
                 .index(2))
            .arg(Arg::with_name("speed")
                 .long("speed")
                 .help("Speed control, -5 to 5 (0 is normal)")
                 .takes_value(true)
                 .allow_hyphen_values(true)
                 .required(true)
                 .value_name("V")))
        .subcommand(App::new("list-ports")
            .about("List audio devices"))
        .get_matches();

    if let Err(error) = run_subcommand(&app_m) {
        error!("{}", error);
        eprintln!("{}", error);
        process::exit(1);
    }
}

//! The line commands accepted by `tapeloop live`.

use std::path::PathBuf;

use tapeloop::tempo::parse_configuration;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Configure { bpm: u32, minutes: u32, seconds: u32 },
    Play,
    Stop,
    Record,
    Speed(f64),
    Save(Option<PathBuf>),
    Undo,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  configure BPM MINUTES SECONDS   set tempo and loop length (clears the loop)
  play                            start the loop
  stop                            stop the loop, discarding a take in progress
  record                          start or finish an overdub
  speed V                         playback speed, -5 to 5 (0 is normal)
  save [PATH]                     write the loop as WAV
  undo                            remove the last overdub
  status                          show the playback state
  quit";

/// Parse one input line. Blank lines give `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let name = match words.next() {
        Some(name) => name.to_lowercase(),
        None => return Ok(None),
    };
    let args: Vec<&str> = words.collect();

    let expect_args = |count: usize| -> Result<(), String> {
        if args.len() != count {
            return Err(format!("'{}' takes {} argument(s), got {}", name, count, args.len()));
        }
        Ok(())
    };

    let command = match name.as_str() {
        "configure" | "c" => {
            expect_args(3)?;
            let (bpm, minutes, seconds) = parse_configuration(args[0], args[1], args[2])
                .map_err(|e| e.to_string())?;
            Command::Configure { bpm, minutes, seconds }
        },
        "play" | "p" => { expect_args(0)?; Command::Play },
        "stop" | "s" => { expect_args(0)?; Command::Stop },
        "record" | "r" => { expect_args(0)?; Command::Record },
        "speed" => {
            expect_args(1)?;
            let value = args[0].parse::<f64>()
                .map_err(|_| format!("speed must be a number, got '{}'", args[0]))?;
            Command::Speed(value)
        },
        "save" => match args.len() {
            0 => Command::Save(None),
            1 => Command::Save(Some(PathBuf::from(args[0]))),
            _ => return Err("'save' takes at most one path".to_string()),
        },
        "undo" | "u" => { expect_args(0)?; Command::Undo },
        "status" => { expect_args(0)?; Command::Status },
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(command))
}

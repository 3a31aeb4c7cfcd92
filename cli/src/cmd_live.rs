use std::io::{self, BufRead, Write};
use std::sync::Arc;

use log::*;

use tapeloop::cpal_helpers::{CpalInput, CpalOutput};
use tapeloop::tempo::{DEFAULT_BPM, DEFAULT_MINUTES, DEFAULT_SECONDS};
use tapeloop::{AudioInput, AudioOutput, NullOutput, RecordToggle, Session, SilentInput};

use crate::app_config::AppConfig;
use crate::app_error::AppError;
use crate::commands::{parse_command, Command, HELP};

pub fn status_line(session: &Session) -> String {
    let state = session.state();
    let mut line = String::new();

    line.push_str(if state.is_playing { "playing" } else { "stopped" });
    if state.is_recording {
        line.push_str(", recording");
    }
    if state.is_playing {
        line.push_str(&format!(", {}%", state.progress_percent()));
    }
    line.push_str(&format!(", {}", state.speed));
    match session.loop_length_ms() {
        Some(length) => line.push_str(&format!(", loop {} ms", length)),
        None => line.push_str(", not configured"),
    }
    if session.undo_depth() > 0 {
        line.push_str(&format!(", {} undo", session.undo_depth()));
    }
    line
}

/// Run one command. Returns false when the session should end.
fn execute<W: Write>(session: &mut Session, app_config: &AppConfig, command: Command, out: &mut W) -> Result<bool, AppError> {
    match command {
        Command::Configure { bpm, minutes, seconds } => {
            let length = session.configure(bpm, minutes, seconds)?;
            writeln!(out, "Loop length: {} ms", length)?;
        },
        Command::Play => {
            session.play()?;
            writeln!(out, "Playing")?;
        },
        Command::Stop => {
            session.stop();
            writeln!(out, "Stopped")?;
        },
        Command::Record => match session.toggle_record()? {
            RecordToggle::Started { position_ms } => writeln!(out, "Recording from {} ms", position_ms)?,
            RecordToggle::Stopped { samples } => writeln!(out, "Overdubbed {} samples", samples)?,
        },
        Command::Speed(value) => {
            let speed = session.set_speed(value)?;
            writeln!(out, "{}", speed)?;
        },
        Command::Save(path) => {
            let path = path.unwrap_or_else(|| app_config.output_file.clone());
            session.save(&path)?;
            writeln!(out, "Saved {}", path.display())?;
        },
        Command::Undo => {
            session.undo()?;
            writeln!(out, "Undone, {} left", session.undo_depth())?;
        },
        Command::Status => writeln!(out, "{}", status_line(session))?,
        Command::Help => writeln!(out, "{}", HELP)?,
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

/// Feed lines from `input` to the session until it ends or `quit` is read.
/// Rejected commands are reported and the session carries on.
pub fn run_commands<R: BufRead, W: Write>(session: &mut Session,
                                          app_config: &AppConfig,
                                          input: R,
                                          out: &mut W) -> Result<(), AppError> {
    for line in input.lines() {
        let line = line?;
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                writeln!(out, "Notice: {}", message)?;
                continue;
            },
        };
        debug!("command: {:?}", command);

        if let Some(error) = session.check_recording() {
            writeln!(out, "Notice: {}", error)?;
        }

        match execute(session, app_config, command, out) {
            Ok(true) => {},
            Ok(false) => break,
            Err(error) => writeln!(out, "Notice: {}", error)?,
        }
    }
    session.stop();
    Ok(())
}

fn open_devices(app_config: &AppConfig) -> (Arc<dyn AudioOutput>, Arc<dyn AudioInput>) {
    let config = app_config.engine_config();
    if app_config.headless {
        info!("headless: using null audio devices");
        (Arc::new(NullOutput::new(config.sample_rate)), Arc::new(SilentInput::new(config.sample_rate)))
    } else {
        (Arc::new(CpalOutput::new(&config, app_config.output_device.as_deref())),
         Arc::new(CpalInput::new(&config, app_config.input_device.as_deref())))
    }
}

pub fn run_live(app_config: &AppConfig) -> Result<(), AppError> {
    let (output, input) = open_devices(app_config);
    let mut session = Session::new(app_config.engine_config(), output, input);

    println!("tapeloop: type 'help' for commands. Start with e.g. 'configure {} {} {}'.",
             DEFAULT_BPM, DEFAULT_MINUTES, DEFAULT_SECONDS);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_commands(&mut session, app_config, stdin.lock(), &mut out)
}

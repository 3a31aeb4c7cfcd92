//! Error types for the loop engine.
//!
//! The first group are the recoverable conditions the front end turns into
//! a notice for the user. The rest wrap device and file failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Configure the loop first")]
    NotConfigured,

    #[error("Already playing")]
    AlreadyPlaying,

    #[error("Play the loop before recording")]
    NotPlaying,

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Finish recording before undoing")]
    RecordingInProgress,

    #[error("Recording failed: {0}")]
    RecordingFailed(String),

    #[error("Cannot stretch audio: {0}")]
    StretchError(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for conditions that leave the session untouched and only need
    /// to be reported back to the user.
    pub fn is_notice(&self) -> bool {
        matches!(self,
                 Error::InvalidConfiguration(_) |
                 Error::NotConfigured |
                 Error::AlreadyPlaying |
                 Error::NotPlaying |
                 Error::NothingToUndo |
                 Error::RecordingInProgress |
                 Error::RecordingFailed(_))
    }
}

impl From<cpal::DevicesError> for Error {
    fn from(error: cpal::DevicesError) -> Self {
        Error::Device(error.to_string())
    }
}

impl From<cpal::DeviceNameError> for Error {
    fn from(error: cpal::DeviceNameError) -> Self {
        Error::Device(error.to_string())
    }
}

impl From<cpal::SupportedStreamConfigsError> for Error {
    fn from(error: cpal::SupportedStreamConfigsError) -> Self {
        Error::Device(error.to_string())
    }
}

impl From<cpal::BuildStreamError> for Error {
    fn from(error: cpal::BuildStreamError) -> Self {
        Error::Device(error.to_string())
    }
}

impl From<cpal::PlayStreamError> for Error {
    fn from(error: cpal::PlayStreamError) -> Self {
        Error::Device(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use std::fmt;

#[derive(Debug)]
pub struct AppError {
    pub message: String,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<tapeloop::Error> for AppError {
    fn from(error: tapeloop::Error) -> Self {
        AppError {
            message: error.to_string(),
        }
    }
}

impl From<cpal::DevicesError> for AppError {
    fn from(error: cpal::DevicesError) -> Self {
        AppError {
            message: error.to_string(),
        }
    }
}

impl From<cpal::DeviceNameError> for AppError {
    fn from(error: cpal::DeviceNameError) -> Self {
        AppError {
            message: error.to_string(),
        }
    }
}

impl From<hound::Error> for AppError {
    fn from(error: hound::Error) -> Self {
        AppError {
            message: error.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError {
            message: error.to_string(),
        }
    }
}

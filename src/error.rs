use std::{error, fmt};

// -------------------------------------------------------------------------------------------------

/// `Error` provides an enumeration of all possible errors reported by granulate.
///
/// Errors are only ever returned from the non-realtime control surface: the
/// realtime process path treats bad input as silence and never fails.
#[derive(Debug)]
pub enum Error {
    InvalidSampleRate(u32),
    EmptySampleBuffer,
    UnsupportedChannelCount(usize),
    ParameterError(String),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSampleRate(rate) => write!(f, "Invalid sample rate: {rate}"),
            Self::EmptySampleBuffer => write!(f, "Sample buffer contains no frames"),
            Self::UnsupportedChannelCount(channels) => {
                write!(f, "Unsupported sample buffer channel count: {channels}")
            }
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
        }
    }
}

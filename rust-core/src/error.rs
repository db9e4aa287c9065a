//! Error types shared by the transform engine and the streaming pipelines

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    /// Caller passed a value the operation cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation is not valid in the current state or for this source
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// External collaborator (encoder factory, codec) failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// Sample source failed to read or seek
    #[error("Sample source error: {0}")]
    Source(String),

    #[error("No audio device found")]
    NoDevice,

    #[error("Failed to get device name: {0}")]
    DeviceName(String),

    #[error("Failed to get default config: {0}")]
    DefaultConfig(String),

    #[error("Failed to build stream: {0}")]
    BuildStream(String),

    #[error("Failed to play stream: {0}")]
    PlayStream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Fail with `InvalidArgument` unless `n` is a non-zero power of two
pub(crate) fn ensure_power_of_two(n: usize, what: &str) -> Result<()> {
    if n.is_power_of_two() {
        Ok(())
    } else {
        Err(AudioError::InvalidArgument(format!(
            "{what} length must be a power of two (got {n})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_of_two_guard() {
        assert!(ensure_power_of_two(1, "FFT").is_ok());
        assert!(ensure_power_of_two(1024, "FFT").is_ok());
        assert!(matches!(
            ensure_power_of_two(0, "FFT"),
            Err(AudioError::InvalidArgument(_))
        ));
        assert!(matches!(
            ensure_power_of_two(48, "window"),
            Err(AudioError::InvalidArgument(_))
        ));
    }
}

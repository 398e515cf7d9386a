//! Error types for supgrade.

use thiserror::Error;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Normal exit
    Success = 0,
    /// Invalid configuration
    Config = 1,
    /// Listen failed
    ListenFailed = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Fatal errors that stop the relay process.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    ListenFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the exit code for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Error::Config(_) => ExitCode::Config,
            Error::ListenFailed(_) => ExitCode::ListenFailed,
            Error::Io(_) => ExitCode::ListenFailed,
        }
    }
}

/// Result type alias for supgrade operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_maps_to_config_exit_code() {
        let err = Error::Config("expected destination".to_string());
        assert_eq!(err.exit_code(), ExitCode::Config);
        assert_eq!(i32::from(err.exit_code()), 1);
    }

    #[test]
    fn listen_failed_display_is_the_bare_message() {
        let err = Error::ListenFailed("listen tcp 0.0.0.0:80: permission denied".to_string());
        assert_eq!(err.to_string(), "listen tcp 0.0.0.0:80: permission denied");
        assert_eq!(i32::from(err.exit_code()), 10);
    }
}

use thiserror::Error;

/// Failures reported by device fetch, parse and toggle operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("A test is currently being performed on this drive.")]
    TestRunning,

    #[error("Cannot execute smartctl on a virtual device.")]
    CannotExecuteOnVirtual,

    #[error("Permission denied while opening device: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    ExecutionError(String),

    #[error("Mandatory SMART command failed.")]
    CommandFailed,

    #[error("Unknown error occurred.")]
    CommandUnknownError,

    #[error("Cannot parse smartctl output: {0}")]
    ParseError(String),

    #[error("Device type has not been detected; fetch basic data first.")]
    TypeUnresolved,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RecognizerError {
    pub message: String,
}

impl RecognizerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

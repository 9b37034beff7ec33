//! Error handling for the proc_monitor crate.

/// A specialized `Result` type for proc_monitor operations.
pub type Result<T> = std::result::Result<T, SystemError>;

/// The main error type for sampling and persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// I/O operation failed on a kernel source or an output file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A kernel source did not have the expected shape
    #[error("Failed to parse system information: {0}")]
    ParseError(String),

    /// Configuration error, detected before any sampling happens
    #[error("Configuration error: {0}")]
    Config(String),

    /// An output file is no longer in the shape the saver maintains
    #[error("Output error: {0}")]
    Output(String),

    /// Serializing a record failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SystemError {
    /// Create a new parse error
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new output error
    pub fn output_error(msg: impl Into<String>) -> Self {
        Self::Output(msg.into())
    }

    /// Whether this error should stop the process before monitoring starts.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

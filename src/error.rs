use thiserror::Error;

use crate::atom::ErrorCause;

#[derive(Error, Debug)]
pub enum AtomcladError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Malformed atom: {message}")]
    Structure { message: String },
    #[error("Parse error: {message}")]
    Parse { message: String, line: Option<usize>, col: Option<usize> },
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Grounded function failed ({cause}): {message}")]
    Grounded { cause: ErrorCause, message: String },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

impl AtomcladError {
    pub fn structure(message: impl Into<String>) -> Self {
        Self::Structure { message: message.into() }
    }
    pub fn grounded(cause: ErrorCause, message: impl Into<String>) -> Self {
        Self::Grounded { cause, message: message.into() }
    }
    /// The error category an evaluation reports when this error escapes a host function.
    pub fn cause(&self) -> ErrorCause {
        match self {
            Self::Grounded { cause, .. } => *cause,
            _ => ErrorCause::GroundedFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, AtomcladError>;

// Helper conversions
impl From<rusqlite::Error> for AtomcladError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<serde_json::Error> for AtomcladError {
    fn from(e: serde_json::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for AtomcladError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}

use crate::engine::Format;
use thiserror::Error;

/// Failures reported by an [`Engine`](crate::engine::Engine) implementation.
///
/// These never escape the command channel: reads turn them into `None`,
/// writes and commands log them and carry on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("engine is not initialized")]
    Uninitialized,

    #[error("engine is already initialized")]
    AlreadyInitialized,

    #[error("engine handle has been destroyed")]
    Destroyed,

    #[error("property '{0}' is unavailable")]
    PropertyUnavailable(String),

    #[error("property '{name}' cannot be represented as {format:?}")]
    FormatMismatch { name: String, format: Format },

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("invalid argument for '{command}': {reason}")]
    InvalidArgument { command: String, reason: String },

    #[error("too many command arguments ({0})")]
    TooManyArguments(usize),

    #[error("failed to start event thread: {0}")]
    EventThread(String),

    #[error("no stream is open")]
    NoStream,

    #[error("stream '{url}' failed: {reason}")]
    Stream { url: String, reason: String },
}

impl EngineError {
    pub fn invalid(command: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidArgument {
            command: command.to_string(),
            reason: reason.into(),
        }
    }

    pub fn stream(url: &str, error: std::io::Error) -> Self {
        EngineError::Stream {
            url: url.to_string(),
            reason: error.to_string(),
        }
    }
}

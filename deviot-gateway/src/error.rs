//! Error types for the gateway.

/// Error type returned by action handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for gateway operations.
///
/// Starting an active component or stopping an idle one is not an error;
/// those cases only log a warning.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown thing or action, malformed action message, or a thing that
    /// does not honor its declared actions.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Connect, subscribe or publish failure from the broker transport.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Registration endpoint unreachable or answered with a non-success status.
    #[error("Registration failed: {0}")]
    Registration(String),

    /// An action handler returned an error or panicked.
    #[error("Action handler failed: {0}")]
    Handler(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Registration(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

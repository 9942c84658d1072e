//! Error types for Runbox

use thiserror::Error;

/// Result type alias using Runbox's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Runbox
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sandbox host error
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Script engine error
    #[error("Engine error: {0}")]
    Engine(String),

    /// Host/worker protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Replay session error
    #[error("Replay error: {0}")]
    Replay(String),

    /// External collaborator error (fix, title, bug report)
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Template rendering error
    #[error("Template error: {0}")]
    Template(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error
    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Timeout(_))
    }

    /// Check if error is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }
}

impl From<handlebars::RenderError> for Error {
    fn from(err: handlebars::RenderError) -> Self {
        Error::Template(err.to_string())
    }
}

impl From<handlebars::TemplateError> for Error {
    fn from(err: handlebars::TemplateError) -> Self {
        Error::Template(err.to_string())
    }
}

impl From<which::Error> for Error {
    fn from(err: which::Error) -> Self {
        Error::Engine(err.to_string())
    }
}

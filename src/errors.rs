use crate::assertion::AssertionFailure;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Session not started: no page has been loaded yet")]
    NotStarted,

    #[error("Stale node: it belongs to snapshot {node} but the session is at snapshot {current}")]
    StaleNode { node: u64, current: u64 },

    #[error("Node is not attached to an interactive session")]
    Detached,

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Invalid element type: expected {expected}, got {got}")]
    InvalidElementType { expected: String, got: String },

    #[error("Option not found: {0}")]
    OptionNotFound(String),

    #[error("Invalid selector callback: {0}")]
    InvalidSelectorCallback(String),

    #[error("Unsupported callback parameter type: {0}")]
    UnsupportedParameter(String),

    #[error("Invalid HTTP options: {0}")]
    InvalidOptions(String),

    #[error("Operation not supported by the {backend} backend: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Chrome error: {0}")]
    ChromeError(String),

    #[error("{0}")]
    AssertionFailed(AssertionFailure),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Anyhow error: {0}")]
    AnyhowError(String),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

// headless_chrome reports everything through anyhow
impl From<anyhow::Error> for BrowserError {
    fn from(err: anyhow::Error) -> Self {
        BrowserError::AnyhowError(err.to_string())
    }
}

impl BrowserError {
    pub fn from_any_error<E: std::fmt::Display>(err: E) -> Self {
        BrowserError::ChromeError(err.to_string())
    }

    pub fn unsupported(backend: &'static str, operation: impl Into<String>) -> Self {
        BrowserError::Unsupported {
            backend,
            operation: operation.into(),
        }
    }

    pub fn invalid_type(expected: impl Into<String>, got: impl Into<String>) -> Self {
        BrowserError::InvalidElementType {
            expected: expected.into(),
            got: got.into(),
        }
    }
}

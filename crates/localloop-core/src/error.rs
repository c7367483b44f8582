//! Error types for localloop-core

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias using localloop-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure classes shared by every layer of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response was received
    Network,
    /// The request exceeded the configured timeout
    Timeout,
    /// 401, or a session that could not be recovered
    Authentication,
    /// 4xx other than 401
    Validation,
    /// 5xx
    Server,
    /// Failures that never reached the backend
    Local,
}

/// Errors that can occur in localloop-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The backend could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// The backend did not answer in time
    #[error("Request timed out. Please check your connection and try again.")]
    Timeout,

    /// The backend rejected the access token
    #[error("Your session has expired. Please log in again.")]
    Unauthorized,

    /// Token refresh failed and the session was cleared
    #[error("Session expired; sign in again")]
    SessionExpired,

    /// No session is available for an authenticated call
    #[error("Not signed in")]
    NotAuthenticated,

    /// Validation or conflict error reported by the backend
    #[error("Backend rejected the request: {message} ({status})")]
    Api { status: u16, message: String },

    /// Backend fault
    #[error("Server error: {message} ({status})")]
    Server { status: u16, message: String },

    /// No transaction links the participants of a conversation
    #[error("No conversation binding: {0}")]
    MissingBinding(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local key-value storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error into the client-wide taxonomy.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Timeout => ErrorKind::Timeout,
            Self::Unauthorized | Self::SessionExpired | Self::NotAuthenticated => {
                ErrorKind::Authentication
            }
            Self::Api { .. } => ErrorKind::Validation,
            Self::Server { .. } => ErrorKind::Server,
            Self::MissingBinding(_)
            | Self::NotFound(_)
            | Self::InvalidInput(_)
            | Self::InvalidConfiguration(_)
            | Self::Serialization(_)
            | Self::Storage(_)
            | Self::Io(_) => ErrorKind::Local,
        }
    }

    /// HTTP status attached to this error, if the backend answered.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Api { status, .. } | Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Build an error from a non-success response status and body.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = parse_api_error(body);
        match status.as_u16() {
            401 => Self::Unauthorized,
            code @ 500..=599 => Self::Server {
                status: code,
                message,
            },
            code => Self::Api {
                status: code,
                message,
            },
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout;
        }
        if error.is_decode() {
            return Self::InvalidInput(format!("unexpected response body: {error}"));
        }
        if let Some(status) = error.status() {
            return Self::from_status(status, "");
        }
        Self::Network(error.to_string())
    }
}

const MAX_ERROR_EXCERPT_CHARS: usize = 180;

#[derive(Debug, serde::Deserialize)]
struct BackendErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Extract the human-readable message from a backend error body.
///
/// Concept endpoints answer `{ "error": "..." }`; anything else is reported
/// as compacted raw text.
fn parse_api_error(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<BackendErrorBody>(body) {
        if let Some(message) = payload.error.or(payload.message) {
            return message.trim().to_string();
        }
    }

    let excerpt: String = body.trim().chars().take(MAX_ERROR_EXCERPT_CHARS).collect();
    if excerpt.is_empty() {
        "no details".to_string()
    } else {
        excerpt
    }
}

//! Error types module
//!
//! Every fallible operation of the admin client returns [`AdminError`]. The variants
//! mirror how a request can go wrong: it never reached the server (`Transport`), the
//! server answered with a non-2xx status (`Protocol`), the backend has no equivalent
//! for the operation (`Unsupported`), or the connection settings could not be
//! assembled (`IncompleteConfiguration` / `InvalidConfiguration`).

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like unsupported operations
    Debug,
    /// Warning level - for errors reported by the backend
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be presented to an operator.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "TRANSPORT_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same call can succeed
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the operator
    fn suggested_action(&self) -> Option<&'static str>;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

pub type AdminResult<T> = Result<T, AdminError>;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// No response was received (DNS, TLS, connection reset, ...).
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// The server answered with a non-2xx status. `message` is the backend's own
    /// diagnostic text when it provided one.
    #[error("{message}")]
    Protocol {
        status: u16,
        error: Option<String>,
        message: String,
    },

    #[error("Operation not supported by the media repository: {0}")]
    Unsupported(&'static str),

    #[error("Incomplete configuration: {0}")]
    IncompleteConfiguration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unexpected response body: {0}")]
    Decode(String),
}

impl AdminError {
    pub fn transport(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        AdminError::Transport {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Human-readable message. For protocol errors this is the backend text verbatim.
    pub fn message(&self) -> String {
        match self {
            AdminError::Protocol { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// HTTP status of a protocol error.
    pub fn status(&self) -> Option<u16> {
        match self {
            AdminError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, AdminError::Unsupported(_))
    }
}

impl From<serde_json::Error> for AdminError {
    fn from(err: serde_json::Error) -> Self {
        AdminError::Decode(format!("JSON parsing error: {}", err))
    }
}

impl ErrorMetadata for AdminError {
    fn error_code(&self) -> &'static str {
        match self {
            AdminError::Transport { .. } => "TRANSPORT_ERROR",
            AdminError::Protocol { .. } => "PROTOCOL_ERROR",
            AdminError::Unsupported(_) => "UNSUPPORTED_OPERATION",
            AdminError::IncompleteConfiguration(_) => "INCOMPLETE_CONFIGURATION",
            AdminError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            AdminError::Decode(_) => "DECODE_ERROR",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            AdminError::Transport { .. } => true,
            // 5xx and 429 are worth another try; 4xx means the request itself is wrong
            AdminError::Protocol { status, .. } => *status >= 500 || *status == 429,
            AdminError::Unsupported(_)
            | AdminError::IncompleteConfiguration(_)
            | AdminError::InvalidConfiguration(_)
            | AdminError::Decode(_) => false,
        }
    }

    fn suggested_action(&self) -> Option<&'static str> {
        match self {
            AdminError::Transport { .. } => {
                Some("Check that the homeserver URL is reachable and retry")
            }
            AdminError::Protocol { status: 401, .. } | AdminError::Protocol { status: 403, .. } => {
                Some("Check that the access token is valid and belongs to a repository admin")
            }
            AdminError::Protocol { .. } => None,
            AdminError::Unsupported(_) => None,
            AdminError::IncompleteConfiguration(_) | AdminError::InvalidConfiguration(_) => {
                Some("Run `mmr configure` with a homeserver URL and access token")
            }
            AdminError::Decode(_) => Some("Check that the server is a compatible media repository"),
        }
    }

    fn log_level(&self) -> LogLevel {
        match self {
            AdminError::Unsupported(_) => LogLevel::Debug,
            AdminError::Protocol { .. }
            | AdminError::IncompleteConfiguration(_)
            | AdminError::InvalidConfiguration(_) => LogLevel::Warn,
            AdminError::Transport { .. } | AdminError::Decode(_) => LogLevel::Error,
        }
    }
}

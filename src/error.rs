//! Error types for the board steward.

use std::time::Duration;

/// Top-level error type for a steward run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Board service error: {0}")]
    Board(#[from] BoardError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised by a board service call.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("Request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{endpoint} rate limited, retry after {retry_after:?}")]
    RateLimited {
        endpoint: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },
}

impl BoardError {
    /// Whether the call may succeed if issued again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed { .. } | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::InvalidResponse { .. } | Self::NotFound { .. } => false,
        }
    }
}

/// Board or list names that could not be resolved at startup.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Board not found: {name}")]
    BoardNotFound { name: String },

    #[error("Lists not found on board {board}: {}", .names.join(", "))]
    ListsNotFound { board: String, names: Vec<String> },
}

/// A card timestamp the classifier could not interpret.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unparseable {field} timestamp {value:?}")]
pub struct TimestampError {
    pub field: &'static str,
    pub value: String,
}

/// Result type alias for the steward.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = BoardError::Status {
            endpoint: "lists".into(),
            status: 503,
            body: String::new(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let err = BoardError::Status {
            endpoint: "cards".into(),
            status: 401,
            body: "invalid token".into(),
        };
        assert!(!err.is_transient());
        assert!(
            BoardError::RateLimited {
                endpoint: "cards".into(),
                retry_after: None
            }
            .is_transient()
        );
    }

    #[test]
    fn lists_not_found_names_every_list() {
        let err = WorkspaceError::ListsNotFound {
            board: "Current Development".into(),
            names: vec!["Icebox".into(), "Done".into()],
        };
        assert_eq!(
            err.to_string(),
            "Lists not found on board Current Development: Icebox, Done"
        );
    }
}

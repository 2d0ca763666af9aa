//! Error types for Paperstack
//!
//! Provides a single error taxonomy for the pipeline and its collaborators:
//! - Distinct error types for each external service
//! - Recoverable vs. fatal classification

use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Required setting missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Search source errors
    #[error("Search transport error: {message}")]
    Transport { message: String },

    #[error("Search returned an unexpected empty page for query: {query}")]
    EmptyPage { query: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Store errors
    #[error("Store error: {message}")]
    Store { message: String },

    // Labeling errors
    #[error("Labeling error: {message}")]
    Labeling { message: String },

    // Recommendation errors
    #[error("Recommendation error: {message}")]
    Recommendation { message: String },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Short kind name, reported to the operator alongside the message
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Configuration { .. } => "Configuration",
            AppError::MissingField { .. } => "MissingField",
            AppError::InvalidFormat { .. } => "InvalidFormat",
            AppError::Transport { .. } => "Transport",
            AppError::EmptyPage { .. } => "EmptyPage",
            AppError::HttpClient(_) => "HttpClient",
            AppError::Store { .. } => "Store",
            AppError::Labeling { .. } => "Labeling",
            AppError::Recommendation { .. } => "Recommendation",
            AppError::Internal { .. } => "Internal",
            AppError::Serialization(_) => "Serialization",
            AppError::Other(_) => "Other",
        }
    }

    /// Check if the pipeline can continue past this error.
    ///
    /// Search, labeling and recommendation failures are handled where they
    /// occur; configuration and store failures end the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Transport { .. }
                | AppError::EmptyPage { .. }
                | AppError::HttpClient(_)
                | AppError::Labeling { .. }
                | AppError::Recommendation { .. }
        )
    }

    /// Whether the search source reported that no results exist for the
    /// query, as opposed to failing.
    pub fn is_empty_result(&self) -> bool {
        matches!(self, AppError::EmptyPage { .. })
    }

    /// Whether repeating the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::HttpClient(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.as_u16() == 429 || s.is_server_error())
            }
            AppError::Transport { .. } => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_taxonomy() {
        assert!(AppError::EmptyPage { query: "q".into() }.is_recoverable());
        assert!(AppError::Labeling { message: "bad label".into() }.is_recoverable());
        assert!(!AppError::Store { message: "unauthorized".into() }.is_recoverable());
        assert!(!AppError::MissingField { field: "store.token".into() }.is_recoverable());
    }

    #[test]
    fn test_empty_result_detection() {
        let err = AppError::EmptyPage { query: "jailbreak".into() };
        assert!(err.is_empty_result());
        assert_eq!(err.kind(), "EmptyPage");

        let err = AppError::Transport { message: "connection reset".into() };
        assert!(!err.is_empty_result());
        assert!(err.is_transient());
    }

    #[test]
    fn test_missing_field_message_names_setting() {
        let err = AppError::MissingField { field: "store.database_id".into() };
        assert_eq!(err.to_string(), "Required setting missing: store.database_id");
    }
}

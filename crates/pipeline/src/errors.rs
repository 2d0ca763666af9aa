//! Pipeline error types

use paperstack_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(AppError),

    #[error("Store error: {0}")]
    Store(AppError),

    #[error("Labeling aborted at {stage} for '{title}': {source}")]
    Labeling {
        stage: &'static str,
        title: String,
        #[source]
        source: AppError,
    },
}

impl PipelineError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Config(_) | PipelineError::Store(_) => 1,
            PipelineError::Labeling { .. } => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let store = PipelineError::Store(AppError::Store {
            message: "unauthorized".into(),
        });
        assert_eq!(store.exit_code(), 1);
        assert!(store.to_string().contains("unauthorized"));

        let config = PipelineError::Config(AppError::MissingField {
            field: "store.token".into(),
        });
        assert_eq!(config.exit_code(), 1);
        assert!(config.to_string().contains("store.token"));

        let labeling = PipelineError::Labeling {
            stage: "summary",
            title: "Universal Jailbreaks".into(),
            source: AppError::Labeling {
                message: "rate limited".into(),
            },
        };
        assert_eq!(labeling.exit_code(), 2);
        assert!(labeling.to_string().contains("Universal Jailbreaks"));
    }
}

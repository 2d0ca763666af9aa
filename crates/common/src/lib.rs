//! Paperstack Common Library
//!
//! Shared code for the Paperstack pipeline including:
//! - Paper model with change tracking
//! - Store, search, recommendation and labeling clients
//! - Error types and handling
//! - Configuration management
//! - Metrics

pub mod config;
pub mod errors;
pub mod labeling;
pub mod metrics;
pub mod models;
pub mod recommend;
pub mod search;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use labeling::Labeler;
pub use models::{AttackType, Focus, Paper, PaperSnapshot};
pub use recommend::Recommender;
pub use search::PaperSearch;
pub use store::PaperStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

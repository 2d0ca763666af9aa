//! Persistent paper catalog
//!
//! [`PaperStore`] is the contract the pipeline reads from and writes back to.
//! [`NotionStore`] talks to a Notion database; [`MemoryStore`] keeps papers in
//! process for tests and dry runs.

pub mod memory;
pub mod notion;

use crate::errors::Result;
use crate::models::Paper;
use async_trait::async_trait;

pub use memory::MemoryStore;
pub use notion::NotionStore;

/// Trait for the persistent catalog
#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Read every paper in the database, with change tracking enabled
    async fn fetch_all(&self, database_id: &str) -> Result<Vec<Paper>>;

    /// Create papers without a page id and update the changed fields of the rest
    async fn upsert_batch(&self, database_id: &str, papers: &[Paper]) -> Result<()>;
}

//! Literature search collaborators
//!
//! [`PaperSearch`] is the contract the pipeline consumes; [`ArxivClient`]
//! implements it against the arXiv query API.

pub mod arxiv;

use crate::errors::Result;
use crate::models::Paper;
use async_trait::async_trait;

pub use arxiv::ArxivClient;

/// Result ordering requested from the search source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    SubmittedDate,
    Relevance,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::SubmittedDate => "submittedDate",
            SortOrder::Relevance => "relevance",
        }
    }
}

/// Trait for literature search sources
#[async_trait]
pub trait PaperSearch: Send + Sync {
    /// Search for up to `max_results` papers.
    ///
    /// An empty result may come back as `Ok(vec![])` or as
    /// `AppError::EmptyPage`; callers treat both the same way.
    async fn search(&self, query: &str, max_results: usize, sort: SortOrder) -> Result<Vec<Paper>>;

    /// Look a paper up by its source identifier
    async fn find_by_id(&self, id: &str) -> Result<Option<Paper>>;

    /// Best match for a title
    async fn find_by_title(&self, title: &str) -> Result<Option<Paper>> {
        // Dashes confuse the title field search
        let query = format!("ti:{}", title.replace('-', " "));
        let mut results = self.search(&query, 1, SortOrder::Relevance).await?;
        Ok(if results.is_empty() { None } else { Some(results.remove(0)) })
    }
}

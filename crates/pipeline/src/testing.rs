//! In-memory collaborators for pipeline tests

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use paperstack_common::errors::{AppError, Result};
use paperstack_common::recommend::{Recommendations, Recommender};
use paperstack_common::search::SortOrder;
use paperstack_common::{Paper, PaperSearch, PaperSnapshot};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Complete arXiv paper as the search source would return it
pub fn arxiv_paper(title: &str, arxiv_id: &str) -> Paper {
    Paper::discovered(PaperSnapshot {
        title: Some(title.to_string()),
        url: Some(format!("https://arxiv.org/abs/{}", arxiv_id)),
        abstract_text: Some(format!("{}. We study jailbreak attacks on chat models.", title)),
        authors: vec!["Ada Lovelace".to_string(), "Alan Turing".to_string()],
        published: Some(Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap()),
        ..Default::default()
    })
}

/// Search source answering from a fixed catalog and scripted query results
#[derive(Default)]
pub struct StaticSearch {
    catalog: Vec<Paper>,
    responses: Mutex<VecDeque<Result<Vec<Paper>>>>,
    queries: Mutex<Vec<String>>,
    lookups: AtomicUsize,
    fail: bool,
}

impl StaticSearch {
    pub fn with_catalog(catalog: Vec<Paper>) -> Self {
        Self {
            catalog,
            ..Default::default()
        }
    }

    /// Successive `search` calls return these results; exhausted means empty
    pub fn with_responses(responses: Vec<Result<Vec<Paper>>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Queries passed to `search`, title lookups excluded
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// Number of identity lookups
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            return Err(AppError::Transport {
                message: "search source unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PaperSearch for StaticSearch {
    async fn search(&self, query: &str, max_results: usize, _sort: SortOrder) -> Result<Vec<Paper>> {
        if let Some(title) = query.strip_prefix("ti:") {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            return Ok(self
                .catalog
                .iter()
                .filter(|p| p.title.as_deref().map(|t| t.replace('-', " ")).as_deref() == Some(title))
                .take(max_results)
                .cloned()
                .collect());
        }

        self.queries.lock().unwrap().push(query.to_string());
        self.check()?;
        let next = self.responses.lock().unwrap().pop_front();
        let mut papers = next.unwrap_or_else(|| Ok(Vec::new()))?;
        papers.truncate(max_results);
        Ok(papers)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Paper>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.catalog.iter().find(|p| p.arxiv_id() == Some(id)).cloned())
    }
}

/// Recommender returning a fixed candidate list
pub struct StaticRecommender {
    papers: Vec<Paper>,
    seen: Mutex<Vec<String>>,
}

impl StaticRecommender {
    pub fn new(papers: Vec<Paper>) -> Self {
        Self {
            papers,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Titles of the seeds passed to `recommend`
    pub fn seeds(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Recommender for StaticRecommender {
    async fn recommend(&self, seeds: &[Paper]) -> Result<Recommendations> {
        self.seen
            .lock()
            .unwrap()
            .extend(seeds.iter().filter_map(|p| p.title.clone()));
        Ok(Recommendations {
            papers: self.papers.clone(),
            explored: (0..seeds.len()).collect(),
        })
    }
}

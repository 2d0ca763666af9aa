//! Related-paper recommendations
//!
//! Provides:
//! - The [`Recommender`] contract used for exploration
//! - A Semantic Scholar client, rate limited with governor
//! - Candidate filtering (arXiv-only, de-duplicated, recent)

use crate::config::RecommendConfig;
use crate::errors::{AppError, Result};
use crate::models::{Paper, PaperSnapshot};
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one recommendation pass
#[derive(Debug, Default)]
pub struct Recommendations {
    /// Candidate papers with title, url and abstract only; identity must be
    /// backfilled from the search source before use
    pub papers: Vec<Paper>,

    /// Indices into the seed slice whose recommendations were fetched
    pub explored: Vec<usize>,
}

/// Trait for recommendation sources
#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(&self, seeds: &[Paper]) -> Result<Recommendations>;
}

/// One recommended paper as returned by Semantic Scholar
#[derive(Debug, Clone, Deserialize)]
pub struct ScholarPaper {
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    #[serde(rename = "externalIds", default)]
    pub external_ids: HashMap<String, serde_json::Value>,
}

impl ScholarPaper {
    fn arxiv_id(&self) -> Option<String> {
        match self.external_ids.get("ArXiv")? {
            serde_json::Value::String(id) => Some(id.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecommendationResponse {
    #[serde(rename = "recommendedPapers", default)]
    recommended_papers: Vec<ScholarPaper>,
}

/// Keep arXiv-backed, recent, unseen candidates, at most `max_results`
pub fn filter_candidates(
    results: Vec<ScholarPaper>,
    seeds: &[Paper],
    min_year: i32,
    max_results: usize,
) -> Vec<Paper> {
    let seed_titles: HashSet<&str> = seeds.iter().filter_map(|p| p.title.as_deref()).collect();
    let mut seen_ids = HashSet::new();
    let mut papers = Vec::new();

    for result in results {
        let Some(arxiv_id) = result.arxiv_id() else {
            continue;
        };
        if !seen_ids.insert(arxiv_id.clone()) {
            continue;
        }
        if result.title.as_deref().is_some_and(|t| seed_titles.contains(t)) {
            continue;
        }
        if result.year.is_some_and(|y| y < min_year) {
            continue;
        }

        papers.push(Paper::discovered(PaperSnapshot {
            title: result.title,
            url: Some(format!("https://arxiv.org/abs/{}", arxiv_id)),
            abstract_text: result.abstract_text,
            ..Default::default()
        }));
        if papers.len() >= max_results {
            break;
        }
    }

    papers
}

/// Semantic Scholar recommendations client
pub struct SemanticScholarClient {
    client: reqwest::Client,
    base_url: String,
    max_results: usize,
    min_year: i32,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl SemanticScholarClient {
    pub fn new(config: &RecommendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            max_results: config.max_results,
            min_year: config.min_year,
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }

    async fn recommended_for(&self, arxiv_id: &str) -> Result<Vec<ScholarPaper>> {
        self.limiter.until_ready().await;

        let url = format!(
            "{}/recommendations/v1/papers/forpaper/arXiv:{}",
            self.base_url, arxiv_id
        );
        let response = self
            .client
            .get(&url)
            .query(&[
                ("limit", (self.max_results * 2).to_string()),
                ("fields", "title,abstract,year,externalIds".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Recommendation {
                message: format!("Semantic Scholar error {} for arXiv:{}", status, arxiv_id),
            });
        }

        let body: RecommendationResponse = response.json().await?;
        Ok(body.recommended_papers)
    }
}

#[async_trait]
impl Recommender for SemanticScholarClient {
    async fn recommend(&self, seeds: &[Paper]) -> Result<Recommendations> {
        let mut results = Vec::new();
        let mut explored = Vec::new();

        for (index, seed) in seeds.iter().enumerate() {
            let Some(arxiv_id) = seed.arxiv_id() else {
                continue;
            };

            match self.recommended_for(arxiv_id).await {
                Ok(found) => {
                    debug!(arxiv_id, count = found.len(), "Recommendations fetched");
                    results.extend(found);
                    explored.push(index);
                }
                Err(e) => warn!(arxiv_id, error = %e, "Recommendation request failed"),
            }
        }

        Ok(Recommendations {
            papers: filter_candidates(results, seeds, self.min_year, self.max_results),
            explored,
        })
    }
}

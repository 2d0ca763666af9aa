//! Pipeline driver
//!
//! Runs one reconciliation pass:
//! 1. Fetch stored papers
//! 2. Complete partial identities and mark old papers explored
//! 3. Search for new papers and merge them by title
//! 4. Optionally add recommendations for unexplored papers
//! 5. Enrich under the new-paper quota
//! 6. Write changed papers back

use crate::backfill::{backfill_identity, mark_explored_before};
use crate::errors::PipelineError;
use crate::merge::{merge_by_title, merge_limited};
use crate::retry_search::{QueryPrompt, RetryingSearch};
use crate::scheduler::{EnrichmentReport, EnrichmentScheduler};
use crate::writeback::write_back;
use chrono::{DateTime, Utc};
use paperstack_common::config::{AppConfig, LabelingErrorPolicy};
use paperstack_common::errors::AppError;
use paperstack_common::metrics::record_papers_added;
use paperstack_common::{Labeler, Paper, PaperSearch, PaperStore, Recommender};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Run settings derived from configuration
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub database_id: String,
    pub query: String,
    pub default_query: String,
    pub search_enabled: bool,
    pub search_limit: usize,
    pub max_new: Option<usize>,
    pub explored_cutoff: DateTime<Utc>,
    pub on_labeling_error: LabelingErrorPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let database_id = config.database_id().ok_or_else(|| {
            PipelineError::Config(AppError::MissingField {
                field: "store.database_id (NOTION_DATABASE_ID)".to_string(),
            })
        })?;

        Ok(Self {
            database_id,
            query: config.search.query.clone(),
            default_query: paperstack_common::config::DEFAULT_SEARCH_QUERY.to_string(),
            search_enabled: config.search_enabled(),
            search_limit: config.search_limit(),
            max_new: config.pipeline.max_new,
            explored_cutoff: config.pipeline.explored_cutoff,
            on_labeling_error: config.pipeline.on_labeling_error,
        })
    }
}

/// Counts from one run
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub existing: usize,
    pub added_from_search: usize,
    pub added_from_recommendations: usize,
    pub enrichment: EnrichmentReport,
    pub written: usize,
}

/// One configured pipeline run
pub struct Pipeline {
    store: Arc<dyn PaperStore>,
    search: Arc<dyn PaperSearch>,
    recommender: Option<Arc<dyn Recommender>>,
    labeler: Arc<dyn Labeler>,
    prompt: Box<dyn QueryPrompt>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn PaperStore>,
        search: Arc<dyn PaperSearch>,
        labeler: Arc<dyn Labeler>,
        prompt: Box<dyn QueryPrompt>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            search,
            recommender: None,
            labeler,
            prompt,
            settings,
        }
    }

    /// Enable recommendation expansion
    pub fn with_recommender(mut self, recommender: Arc<dyn Recommender>) -> Self {
        self.recommender = Some(recommender);
        self
    }

    #[instrument(skip_all, fields(database_id = %self.settings.database_id))]
    pub async fn run(self) -> Result<RunSummary, PipelineError> {
        let Pipeline {
            store,
            search,
            recommender,
            labeler,
            prompt,
            settings,
        } = self;
        let mut summary = RunSummary::default();

        let mut papers = store
            .fetch_all(&settings.database_id)
            .await
            .map_err(PipelineError::Store)?;
        summary.existing = papers.len();
        info!(count = papers.len(), "Fetched stored papers");

        backfill_identity(search.as_ref(), &mut papers).await;
        let marked = mark_explored_before(&mut papers, settings.explored_cutoff);
        if marked > 0 {
            info!(marked, cutoff = %settings.explored_cutoff, "Marked older papers explored");
        }

        let existing_count = papers.len();

        if settings.search_enabled {
            let mut retrying = RetryingSearch::new(search.clone(), prompt, settings.default_query.clone());
            let found = retrying.search(&settings.query, settings.search_limit).await;
            papers = merge_limited(papers, found, settings.max_new);
            summary.added_from_search = papers.len() - existing_count;
            info!(added = summary.added_from_search, "Merged search results");
        }

        if let Some(recommender) = recommender {
            let before = papers.len();
            let budget = settings.max_new.map(|m| m.saturating_sub(summary.added_from_search));
            papers =
                expand_with_recommendations(recommender.as_ref(), search.as_ref(), papers, budget)
                    .await;
            summary.added_from_recommendations = papers.len() - before;
        }

        record_papers_added(summary.added_from_search + summary.added_from_recommendations);

        let scheduler = EnrichmentScheduler::new(labeler, settings.max_new, settings.on_labeling_error);
        summary.enrichment = scheduler.run(&mut papers, existing_count).await?;

        summary.written = write_back(store.as_ref(), &settings.database_id, &papers)
            .await
            .map_err(PipelineError::Store)?;

        info!(
            existing = summary.existing,
            added_from_search = summary.added_from_search,
            added_from_recommendations = summary.added_from_recommendations,
            labeled = summary.enrichment.labeled(),
            labeling_failures = summary.enrichment.failed(),
            written = summary.written,
            "Run complete"
        );
        Ok(summary)
    }
}

/// Add recommended papers for every unexplored paper with an arXiv id.
///
/// At most `max_added` recommendations are merged. Seeds whose
/// recommendations were fetched are marked explored. Failures leave the
/// papers unchanged.
async fn expand_with_recommendations(
    recommender: &dyn Recommender,
    search: &dyn PaperSearch,
    mut papers: Vec<Paper>,
    max_added: Option<usize>,
) -> Vec<Paper> {
    if max_added == Some(0) {
        info!("New-paper quota spent, skipping recommendations");
        return papers;
    }
    let seed_indices: Vec<usize> = papers
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.explored && p.arxiv_id().is_some())
        .map(|(i, _)| i)
        .collect();
    if seed_indices.is_empty() {
        info!("No unexplored papers to expand");
        return papers;
    }
    let seeds: Vec<Paper> = seed_indices.iter().map(|&i| papers[i].clone()).collect();
    info!(seeds = seeds.len(), "Fetching recommendations");

    let recommendations = match recommender.recommend(&seeds).await {
        Ok(r) => r,
        Err(e) if e.is_recoverable() => {
            warn!(error = %e, "Recommendations unavailable, continuing without them");
            return papers;
        }
        Err(e) => {
            error!(error = %e, kind = e.kind(), "Recommender failed, continuing without it");
            return papers;
        }
    };

    for seed in recommendations.explored {
        if let Some(&index) = seed_indices.get(seed) {
            papers[index].explored = true;
        }
    }

    let mut candidates = recommendations.papers;
    backfill_identity(search, &mut candidates).await;
    let before = papers.len();
    let papers = match max_added {
        Some(max) => merge_limited(papers, candidates, Some(max)),
        None => merge_by_title(papers, candidates),
    };
    info!(added = papers.len() - before, "Merged recommendations");
    papers
}

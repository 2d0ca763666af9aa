//! Quota-bounded enrichment
//!
//! Three stages run in order: summary, focus, attack type. Each stage picks
//! the papers missing its field that have text to label. Every stored paper
//! selected is processed; newly discovered papers are capped at `max_new`
//! per stage, taken in discovery order.

use crate::errors::PipelineError;
use paperstack_common::config::LabelingErrorPolicy;
use paperstack_common::errors::Result as AppResult;
use paperstack_common::metrics::LabelingTimer;
use paperstack_common::{Labeler, Paper};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// One enrichment stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Summary,
    Focus,
    AttackType,
}

impl Stage {
    /// Execution order
    pub const ALL: [Stage; 3] = [Stage::Summary, Stage::Focus, Stage::AttackType];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Summary => "summary",
            Stage::Focus => "focus",
            Stage::AttackType => "attack_type",
        }
    }

    fn is_missing(&self, paper: &Paper) -> bool {
        match self {
            Stage::Summary => paper.summary.as_deref().map_or(true, |s| s.trim().is_empty()),
            Stage::Focus => paper.focus.is_none(),
            Stage::AttackType => paper.attack_type.is_none(),
        }
    }

    /// Labeling input; labels fall back to the summary
    fn source_text<'a>(&self, paper: &'a Paper) -> Option<&'a str> {
        match self {
            Stage::Summary => paper.abstract_text.as_deref().filter(|t| !t.trim().is_empty()),
            Stage::Focus | Stage::AttackType => paper.reference_text(),
        }
    }
}

/// Papers chosen for one stage, as indices into the paper slice
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Selection {
    pub existing: Vec<usize>,
    pub new: Vec<usize>,
    /// New candidates before the quota was applied
    pub new_available: usize,
}

impl Selection {
    pub fn limited(&self) -> bool {
        self.new.len() < self.new_available
    }

    fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.existing.iter().chain(self.new.iter()).copied()
    }
}

/// Choose the papers a stage will label.
///
/// Papers before `existing_count` are stored ones and are all selected; later
/// papers are new and at most `max_new` of them are selected.
pub fn select(stage: Stage, papers: &[Paper], existing_count: usize, max_new: Option<usize>) -> Selection {
    let mut selection = Selection::default();

    for (index, paper) in papers.iter().enumerate() {
        if !stage.is_missing(paper) || stage.source_text(paper).is_none() {
            continue;
        }
        if index < existing_count {
            selection.existing.push(index);
        } else {
            selection.new.push(index);
        }
    }

    selection.new_available = selection.new.len();
    if let Some(max_new) = max_new {
        selection.new.truncate(max_new);
    }
    selection
}

/// Outcome of one stage
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub existing_selected: usize,
    pub new_selected: usize,
    pub labeled: usize,
    pub failed: usize,
}

/// Outcome of all stages, in execution order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub stages: Vec<(Stage, StageReport)>,
}

impl EnrichmentReport {
    pub fn labeled(&self) -> usize {
        self.stages.iter().map(|(_, r)| r.labeled).sum()
    }

    pub fn failed(&self) -> usize {
        self.stages.iter().map(|(_, r)| r.failed).sum()
    }
}

/// Runs the enrichment stages against one labeler
pub struct EnrichmentScheduler {
    labeler: Arc<dyn Labeler>,
    max_new: Option<usize>,
    on_error: LabelingErrorPolicy,
}

impl EnrichmentScheduler {
    pub fn new(labeler: Arc<dyn Labeler>, max_new: Option<usize>, on_error: LabelingErrorPolicy) -> Self {
        Self {
            labeler,
            max_new,
            on_error,
        }
    }

    /// Run summary, focus and attack type stages in order
    #[instrument(skip_all, fields(papers = papers.len(), existing_count = existing_count, backend = self.labeler.name()))]
    pub async fn run(
        &self,
        papers: &mut [Paper],
        existing_count: usize,
    ) -> Result<EnrichmentReport, PipelineError> {
        let mut report = EnrichmentReport::default();
        for stage in Stage::ALL {
            let stage_report = self.run_stage(stage, papers, existing_count).await?;
            report.stages.push((stage, stage_report));
        }
        Ok(report)
    }

    async fn run_stage(
        &self,
        stage: Stage,
        papers: &mut [Paper],
        existing_count: usize,
    ) -> Result<StageReport, PipelineError> {
        let selection = select(stage, papers, existing_count, self.max_new);

        match self.max_new {
            Some(max_new) => info!(
                stage = stage.as_str(),
                existing = selection.existing.len(),
                new = selection.new.len(),
                new_available = selection.new_available,
                max_new,
                limited = selection.limited(),
                "Stage selection"
            ),
            None => info!(
                stage = stage.as_str(),
                existing = selection.existing.len(),
                new = selection.new.len(),
                "Stage selection (no new-paper limit)"
            ),
        }

        let mut report = StageReport {
            existing_selected: selection.existing.len(),
            new_selected: selection.new.len(),
            ..Default::default()
        };

        for index in selection.indices() {
            let paper = &mut papers[index];
            let Some(text) = stage.source_text(paper).map(str::to_string) else {
                continue;
            };

            let timer = LabelingTimer::start(stage.as_str(), self.labeler.name());
            let outcome = self.apply(stage, paper, &text).await;
            timer.finish(outcome.is_ok());

            match outcome {
                Ok(()) => report.labeled += 1,
                Err(e) => {
                    report.failed += 1;
                    match self.on_error {
                        LabelingErrorPolicy::Skip => warn!(
                            stage = stage.as_str(),
                            title = %paper.short_title(60),
                            error = %e,
                            "Labeling failed, skipping paper"
                        ),
                        LabelingErrorPolicy::Abort => {
                            return Err(PipelineError::Labeling {
                                stage: stage.as_str(),
                                title: paper.short_title(60),
                                source: e,
                            })
                        }
                    }
                }
            }
        }

        info!(
            stage = stage.as_str(),
            existing = report.existing_selected,
            new = report.new_selected,
            labeled = report.labeled,
            failed = report.failed,
            "Stage complete"
        );
        Ok(report)
    }

    async fn apply(&self, stage: Stage, paper: &mut Paper, text: &str) -> AppResult<()> {
        match stage {
            Stage::Summary => paper.summary = Some(self.labeler.summarize(text).await?),
            Stage::Focus => paper.focus = Some(self.labeler.classify_focus(text).await?),
            Stage::AttackType => {
                paper.attack_type = Some(self.labeler.classify_attack_type(text).await?)
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::arxiv_paper;
    use paperstack_common::labeling::MockLabeler;
    use paperstack_common::{Focus, PaperSnapshot};

    fn stored(title: &str, abstract_text: Option<&str>) -> Paper {
        Paper::stored(
            format!("page-{}", title),
            PaperSnapshot {
                title: Some(title.to_string()),
                abstract_text: abstract_text.map(str::to_string),
                ..Default::default()
            },
        )
    }

    /// Three stored papers followed by five new ones
    fn catalog() -> Vec<Paper> {
        let mut papers = vec![
            stored("E1", Some("Jailbreak attack on assistants.")),
            stored("E2", Some("Detecting prompt injection.")),
            stored("E3", None),
        ];
        for i in 0..5 {
            papers.push(arxiv_paper(&format!("N{}", i), &format!("2410.0000{}", i)));
        }
        papers
    }

    #[test]
    fn test_selection_splits_existing_and_new() {
        let papers = catalog();
        let selection = select(Stage::Summary, &papers, 3, Some(2));
        // E3 has no abstract
        assert_eq!(selection.existing, vec![0, 1]);
        assert_eq!(selection.new, vec![3, 4]);
        assert_eq!(selection.new_available, 5);
        assert!(selection.limited());

        let unlimited = select(Stage::Summary, &papers, 3, None);
        assert_eq!(unlimited.new.len(), 5);
        assert!(!unlimited.limited());
    }

    #[test]
    fn test_label_stages_fall_back_to_summary() {
        let mut paper = stored("S", None);
        paper.summary = Some("A defense.".into());
        let papers = vec![paper];

        assert!(select(Stage::Summary, &papers, 1, None).existing.is_empty());
        assert_eq!(select(Stage::Focus, &papers, 1, None).existing, vec![0]);
        assert_eq!(select(Stage::AttackType, &papers, 1, None).existing, vec![0]);
    }

    #[test]
    fn test_populated_fields_are_not_selected() {
        let mut paper = stored("F", Some("text"));
        paper.focus = Some(Focus::Safety);
        let papers = vec![paper];
        assert!(select(Stage::Focus, &papers, 1, None).existing.is_empty());
        assert_eq!(select(Stage::Summary, &papers, 1, None).existing, vec![0]);
    }

    #[tokio::test]
    async fn test_quota_bounds_new_papers_only() {
        let mut papers = catalog();
        let labeler = Arc::new(MockLabeler::new());
        let scheduler = EnrichmentScheduler::new(labeler, Some(2), LabelingErrorPolicy::Skip);

        let report = scheduler.run(&mut papers, 3).await.unwrap();

        // Every eligible stored paper is labeled
        assert!(papers[0].summary.is_some() && papers[0].focus.is_some() && papers[0].attack_type.is_some());
        assert!(papers[1].summary.is_some() && papers[1].focus.is_some() && papers[1].attack_type.is_some());
        assert!(papers[2].summary.is_none() && papers[2].focus.is_none());

        // Only the first two new papers are labeled
        for stage in Stage::ALL {
            let labeled_new = papers[3..].iter().filter(|p| !stage.is_missing(p)).count();
            assert_eq!(labeled_new, 2, "stage {}", stage.as_str());
        }
        assert!(papers[3].summary.is_some() && papers[4].summary.is_some());
        assert!(papers[5].summary.is_none());

        assert_eq!(report.stages.len(), 3);
        assert_eq!(report.stages[0].0, Stage::Summary);
        assert_eq!(report.stages[0].1.existing_selected, 2);
        assert_eq!(report.stages[0].1.new_selected, 2);
        assert_eq!(report.labeled(), 12);
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let mut papers = vec![stored("Fresh", Some("We study a jailbreak attack."))];
        let scheduler =
            EnrichmentScheduler::new(Arc::new(MockLabeler::new()), None, LabelingErrorPolicy::Skip);

        let report = scheduler.run(&mut papers, 1).await.unwrap();
        let order: Vec<_> = report.stages.iter().map(|(s, _)| *s).collect();
        assert_eq!(order, Stage::ALL.to_vec());
        assert_eq!(papers[0].focus, Some(Focus::Offensive));
        assert!(papers[0].summary.as_deref().unwrap().starts_with("Summary:"));
    }

    #[tokio::test]
    async fn test_skip_policy_continues_after_failure() {
        let mut papers = vec![
            stored("Bad", Some("poison-pill text")),
            stored("Good", Some("Jailbreak attack.")),
        ];
        let labeler = Arc::new(MockLabeler::failing_on("poison-pill"));
        let scheduler = EnrichmentScheduler::new(labeler.clone(), None, LabelingErrorPolicy::Skip);

        let report = scheduler.run(&mut papers, 2).await.unwrap();
        assert!(papers[0].summary.is_none());
        assert!(papers[0].focus.is_none());
        assert!(papers[1].summary.is_some());
        assert!(papers[1].attack_type.is_some());
        assert_eq!(report.failed(), 3);
        assert_eq!(report.labeled(), 3);
        assert!(!papers[0].is_dirty());
    }

    #[tokio::test]
    async fn test_abort_policy_stops_the_run() {
        let mut papers = vec![
            stored("Bad", Some("poison-pill text")),
            stored("Good", Some("Jailbreak attack.")),
        ];
        let labeler = Arc::new(MockLabeler::failing_on("poison-pill"));
        let scheduler = EnrichmentScheduler::new(labeler.clone(), None, LabelingErrorPolicy::Abort);

        let err = scheduler.run(&mut papers, 2).await.unwrap_err();
        match err {
            PipelineError::Labeling { stage, title, .. } => {
                assert_eq!(stage, "summary");
                assert_eq!(title, "Bad");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(labeler.calls(), 1);
        assert!(papers[1].summary.is_none());
    }
}

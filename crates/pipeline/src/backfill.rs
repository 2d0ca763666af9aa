//! Identity completion for partial papers

use chrono::{DateTime, Utc};
use paperstack_common::{Paper, PaperSearch};
use tracing::{debug, error, info, instrument, warn};

/// Counts from one backfill pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillReport {
    pub filled: usize,
    pub missed: usize,
}

/// Complete title, url, authors, publication date and abstract of every paper
/// lacking a full identity.
///
/// Papers are looked up by arXiv id when the url carries one, then by title
/// when the id finds nothing. Papers with no match are left in place.
#[instrument(skip_all, fields(papers = papers.len()))]
pub async fn backfill_identity(search: &dyn PaperSearch, papers: &mut [Paper]) -> BackfillReport {
    let mut report = BackfillReport::default();

    for paper in papers.iter_mut().filter(|p| !p.has_complete_identity()) {
        let by_id = match paper.arxiv_id() {
            Some(id) => search.find_by_id(id).await,
            None => Ok(None),
        };
        let lookup = match (by_id, paper.title.as_deref()) {
            (Ok(None), Some(title)) => search.find_by_title(title).await,
            (result, _) => result,
        };

        match lookup {
            Ok(Some(found)) => {
                if paper.title.is_some() && found.title != paper.title {
                    warn!(
                        stored = paper.title.as_deref().unwrap_or_default(),
                        found = found.title.as_deref().unwrap_or_default(),
                        "Backfill matched a different title"
                    );
                }
                paper.title = found.title;
                paper.url = found.url;
                paper.set_authors(found.authors);
                paper.published = found.published;
                paper.abstract_text = found.abstract_text;
                debug!(title = %paper.short_title(60), "Identity completed");
                report.filled += 1;
            }
            Ok(None) => {
                warn!(title = %paper.short_title(60), "No match found to complete identity");
                report.missed += 1;
            }
            Err(e) if e.is_recoverable() => {
                warn!(title = %paper.short_title(60), error = %e, "Identity lookup failed");
                report.missed += 1;
            }
            Err(e) => {
                error!(
                    title = %paper.short_title(60),
                    error = %e,
                    kind = e.kind(),
                    "Identity lookup failed"
                );
                report.missed += 1;
            }
        }
    }

    if report.filled + report.missed > 0 {
        info!(filled = report.filled, missed = report.missed, "Backfill complete");
    }
    report
}

/// Mark papers published before `cutoff` as explored.
///
/// Returns how many papers changed.
pub fn mark_explored_before(papers: &mut [Paper], cutoff: DateTime<Utc>) -> usize {
    let mut marked = 0;
    for paper in papers.iter_mut() {
        if !paper.explored && paper.published.is_some_and(|p| p < cutoff) {
            paper.explored = true;
            marked += 1;
        }
    }
    marked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{arxiv_paper, StaticSearch};
    use chrono::TimeZone;
    use paperstack_common::PaperSnapshot;

    #[tokio::test]
    async fn test_backfill_by_id_and_title() {
        let search = StaticSearch::with_catalog(vec![
            arxiv_paper("Universal Jailbreaks", "2307.15043"),
            arxiv_paper("Prompt Injection Survey", "2402.00001"),
        ]);

        let mut papers = vec![
            // Only the url is known
            Paper::stored(
                "p1",
                PaperSnapshot {
                    url: Some("https://arxiv.org/abs/2307.15043".into()),
                    ..Default::default()
                },
            ),
            // Only the title is known
            Paper::stored(
                "p2",
                PaperSnapshot {
                    title: Some("Prompt Injection Survey".into()),
                    ..Default::default()
                },
            ),
            // Unknown paper stays partial
            Paper::stored(
                "p3",
                PaperSnapshot {
                    title: Some("Lost Paper".into()),
                    ..Default::default()
                },
            ),
        ];

        let report = backfill_identity(&search, &mut papers).await;
        assert_eq!(report, BackfillReport { filled: 2, missed: 1 });

        assert_eq!(papers[0].title.as_deref(), Some("Universal Jailbreaks"));
        assert!(papers[0].has_complete_identity());
        assert!(papers[0].abstract_text.is_some());
        assert_eq!(papers[1].arxiv_id(), Some("2402.00001"));
        assert!(papers[1].has_complete_identity());
        assert!(!papers[2].has_complete_identity());
        assert_eq!(papers.len(), 3);
    }

    #[tokio::test]
    async fn test_stale_id_falls_back_to_title() {
        let search =
            StaticSearch::with_catalog(vec![arxiv_paper("Prompt Injection Survey", "2402.00001")]);
        let mut papers = vec![Paper::stored(
            "p1",
            PaperSnapshot {
                title: Some("Prompt Injection Survey".into()),
                url: Some("https://arxiv.org/abs/2402.99999".into()),
                ..Default::default()
            },
        )];

        let report = backfill_identity(&search, &mut papers).await;
        assert_eq!(report, BackfillReport { filled: 1, missed: 0 });
        assert!(papers[0].has_complete_identity());
        assert_eq!(papers[0].arxiv_id(), Some("2402.00001"));
        assert_eq!(search.lookups(), 2);
    }

    #[tokio::test]
    async fn test_complete_papers_are_not_looked_up() {
        let search = StaticSearch::with_catalog(vec![]);
        let mut papers = vec![arxiv_paper("Known", "2401.00001")];
        let report = backfill_identity(&search, &mut papers).await;
        assert_eq!(report, BackfillReport::default());
        assert_eq!(search.lookups(), 0);
    }

    #[tokio::test]
    async fn test_lookup_errors_leave_paper_in_place() {
        let search = StaticSearch::failing();
        let mut papers = vec![Paper::stored(
            "p1",
            PaperSnapshot {
                title: Some("Anything".into()),
                ..Default::default()
            },
        )];
        let report = backfill_identity(&search, &mut papers).await;
        assert_eq!(report.missed, 1);
        assert!(!papers[0].is_dirty());
    }

    #[test]
    fn test_mark_explored_before_cutoff() {
        let cutoff = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        let mut old = arxiv_paper("Old", "2301.00001");
        old.published = Some(Utc.with_ymd_and_hms(2023, 1, 5, 0, 0, 0).unwrap());
        let mut fresh = arxiv_paper("Fresh", "2409.00001");
        fresh.published = Some(Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap());
        let undated = Paper::discovered(PaperSnapshot::default());

        let mut papers = vec![old, fresh, undated];
        assert_eq!(mark_explored_before(&mut papers, cutoff), 1);
        assert!(papers[0].explored);
        assert!(!papers[1].explored);
        assert!(!papers[2].explored);

        // Already explored papers are not counted again
        assert_eq!(mark_explored_before(&mut papers, cutoff), 0);
    }
}

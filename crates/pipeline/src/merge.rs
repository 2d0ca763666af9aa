//! Title-based merge of stored papers with discovered candidates

use paperstack_common::Paper;
use std::collections::HashSet;

/// Merge `candidates` into `existing` by exact title.
///
/// Keeps every existing paper in order, then appends each candidate whose
/// title is not already present. Candidates without a title are dropped.
pub fn merge_by_title(existing: Vec<Paper>, candidates: Vec<Paper>) -> Vec<Paper> {
    merge_limited(existing, candidates, None)
}

/// Like [`merge_by_title`], accepting at most `max_added` candidates
pub fn merge_limited(
    existing: Vec<Paper>,
    candidates: Vec<Paper>,
    max_added: Option<usize>,
) -> Vec<Paper> {
    let mut titles: HashSet<String> = existing.iter().filter_map(|p| p.title.clone()).collect();
    let mut merged = existing;
    let mut added = 0;

    for candidate in candidates {
        if max_added.is_some_and(|max| added >= max) {
            break;
        }
        let Some(title) = candidate.title.as_deref() else {
            continue;
        };
        if titles.insert(title.to_string()) {
            merged.push(candidate);
            added += 1;
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperstack_common::PaperSnapshot;

    fn stored(title: &str) -> Paper {
        Paper::stored(
            format!("page-{}", title),
            PaperSnapshot {
                title: Some(title.to_string()),
                ..Default::default()
            },
        )
    }

    fn found(title: &str) -> Paper {
        Paper::discovered(PaperSnapshot {
            title: Some(title.to_string()),
            ..Default::default()
        })
    }

    fn titles(papers: &[Paper]) -> Vec<&str> {
        papers.iter().filter_map(|p| p.title.as_deref()).collect()
    }

    #[test]
    fn test_empty_candidates_is_identity() {
        let existing = vec![stored("A"), stored("B")];
        let merged = merge_by_title(existing.clone(), vec![]);
        assert_eq!(merged, existing);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let merged = merge_by_title(
            vec![stored("A"), stored("B")],
            vec![found("A"), found("C"), found("C"), found("D")],
        );
        assert_eq!(titles(&merged), vec!["A", "B", "C", "D"]);
        // The stored copy of A wins
        assert_eq!(merged[0].page_id.as_deref(), Some("page-A"));
        assert!(merged[2].page_id.is_none());
    }

    #[test]
    fn test_title_match_is_exact() {
        let merged = merge_by_title(vec![stored("Attack")], vec![found("attack"), found("Attack ")]);
        assert_eq!(titles(&merged), vec!["Attack", "attack", "Attack "]);
    }

    #[test]
    fn test_untitled_candidates_are_rejected() {
        let untitled = Paper::discovered(PaperSnapshot {
            url: Some("https://arxiv.org/abs/2401.00001".into()),
            ..Default::default()
        });
        let merged = merge_by_title(vec![stored("A")], vec![untitled, found("B")]);
        assert_eq!(titles(&merged), vec!["A", "B"]);
    }

    #[test]
    fn test_limit_counts_accepted_candidates_only() {
        let merged = merge_limited(
            vec![stored("A")],
            vec![found("A"), found("C"), found("D")],
            Some(1),
        );
        assert_eq!(titles(&merged), vec!["A", "C"]);
    }

    #[test]
    fn test_merged_titles_are_unique() {
        let existing = vec![stored("A"), stored("B"), stored("C")];
        let candidates = vec![found("C"), found("D"), found("A"), found("E"), found("D")];
        let merged = merge_by_title(existing, candidates);

        let unique: HashSet<_> = titles(&merged).into_iter().collect();
        assert_eq!(unique.len(), merged.len());
        assert_eq!(titles(&merged), vec!["A", "B", "C", "D", "E"]);
    }
}

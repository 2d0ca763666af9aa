//! Paper record with change tracking
//!
//! A paper read from the store carries a baseline snapshot taken when it was
//! constructed. Writeback compares against that baseline so unchanged pages
//! are never sent back to the store.

use super::labels::{AttackType, Focus};
use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Maximum number of authors kept on a paper
pub const MAX_AUTHORS: usize = 5;

/// Tracked fields of a paper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaperField {
    Title,
    Url,
    Focus,
    AttackType,
    Summary,
    Abstract,
    Authors,
    Published,
    Explored,
}

/// Value snapshot of every tracked field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperSnapshot {
    pub title: Option<String>,
    pub url: Option<String>,
    pub focus: Option<Focus>,
    pub attack_type: Option<AttackType>,
    pub summary: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub authors: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    pub explored: bool,
}

impl PaperSnapshot {
    fn diff(&self, other: &PaperSnapshot) -> Vec<PaperField> {
        let mut changed = Vec::new();
        if self.title != other.title {
            changed.push(PaperField::Title);
        }
        if self.url != other.url {
            changed.push(PaperField::Url);
        }
        if self.focus != other.focus {
            changed.push(PaperField::Focus);
        }
        if self.attack_type != other.attack_type {
            changed.push(PaperField::AttackType);
        }
        if self.summary != other.summary {
            changed.push(PaperField::Summary);
        }
        if self.abstract_text != other.abstract_text {
            changed.push(PaperField::Abstract);
        }
        if self.authors != other.authors {
            changed.push(PaperField::Authors);
        }
        if self.published != other.published {
            changed.push(PaperField::Published);
        }
        if self.explored != other.explored {
            changed.push(PaperField::Explored);
        }
        changed
    }
}

/// One research paper
#[derive(Debug, Clone, PartialEq)]
pub struct Paper {
    /// Store page identifier, absent until first write
    pub page_id: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub focus: Option<Focus>,
    pub attack_type: Option<AttackType>,
    pub summary: Option<String>,
    pub abstract_text: Option<String>,
    pub authors: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    pub explored: bool,

    track_changes: bool,
    baseline: PaperSnapshot,
}

fn arxiv_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d{4}\.\d{5}").expect("static arXiv id pattern"))
}

impl Paper {
    /// Paper discovered from a search or recommendation source.
    ///
    /// Untracked papers are always considered changed.
    pub fn discovered(fields: PaperSnapshot) -> Self {
        Self::build(None, fields, false)
    }

    /// Paper read from the store, with change tracking enabled.
    ///
    /// The baseline is captured before the author cap is applied so an
    /// over-long author list in the store is written back truncated.
    pub fn stored(page_id: impl Into<String>, fields: PaperSnapshot) -> Self {
        Self::build(Some(page_id.into()), fields, true)
    }

    fn build(page_id: Option<String>, fields: PaperSnapshot, track_changes: bool) -> Self {
        let baseline = fields.clone();
        let mut paper = Self {
            page_id,
            title: fields.title,
            url: fields.url,
            focus: fields.focus,
            attack_type: fields.attack_type,
            summary: fields.summary,
            abstract_text: fields.abstract_text,
            authors: fields.authors,
            published: fields.published,
            explored: fields.explored,
            track_changes,
            baseline,
        };
        paper.authors.truncate(MAX_AUTHORS);
        paper
    }

    /// Replace the author list, keeping at most [`MAX_AUTHORS`] in order
    pub fn set_authors(&mut self, authors: Vec<String>) {
        self.authors = authors;
        self.authors.truncate(MAX_AUTHORS);
    }

    /// Current values of every tracked field
    pub fn snapshot(&self) -> PaperSnapshot {
        PaperSnapshot {
            title: self.title.clone(),
            url: self.url.clone(),
            focus: self.focus,
            attack_type: self.attack_type,
            summary: self.summary.clone(),
            abstract_text: self.abstract_text.clone(),
            authors: self.authors.clone(),
            published: self.published,
            explored: self.explored,
        }
    }

    pub fn tracks_changes(&self) -> bool {
        self.track_changes
    }

    /// arXiv identifier embedded in the URL (`NNNN.NNNNN`)
    pub fn arxiv_id(&self) -> Option<&str> {
        let url = self.url.as_deref()?;
        arxiv_id_pattern().find(url).map(|m| m.as_str())
    }

    /// Whether title, url, authors and publication date are all present
    pub fn has_complete_identity(&self) -> bool {
        self.title.as_deref().is_some_and(|t| !t.is_empty())
            && self.url.as_deref().is_some_and(|u| !u.is_empty())
            && !self.authors.is_empty()
            && self.published.is_some()
    }

    /// Whether the paper must be written back to the store
    pub fn is_dirty(&self) -> bool {
        if !self.track_changes {
            return true;
        }
        self.baseline != self.snapshot()
    }

    /// Fields that differ from the baseline.
    ///
    /// Untracked papers report every field with a value.
    pub fn changed_fields(&self) -> Vec<PaperField> {
        if self.track_changes {
            return self.baseline.diff(&self.snapshot());
        }
        PaperSnapshot::default().diff(&self.snapshot())
    }

    /// Text used as labeling input: abstract, falling back to summary
    pub fn reference_text(&self) -> Option<&str> {
        self.abstract_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.summary.as_deref().filter(|t| !t.trim().is_empty()))
    }

    /// Title shortened for log lines
    pub fn short_title(&self, max_chars: usize) -> String {
        let title = self.title.as_deref().unwrap_or("<untitled>");
        if title.chars().count() <= max_chars {
            return title.to_string();
        }
        let mut short: String = title.chars().take(max_chars).collect();
        short.push_str("...");
        short
    }
}

//! arXiv query API client
//!
//! Results are requested page by page and read from the Atom feed with a
//! handful of tag patterns; only the fields a paper record needs are read.

use super::{PaperSearch, SortOrder};
use crate::config::SearchConfig;
use crate::errors::{AppError, Result};
use crate::models::{Paper, PaperSnapshot};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use chrono::{DateTime, Utc};
use regex_lite::{Captures, Regex};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// arXiv client
pub struct ArxivClient {
    client: reqwest::Client,
    base_url: String,
    page_size: usize,
    page_delay: Duration,
    retry_window: Duration,
}

/// One parsed feed page
#[derive(Debug, Default)]
struct FeedPage {
    total_results: Option<usize>,
    papers: Vec<Paper>,
}

struct FeedPatterns {
    entry: Regex,
    id: Regex,
    title: Regex,
    summary: Regex,
    published: Regex,
    author: Regex,
    total: Regex,
    entity: Regex,
}

fn patterns() -> &'static FeedPatterns {
    static PATTERNS: OnceLock<FeedPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let tag = |name: &str| {
            Regex::new(&format!(r"(?s)<{0}(?:\s[^>]*)?>(.*?)</{0}>", name)).expect("static feed pattern")
        };
        FeedPatterns {
            entry: tag("entry"),
            id: tag("id"),
            title: tag("title"),
            summary: tag("summary"),
            published: tag("published"),
            author: Regex::new(r"(?s)<author(?:\s[^>]*)?>\s*<name>(.*?)</name>").expect("static feed pattern"),
            total: tag("opensearch:totalResults"),
            entity: Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|lt|gt|quot|apos|amp);")
                .expect("static feed pattern"),
        }
    })
}

/// Decode named and numeric character references in one pass
fn unescape(text: &str) -> String {
    patterns()
        .entity
        .replace_all(text, |caps: &Captures| {
            let decoded = match &caps[1] {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                numeric => decode_numeric(numeric),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn decode_numeric(reference: &str) -> Option<char> {
    let code = match reference.strip_prefix("#x").or_else(|| reference.strip_prefix("#X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => reference.strip_prefix('#')?.parse().ok()?,
    };
    char::from_u32(code)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| collapse_whitespace(&unescape(m.as_str())))
        .filter(|s| !s.is_empty())
}

/// Parse an Atom feed page into papers
fn parse_feed(body: &str) -> Result<FeedPage> {
    let p = patterns();
    let total_results = capture(&p.total, body).and_then(|t| t.parse().ok());

    let mut papers = Vec::new();
    for entry in p.entry.captures_iter(body) {
        let Some(entry) = entry.get(1).map(|m| m.as_str()) else {
            continue;
        };

        let url = capture(&p.id, entry);
        if url.as_deref().is_some_and(|u| u.contains("arxiv.org/api/errors")) {
            return Err(AppError::Transport {
                message: capture(&p.summary, entry).unwrap_or_else(|| "arXiv API error".to_string()),
            });
        }

        let published = capture(&p.published, entry)
            .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
            .map(|d| d.with_timezone(&Utc));

        let authors = p
            .author
            .captures_iter(entry)
            .filter_map(|c| c.get(1))
            .map(|m| collapse_whitespace(&unescape(m.as_str())))
            .collect();

        papers.push(Paper::discovered(PaperSnapshot {
            title: capture(&p.title, entry),
            url,
            abstract_text: capture(&p.summary, entry),
            authors,
            published,
            ..Default::default()
        }));
    }

    Ok(FeedPage { total_results, papers })
}

impl ArxivClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("paperstack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.api_base.clone(),
            page_size: config.page_size.max(1),
            page_delay: Duration::from_millis(config.page_delay_ms),
            retry_window: Duration::from_secs(config.retry_window_secs),
        })
    }

    fn backoff_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_elapsed_time: Some(self.retry_window),
            ..Default::default()
        }
    }

    /// Fetch one feed page, retrying transient failures
    async fn fetch(&self, params: &[(&str, String)]) -> Result<FeedPage> {
        let body = retry(self.backoff_policy(), || async move {
            let response = self
                .client
                .get(&self.base_url)
                .query(params)
                .send()
                .await
                .map_err(|e| {
                    let err = AppError::from(e);
                    if err.is_transient() {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })?;

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                warn!(status = status.as_u16(), "arXiv request failed, retrying");
                return Err(backoff::Error::transient(AppError::Transport {
                    message: format!("arXiv API error {}", status),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(AppError::Transport {
                    message: format!("arXiv API error {}", status),
                }));
            }

            response
                .text()
                .await
                .map_err(|e| backoff::Error::transient(AppError::from(e)))
        })
        .await?;

        parse_feed(&body)
    }
}

#[async_trait]
impl PaperSearch for ArxivClient {
    async fn search(&self, query: &str, max_results: usize, sort: SortOrder) -> Result<Vec<Paper>> {
        let mut papers: Vec<Paper> = Vec::with_capacity(max_results.min(self.page_size));
        let mut start = 0;

        while papers.len() < max_results {
            if start > 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let size = self.page_size.min(max_results - papers.len());
            let params = [
                ("search_query", query.to_string()),
                ("start", start.to_string()),
                ("max_results", size.to_string()),
                ("sortBy", sort.as_str().to_string()),
                ("sortOrder", "descending".to_string()),
            ];
            let page = self.fetch(&params).await?;
            let total = page.total_results.unwrap_or(0);

            debug!(start, received = page.papers.len(), total, "arXiv page fetched");

            if page.papers.is_empty() {
                // The feed promised more results than it delivered
                if start < total {
                    return Err(AppError::EmptyPage {
                        query: query.to_string(),
                    });
                }
                break;
            }

            start += page.papers.len();
            papers.extend(page.papers);

            if start >= total {
                break;
            }
        }

        papers.truncate(max_results);
        Ok(papers)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Paper>> {
        let params = [("id_list", id.to_string()), ("max_results", "1".to_string())];
        let page = self.fetch(&params).await?;
        Ok(page.papers.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=all:jailbreak</title>
  <opensearch:totalResults xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">2</opensearch:totalResults>
  <entry>
    <id>http://arxiv.org/abs/2310.12345v1</id>
    <published>2023-10-18T17:59:01Z</published>
    <title>Jailbreaking Black Box Large Language Models
      in Twenty Queries</title>
    <summary>  There is growing interest in ensuring that LLMs align with
human values &amp; intent.
    </summary>
    <author><name>Patrick Chao</name></author>
    <author>
      <name>Alexander Robey</name>
    </author>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2401.00001v2</id>
    <published>2024-01-01T00:00:00Z</published>
    <title>Poisoning &lt;Web-Scale&gt; Datasets</title>
    <summary>Short.</summary>
    <author><name>A</name></author><author><name>B</name></author>
    <author><name>C</name></author><author><name>D</name></author>
    <author><name>E</name></author><author><name>F</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed() {
        let page = parse_feed(FEED).unwrap();
        assert_eq!(page.total_results, Some(2));
        assert_eq!(page.papers.len(), 2);

        let first = &page.papers[0];
        assert_eq!(
            first.title.as_deref(),
            Some("Jailbreaking Black Box Large Language Models in Twenty Queries")
        );
        assert_eq!(first.arxiv_id(), Some("2310.12345"));
        assert_eq!(
            first.abstract_text.as_deref(),
            Some("There is growing interest in ensuring that LLMs align with human values & intent.")
        );
        assert_eq!(first.authors, vec!["Patrick Chao", "Alexander Robey"]);
        assert_eq!(first.published.unwrap().to_rfc3339(), "2023-10-18T17:59:01+00:00");
        assert!(first.has_complete_identity());
        assert!(first.page_id.is_none());

        let second = &page.papers[1];
        assert_eq!(second.title.as_deref(), Some("Poisoning <Web-Scale> Datasets"));
        assert_eq!(second.authors.len(), 5);
    }

    #[test]
    fn test_numeric_references_in_title() {
        let body = r#"<feed><entry><id>http://arxiv.org/abs/2402.00001v1</id>
            <title>Red Teaming &#x2014; A Survey &#8212; Part&#39;s &amp;lt;One&amp;gt;</title>
            </entry></feed>"#;
        let page = parse_feed(body).unwrap();
        assert_eq!(
            page.papers[0].title.as_deref(),
            Some("Red Teaming \u{2014} A Survey \u{2014} Part's &lt;One&gt;")
        );

        // Invalid code points stay literal
        assert_eq!(unescape("&#xD800; &#65;"), "&#xD800; A");
    }

    #[test]
    fn test_parse_empty_feed() {
        let body = r#"<feed><opensearch:totalResults>0</opensearch:totalResults></feed>"#;
        let page = parse_feed(body).unwrap();
        assert_eq!(page.total_results, Some(0));
        assert!(page.papers.is_empty());
    }

    #[test]
    fn test_parse_error_feed() {
        let body = r#"<feed><entry><id>http://arxiv.org/api/errors#incorrect_id_format</id>
            <title>Error</title><summary>incorrect id format for 1234</summary></entry></feed>"#;
        let err = parse_feed(body).unwrap_err();
        assert!(matches!(err, AppError::Transport { .. }));
        assert!(err.to_string().contains("incorrect id format"));
    }
}

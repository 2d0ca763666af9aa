//! Notion database store
//!
//! Property names follow the catalog database layout: Title, URL, Summary,
//! Authors, Published, Focus, Attack Type, Explored. The abstract is not
//! stored.

use super::PaperStore;
use crate::config::StoreConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{Paper, PaperField, PaperSnapshot, MAX_AUTHORS};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info};

/// Notion caps rich text content at this many characters
const RICH_TEXT_LIMIT: usize = 2000;
const QUERY_PAGE_SIZE: u32 = 100;

/// Notion REST client
pub struct NotionStore {
    client: reqwest::Client,
    token: String,
    base_url: String,
    notion_version: String,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_cursor: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    results: Vec<NotionPage>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotionPage {
    id: String,
    #[serde(default)]
    properties: Map<String, Value>,
}

fn plain_text(value: Option<&Value>) -> Option<String> {
    let text: String = value?
        .as_array()?
        .iter()
        .filter_map(|t| t.get("plain_text").or_else(|| t.pointer("/text/content")))
        .filter_map(Value::as_str)
        .collect();
    (!text.is_empty()).then_some(text)
}

fn select_name(value: Option<&Value>) -> Option<&str> {
    value?.get("name")?.as_str()
}

fn parse_date(start: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(start) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Map a database page to a tracked paper.
///
/// Pages with neither a title nor a URL are skipped.
fn page_to_paper(page: NotionPage) -> Option<Paper> {
    let props = &page.properties;
    let prop = |name: &str, kind: &str| props.get(name).and_then(|p| p.get(kind));

    let title = plain_text(prop("Title", "title"));
    let url = prop("URL", "url").and_then(Value::as_str).map(str::to_string);
    if title.is_none() && url.is_none() {
        return None;
    }

    let authors = prop("Authors", "multi_select")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|o| o.get("name")?.as_str()).map(str::to_string).collect())
        .unwrap_or_default();

    let published = prop("Published", "date")
        .and_then(|d| d.get("start"))
        .and_then(Value::as_str)
        .and_then(parse_date);

    Some(Paper::stored(
        page.id,
        PaperSnapshot {
            title,
            url,
            focus: select_name(prop("Focus", "select")).and_then(|n| n.parse().ok()),
            attack_type: select_name(prop("Attack Type", "select")).and_then(|n| n.parse().ok()),
            summary: plain_text(prop("Summary", "rich_text")),
            abstract_text: None,
            authors,
            published,
            explored: prop("Explored", "checkbox").and_then(Value::as_bool).unwrap_or(false),
        },
    ))
}

fn rich_text(content: &str) -> Value {
    let content: String = content.chars().take(RICH_TEXT_LIMIT).collect();
    json!([{ "text": { "content": content } }])
}

/// Properties for the changed fields of a paper
fn paper_properties(paper: &Paper) -> Map<String, Value> {
    let mut props = Map::new();
    for field in paper.changed_fields() {
        match field {
            PaperField::Title => {
                if let Some(title) = &paper.title {
                    props.insert("Title".into(), json!({ "title": rich_text(title) }));
                }
            }
            PaperField::Url => {
                if let Some(url) = &paper.url {
                    props.insert("URL".into(), json!({ "url": url }));
                }
            }
            PaperField::Summary => {
                if let Some(summary) = &paper.summary {
                    props.insert("Summary".into(), json!({ "rich_text": rich_text(summary) }));
                }
            }
            PaperField::Authors => {
                if !paper.authors.is_empty() {
                    let names: Vec<Value> = paper
                        .authors
                        .iter()
                        .take(MAX_AUTHORS)
                        // Commas are not allowed in select option names
                        .map(|a| json!({ "name": a.replace(',', " ") }))
                        .collect();
                    props.insert("Authors".into(), json!({ "multi_select": names }));
                }
            }
            PaperField::Published => {
                if let Some(published) = &paper.published {
                    props.insert(
                        "Published".into(),
                        json!({ "date": { "start": published.to_rfc3339() } }),
                    );
                }
            }
            PaperField::Focus => {
                if let Some(focus) = paper.focus {
                    props.insert("Focus".into(), json!({ "select": { "name": focus.as_str() } }));
                }
            }
            PaperField::AttackType => {
                if let Some(attack_type) = paper.attack_type {
                    props.insert(
                        "Attack Type".into(),
                        json!({ "select": { "name": attack_type.as_str() } }),
                    );
                }
            }
            PaperField::Explored => {
                props.insert("Explored".into(), json!({ "checkbox": paper.explored }));
            }
            PaperField::Abstract => {}
        }
    }
    props
}

impl NotionStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let token = config.token.clone().ok_or_else(|| AppError::MissingField {
            field: "store.token".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            token,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            notion_version: config.notion_version.clone(),
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }

    /// Send a request and decode the JSON body, mapping every failure to a store error
    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        self.limiter.until_ready().await;

        let response = request
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.notion_version)
            .send()
            .await
            .map_err(|e| AppError::Store {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Store {
                message: format!("Notion API error {}: {}", status, body),
            });
        }

        response.json().await.map_err(|e| AppError::Store {
            message: format!("Failed to parse response: {}", e),
        })
    }
}

#[async_trait]
impl PaperStore for NotionStore {
    async fn fetch_all(&self, database_id: &str) -> Result<Vec<Paper>> {
        let url = format!("{}/databases/{}/query", self.base_url, database_id);
        let mut papers = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let body = QueryRequest {
                page_size: QUERY_PAGE_SIZE,
                start_cursor: cursor.as_deref(),
            };
            let page: QueryResponse = self.send(self.client.post(&url).json(&body)).await?;
            debug!(results = page.results.len(), has_more = page.has_more, "Notion query page");

            papers.extend(page.results.into_iter().filter_map(page_to_paper));

            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        metrics::record_store_fetch(papers.len());
        Ok(papers)
    }

    async fn upsert_batch(&self, database_id: &str, papers: &[Paper]) -> Result<()> {
        let mut created: u64 = 0;
        let mut updated: u64 = 0;

        for paper in papers {
            let properties = paper_properties(paper);

            match &paper.page_id {
                Some(page_id) => {
                    if properties.is_empty() {
                        debug!(page_id = %page_id, "No stored properties changed");
                        continue;
                    }
                    let url = format!("{}/pages/{}", self.base_url, page_id);
                    let _: Value = self
                        .send(self.client.patch(&url).json(&json!({ "properties": properties })))
                        .await?;
                    updated += 1;
                }
                None => {
                    let url = format!("{}/pages", self.base_url);
                    let body = json!({
                        "parent": { "database_id": database_id },
                        "properties": properties,
                    });
                    let _: Value = self.send(self.client.post(&url).json(&body)).await?;
                    created += 1;
                }
            }
        }

        metrics::record_store_write(created, updated);
        info!(created, updated, "Papers written to Notion");
        Ok(())
    }
}

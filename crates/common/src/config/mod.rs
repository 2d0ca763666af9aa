//! Configuration management for Paperstack
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Well-known credential variables (NOTION_TOKEN, OPENAI_API_TOKEN, ...)
//! - Default values

use crate::errors::{AppError, Result};
use chrono::{DateTime, TimeZone, Utc};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Default arXiv query used when none is configured or the operator asks for it
pub const DEFAULT_SEARCH_QUERY: &str = "\"adversarial attacks\" OR \"language model attacks\" OR \
\"LLM vulnerabilities\" OR \"AI security\" OR \"machine learning security\" OR \"jailbreak\" OR \
\"bypassing AI\"";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    /// Notion store configuration
    #[serde(default)]
    #[validate(nested)]
    pub store: StoreConfig,

    /// arXiv search configuration
    #[serde(default)]
    #[validate(nested)]
    pub search: SearchConfig,

    /// Semantic Scholar recommendation configuration
    #[serde(default)]
    #[validate(nested)]
    pub recommend: RecommendConfig,

    /// AI labeling backend configuration
    #[serde(default)]
    #[validate(nested)]
    pub labeling: LabelingConfig,

    /// Pipeline behavior
    #[serde(default)]
    #[validate(nested)]
    pub pipeline: PipelineConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StoreConfig {
    /// Notion integration token
    pub token: Option<String>,

    /// Notion database id, with or without dashes
    pub database_id: Option<String>,

    /// API base URL
    #[serde(default = "default_notion_api_base")]
    pub api_base: String,

    /// Notion-Version header value
    #[serde(default = "default_notion_version")]
    pub notion_version: String,

    /// Client-side request rate
    #[serde(default = "default_notion_rps")]
    #[validate(range(min = 1))]
    pub requests_per_second: u32,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SearchConfig {
    /// Search query for new papers
    #[serde(default = "default_search_query")]
    #[validate(length(min = 1))]
    pub query: String,

    /// Upper bound on results requested per search
    #[serde(default = "default_search_max_results")]
    #[validate(range(min = 1))]
    pub max_results: usize,

    /// API base URL
    #[serde(default = "default_arxiv_api_base")]
    pub api_base: String,

    /// Results requested per page
    #[serde(default = "default_search_page_size")]
    #[validate(range(min = 1, max = 2000))]
    pub page_size: usize,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Give up retrying transient failures after this many seconds
    #[serde(default = "default_retry_window")]
    pub retry_window_secs: u64,

    /// Pause between consecutive page requests, in milliseconds
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RecommendConfig {
    /// Fetch related papers for unexplored records
    #[serde(default)]
    pub enabled: bool,

    /// API base URL
    #[serde(default = "default_scholar_api_base")]
    pub api_base: String,

    /// Maximum recommended papers returned per run
    #[serde(default = "default_recommend_max_results")]
    #[validate(range(min = 1))]
    pub max_results: usize,

    /// Oldest publication year accepted
    #[serde(default = "default_recommend_min_year")]
    pub min_year: i32,

    /// Client-side request rate
    #[serde(default = "default_scholar_rps")]
    #[validate(range(min = 1))]
    pub requests_per_second: u32,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

/// Labeling backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelingProvider {
    #[default]
    OpenAi,
    Anthropic,
    Mock,
}

impl LabelingProvider {
    pub fn display_name(&self) -> &'static str {
        match self {
            LabelingProvider::OpenAi => "OpenAI",
            LabelingProvider::Anthropic => "Claude",
            LabelingProvider::Mock => "Mock",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LabelingConfig {
    /// Backend: openai, anthropic, mock
    #[serde(default)]
    pub provider: LabelingProvider,

    /// API key for the selected backend
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model used for summaries
    pub summary_model: Option<String>,

    /// Model used for focus and attack-type labels
    pub label_model: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(default = "default_max_retries")]
    #[validate(range(max = 10))]
    pub max_retries: u32,
}

/// What the enrichment scheduler does when one labeling call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelingErrorPolicy {
    /// Log, leave the field empty for that paper and continue
    #[default]
    Skip,
    /// Stop the run with the labeling error
    Abort,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct PipelineConfig {
    /// Maximum number of newly discovered papers added and enriched per run
    #[validate(range(min = 1))]
    pub max_new: Option<usize>,

    /// Search arXiv for new papers. Defaults to on for the Anthropic backend.
    pub search_enabled: Option<bool>,

    /// Papers published before this instant are treated as already explored
    #[serde(default = "default_explored_cutoff")]
    pub explored_cutoff: DateTime<Utc>,

    /// Labeling failure policy
    #[serde(default)]
    pub on_labeling_error: LabelingErrorPolicy,

    /// Ask the operator for a new query when a search comes back empty
    #[serde(default = "default_interactive")]
    pub interactive: bool,

    /// Replacement attempts allowed without an operator
    #[serde(default = "default_unattended_retries")]
    pub unattended_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or an EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logging: bool,
}

// Default value functions
fn default_notion_api_base() -> String { "https://api.notion.com/v1".to_string() }
fn default_notion_version() -> String { "2022-06-28".to_string() }
fn default_notion_rps() -> u32 { 3 }
fn default_request_timeout() -> u64 { 30 }
fn default_search_query() -> String { DEFAULT_SEARCH_QUERY.to_string() }
fn default_search_max_results() -> usize { 500 }
fn default_arxiv_api_base() -> String { "https://export.arxiv.org/api/query".to_string() }
fn default_search_page_size() -> usize { 100 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_window() -> u64 { 60 }
fn default_page_delay() -> u64 { 3000 }
fn default_scholar_api_base() -> String { "https://api.semanticscholar.org".to_string() }
fn default_recommend_max_results() -> usize { 10 }
fn default_recommend_min_year() -> i32 { 2018 }
fn default_scholar_rps() -> u32 { 1 }
fn default_explored_cutoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).single().unwrap_or_default()
}
fn default_interactive() -> bool { true }
fn default_unattended_retries() -> u32 { 1 }
fn default_log_level() -> String { "info".to_string() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            token: None,
            database_id: None,
            api_base: default_notion_api_base(),
            notion_version: default_notion_version(),
            requests_per_second: default_notion_rps(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query: default_search_query(),
            max_results: default_search_max_results(),
            api_base: default_arxiv_api_base(),
            page_size: default_search_page_size(),
            timeout_secs: default_request_timeout(),
            retry_window_secs: default_retry_window(),
            page_delay_ms: default_page_delay(),
        }
    }
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: default_scholar_api_base(),
            max_results: default_recommend_max_results(),
            min_year: default_recommend_min_year(),
            requests_per_second: default_scholar_rps(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            provider: LabelingProvider::default(),
            api_key: None,
            api_base: None,
            summary_model: None,
            label_model: None,
            timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_new: None,
            search_enabled: None,
            explored_cutoff: default_explored_cutoff(),
            on_labeling_error: LabelingErrorPolicy::default(),
            interactive: default_interactive(),
            unattended_retries: default_unattended_retries(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__PIPELINE__MAX_NEW=10
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        let mut config: AppConfig = config.try_deserialize()?;
        config.apply_env_fallbacks(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Fill unset credentials from the well-known bare variables
    pub fn apply_env_fallbacks<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.store.token.is_none() {
            self.store.token = non_empty("NOTION_TOKEN");
        }
        if self.store.database_id.is_none() {
            self.store.database_id = non_empty("NOTION_DATABASE_ID");
        }
        if self.labeling.api_key.is_none() {
            self.labeling.api_key = match self.labeling.provider {
                LabelingProvider::OpenAi => non_empty("OPENAI_API_TOKEN"),
                LabelingProvider::Anthropic => non_empty("CLAUDE_API_KEY"),
                LabelingProvider::Mock => None,
            };
        }
    }

    /// Check ranges and required credentials.
    ///
    /// Fails with the first missing setting named so the operator can fix it
    /// before any external call is made.
    pub fn validate_for_run(&self) -> Result<()> {
        self.validate().map_err(|e| AppError::Configuration {
            message: e.to_string(),
        })?;

        if self.store.database_id.as_deref().map_or(true, str::is_empty) {
            return Err(AppError::MissingField {
                field: "store.database_id (NOTION_DATABASE_ID)".to_string(),
            });
        }
        if self.store.token.as_deref().map_or(true, str::is_empty) {
            return Err(AppError::MissingField {
                field: "store.token (NOTION_TOKEN)".to_string(),
            });
        }
        if self.labeling.api_key.as_deref().map_or(true, str::is_empty) {
            match self.labeling.provider {
                LabelingProvider::OpenAi => {
                    return Err(AppError::MissingField {
                        field: "labeling.api_key (OPENAI_API_TOKEN)".to_string(),
                    })
                }
                LabelingProvider::Anthropic => {
                    return Err(AppError::MissingField {
                        field: "labeling.api_key (CLAUDE_API_KEY)".to_string(),
                    })
                }
                LabelingProvider::Mock => {}
            }
        }
        Ok(())
    }

    /// Database id in dashed UUID form
    pub fn database_id(&self) -> Option<String> {
        self.store.database_id.as_deref().map(format_notion_id)
    }

    /// Whether the arXiv search stage runs
    pub fn search_enabled(&self) -> bool {
        self.pipeline
            .search_enabled
            .unwrap_or(self.labeling.provider == LabelingProvider::Anthropic)
    }

    /// Number of results to request from arXiv.
    ///
    /// With a quota, twice the quota is requested to leave room for
    /// duplicates of existing papers.
    pub fn search_limit(&self) -> usize {
        match self.pipeline.max_new {
            Some(max_new) => self.search.max_results.min(max_new.saturating_mul(2)),
            None => self.search.max_results,
        }
    }
}

/// Format a Notion id into dashed UUID form.
///
/// Ids that are not 32 hex digits once dashes are removed are returned as-is.
pub fn format_notion_id(id: &str) -> String {
    let clean: String = id.trim().chars().filter(|c| *c != '-').collect();
    if clean.len() == 32 {
        if let Ok(uuid) = Uuid::try_parse(&clean) {
            return uuid.hyphenated().to_string();
        }
    }
    id.trim().to_string()
}

//! Paperstack Pipeline
//!
//! Reconciles a Notion paper catalog with arXiv:
//! 1. Reads stored papers and completes missing identities
//! 2. Searches arXiv (and optionally Semantic Scholar) for new papers
//! 3. Summarizes and labels papers under a new-paper quota
//! 4. Writes only changed papers back
//!
//! `paperstack search [query] [limit] [--sort relevance|submitted] [--authors] [--abstract]`
//! prints arXiv results and exits.

mod backfill;
mod driver;
mod errors;
mod merge;
mod retry_search;
mod scheduler;
#[cfg(test)]
mod testing;
mod writeback;

use anyhow::Context;
use driver::{Pipeline, PipelineSettings};
use errors::PipelineError;
use paperstack_common::config::{AppConfig, ObservabilityConfig};
use paperstack_common::labeling::create_labeler;
use paperstack_common::recommend::SemanticScholarClient;
use paperstack_common::search::{ArxivClient, SortOrder};
use paperstack_common::store::NotionStore;
use paperstack_common::{metrics, PaperSearch, VERSION};
use retry_search::{InteractivePrompt, QueryPrompt, UnattendedPolicy};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Results printed by the search subcommand when no limit is given
const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Authors listed per result before the rest are counted
const SHOWN_AUTHORS: usize = 3;

/// Abstract preview length in characters
const ABSTRACT_PREVIEW: usize = 200;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::from(1);
        }
    };

    init_tracing(&config.observability);
    metrics::register_metrics();

    info!("Starting Paperstack v{}", VERSION);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("search") => search_only(&config, &args[1..]).await,
        _ => run(config).await,
    }
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run the pipeline once; 0 on success, non-zero on fatal failure
async fn run(config: AppConfig) -> ExitCode {
    let pipeline = match build_pipeline(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::from(e.exit_code());
        }
    };

    match pipeline.run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Run failed");
            ExitCode::from(e.exit_code())
        }
    }
}

fn build_pipeline(config: &AppConfig) -> Result<Pipeline, PipelineError> {
    config.validate_for_run().map_err(PipelineError::Config)?;
    let settings = PipelineSettings::from_config(config)?;

    let store = Arc::new(NotionStore::new(&config.store).map_err(PipelineError::Config)?);
    let search = Arc::new(ArxivClient::new(&config.search).map_err(PipelineError::Config)?);
    let labeler = create_labeler(&config.labeling).map_err(PipelineError::Config)?;

    let prompt: Box<dyn QueryPrompt> = if config.pipeline.interactive {
        Box::new(InteractivePrompt::stdio())
    } else {
        Box::new(UnattendedPolicy::new(config.pipeline.unattended_retries))
    };

    info!(
        labeler = config.labeling.provider.display_name(),
        search_enabled = settings.search_enabled,
        search_limit = settings.search_limit,
        max_new = ?settings.max_new,
        recommend = config.recommend.enabled,
        interactive = config.pipeline.interactive,
        "Pipeline configured"
    );

    let mut pipeline = Pipeline::new(store, search, labeler, prompt, settings);
    if config.recommend.enabled {
        let recommender =
            SemanticScholarClient::new(&config.recommend).map_err(PipelineError::Config)?;
        pipeline = pipeline.with_recommender(Arc::new(recommender));
    }
    Ok(pipeline)
}

/// Print arXiv results for a query; exits 1 when nothing is found
async fn search_only(config: &AppConfig, args: &[String]) -> ExitCode {
    match print_search(config, args).await {
        Ok(0) => {
            warn!("No papers found");
            ExitCode::from(1)
        }
        Ok(count) => {
            info!(count, "Search complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Search failed");
            ExitCode::from(1)
        }
    }
}

/// Arguments of the search subcommand
#[derive(Debug, PartialEq, Eq)]
struct SearchArgs {
    query: Option<String>,
    limit: usize,
    sort: SortOrder,
    show_authors: bool,
    show_abstract: bool,
}

fn parse_search_args(args: &[String]) -> anyhow::Result<SearchArgs> {
    let mut parsed = SearchArgs {
        query: None,
        limit: DEFAULT_SEARCH_LIMIT,
        sort: SortOrder::SubmittedDate,
        show_authors: false,
        show_abstract: false,
    };
    let mut positional = 0;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--sort" => {
                let value = iter.next().context("--sort needs a value")?;
                parsed.sort = match value.as_str() {
                    "relevance" => SortOrder::Relevance,
                    "submitted" => SortOrder::SubmittedDate,
                    other => anyhow::bail!("unknown sort order '{}'", other),
                };
            }
            "--authors" => parsed.show_authors = true,
            "--abstract" => parsed.show_abstract = true,
            flag if flag.starts_with("--") => anyhow::bail!("unknown option '{}'", flag),
            value => {
                match positional {
                    0 => parsed.query = Some(value.to_string()),
                    1 => {
                        parsed.limit = value
                            .parse()
                            .with_context(|| format!("invalid result limit '{}'", value))?
                    }
                    _ => anyhow::bail!("unexpected argument '{}'", value),
                }
                positional += 1;
            }
        }
    }
    Ok(parsed)
}

async fn print_search(config: &AppConfig, args: &[String]) -> anyhow::Result<usize> {
    let args = parse_search_args(args)?;
    let query = args.query.unwrap_or_else(|| config.search.query.clone());

    let client = ArxivClient::new(&config.search)?;
    let papers = client.search(&query, args.limit, args.sort).await?;

    for (i, paper) in papers.iter().enumerate() {
        println!(
            "{}. {}\n   {}",
            i + 1,
            paper.title.as_deref().unwrap_or("<untitled>"),
            paper.url.as_deref().unwrap_or("-")
        );
        if args.show_authors && !paper.authors.is_empty() {
            println!("   Authors: {}", author_line(&paper.authors));
        }
        if args.show_abstract {
            if let Some(text) = paper.abstract_text.as_deref() {
                println!("   Abstract: {}", preview(text, ABSTRACT_PREVIEW));
            }
        }
    }
    Ok(papers.len())
}

fn author_line(authors: &[String]) -> String {
    let mut line = authors
        .iter()
        .take(SHOWN_AUTHORS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if authors.len() > SHOWN_AUTHORS {
        line.push_str(&format!(" (and {} others)", authors.len() - SHOWN_AUTHORS));
    }
    line
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_search_args_defaults() {
        let parsed = parse_search_args(&[]).unwrap();
        assert_eq!(parsed.query, None);
        assert_eq!(parsed.limit, DEFAULT_SEARCH_LIMIT);
        assert_eq!(parsed.sort, SortOrder::SubmittedDate);
        assert!(!parsed.show_authors && !parsed.show_abstract);
    }

    #[test]
    fn test_search_args_with_sort_and_details() {
        let parsed = parse_search_args(&args(&[
            "adversarial attacks",
            "5",
            "--sort",
            "relevance",
            "--authors",
            "--abstract",
        ]))
        .unwrap();
        assert_eq!(
            parsed,
            SearchArgs {
                query: Some("adversarial attacks".into()),
                limit: 5,
                sort: SortOrder::Relevance,
                show_authors: true,
                show_abstract: true,
            }
        );
    }

    #[test]
    fn test_search_args_rejects_bad_input() {
        assert!(parse_search_args(&args(&["q", "many"])).is_err());
        assert!(parse_search_args(&args(&["--sort", "newest"])).is_err());
        assert!(parse_search_args(&args(&["--sort"])).is_err());
        assert!(parse_search_args(&args(&["q", "5", "extra"])).is_err());
    }

    #[test]
    fn test_detail_formatting() {
        let authors = args(&["A", "B", "C", "D", "E"]);
        assert_eq!(author_line(&authors), "A, B, C (and 2 others)");
        assert_eq!(author_line(&authors[..2]), "A, B");
        assert_eq!(preview("short", 200), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
    }
}

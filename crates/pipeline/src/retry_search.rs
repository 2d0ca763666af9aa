//! Search with operator-driven recovery
//!
//! An empty result or a failed search never ends the run. The injected
//! [`QueryPrompt`] decides what happens next: a replacement query, the
//! default query, or skipping the search stage.

use async_trait::async_trait;
use paperstack_common::errors::AppError;
use paperstack_common::metrics::record_search;
use paperstack_common::search::SortOrder;
use paperstack_common::{Paper, PaperSearch};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info, instrument, warn};

/// Operator answer after a failed search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryReply {
    Query(String),
    UseDefault,
    Skip,
}

/// Why a search needs a replacement query
#[derive(Debug)]
pub enum SearchFailure {
    Empty,
    Error(AppError),
}

impl std::fmt::Display for SearchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchFailure::Empty => write!(f, "no results"),
            SearchFailure::Error(e) => write!(f, "{}: {}", e.kind(), e),
        }
    }
}

/// Source of replacement queries
#[async_trait]
pub trait QueryPrompt: Send {
    async fn next_query(&mut self, failed_query: &str, failure: &SearchFailure) -> QueryReply;
}

/// Prompt reading answers from a line-oriented reader
pub struct InteractivePrompt<R, W> {
    reader: R,
    writer: W,
}

impl InteractivePrompt<tokio::io::BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Prompt on the process terminal
    pub fn stdio() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> InteractivePrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    async fn ask(&mut self, message: &str) -> std::io::Result<Option<String>> {
        loop {
            self.writer.write_all(message.as_bytes()).await?;
            self.writer.flush().await?;

            let mut line = String::new();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            let answer = line.trim();
            if !answer.is_empty() {
                return Ok(Some(answer.to_string()));
            }
        }
    }
}

#[async_trait]
impl<R, W> QueryPrompt for InteractivePrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn next_query(&mut self, failed_query: &str, failure: &SearchFailure) -> QueryReply {
        let message = format!(
            "Search for '{}' failed ({}).\nEnter a new query, 'default' for the default query, or 'skip': ",
            failed_query, failure
        );

        match self.ask(&message).await {
            Ok(Some(answer)) if answer.eq_ignore_ascii_case("skip") => QueryReply::Skip,
            Ok(Some(answer)) if answer.eq_ignore_ascii_case("default") => QueryReply::UseDefault,
            Ok(Some(answer)) => QueryReply::Query(answer),
            Ok(None) => {
                warn!("Input closed, skipping search");
                QueryReply::Skip
            }
            Err(e) => {
                warn!(error = %e, "Prompt failed, skipping search");
                QueryReply::Skip
            }
        }
    }
}

/// Non-interactive recovery: retry with the default query a bounded number
/// of times, then skip
#[derive(Debug, Clone)]
pub struct UnattendedPolicy {
    retries: u32,
    used: u32,
}

impl UnattendedPolicy {
    pub fn new(retries: u32) -> Self {
        Self { retries, used: 0 }
    }
}

#[async_trait]
impl QueryPrompt for UnattendedPolicy {
    async fn next_query(&mut self, failed_query: &str, failure: &SearchFailure) -> QueryReply {
        if self.used < self.retries {
            self.used += 1;
            warn!(
                query = failed_query,
                failure = %failure,
                attempt = self.used,
                "Search failed, retrying with the default query"
            );
            QueryReply::UseDefault
        } else {
            warn!(query = failed_query, failure = %failure, "Search failed, skipping");
            QueryReply::Skip
        }
    }
}

/// States of one retrying search
#[derive(Debug)]
pub enum SearchState {
    Searching(String),
    EmptyResult(String),
    TransportError { query: String, error: AppError },
    AwaitingNewQuery { query: String, failure: SearchFailure },
    Done(Vec<Paper>),
    Skipped,
}

impl SearchState {
    /// Transition out of `TransportError`.
    ///
    /// A source reporting that no pages exist is an empty result, not a
    /// failure.
    fn after_error(query: String, error: AppError) -> SearchState {
        if error.is_empty_result() {
            info!(query = %query, kind = error.kind(), "Search source has no more pages");
            return SearchState::EmptyResult(query);
        }
        error!(
            query = %query,
            kind = error.kind(),
            error = %error,
            "Search failed"
        );
        SearchState::AwaitingNewQuery {
            query,
            failure: SearchFailure::Error(error),
        }
    }
}

/// Search source wrapped with operator recovery
pub struct RetryingSearch {
    search: Arc<dyn PaperSearch>,
    prompt: Box<dyn QueryPrompt>,
    default_query: String,
    sort: SortOrder,
}

impl RetryingSearch {
    pub fn new(
        search: Arc<dyn PaperSearch>,
        prompt: Box<dyn QueryPrompt>,
        default_query: impl Into<String>,
    ) -> Self {
        Self {
            search,
            prompt,
            default_query: default_query.into(),
            sort: SortOrder::SubmittedDate,
        }
    }

    /// Search until results arrive or the prompt answers skip.
    ///
    /// Returns an empty vector when skipped.
    #[instrument(skip(self))]
    pub async fn search(&mut self, query: &str, max_results: usize) -> Vec<Paper> {
        let mut state = SearchState::Searching(query.to_string());

        loop {
            state = match state {
                SearchState::Searching(query) => {
                    let start = Instant::now();
                    let outcome = self.search.search(&query, max_results, self.sort).await;
                    let elapsed = start.elapsed().as_secs_f64();

                    match outcome {
                        Ok(papers) if !papers.is_empty() => {
                            record_search(elapsed, "found");
                            SearchState::Done(papers)
                        }
                        Ok(_) => {
                            record_search(elapsed, "empty");
                            SearchState::EmptyResult(query)
                        }
                        Err(error) if error.is_empty_result() => {
                            record_search(elapsed, "empty");
                            SearchState::TransportError { query, error }
                        }
                        Err(error) => {
                            record_search(elapsed, "error");
                            SearchState::TransportError { query, error }
                        }
                    }
                }
                SearchState::EmptyResult(query) => {
                    warn!(query = %query, "Search returned no results");
                    SearchState::AwaitingNewQuery {
                        query,
                        failure: SearchFailure::Empty,
                    }
                }
                SearchState::TransportError { query, error } => {
                    SearchState::after_error(query, error)
                }
                SearchState::AwaitingNewQuery { query, failure } => {
                    match self.prompt.next_query(&query, &failure).await {
                        QueryReply::Query(next) => SearchState::Searching(next),
                        QueryReply::UseDefault => SearchState::Searching(self.default_query.clone()),
                        QueryReply::Skip => SearchState::Skipped,
                    }
                }
                SearchState::Done(papers) => {
                    info!(count = papers.len(), "Search complete");
                    return papers;
                }
                SearchState::Skipped => {
                    info!("Search skipped");
                    return Vec::new();
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{arxiv_paper, StaticSearch};
    use tokio::io::BufReader;

    /// Prompt replaying fixed answers
    struct ScriptedPrompt {
        replies: Vec<QueryReply>,
        asked: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl QueryPrompt for ScriptedPrompt {
        async fn next_query(&mut self, failed_query: &str, failure: &SearchFailure) -> QueryReply {
            self.asked
                .lock()
                .unwrap()
                .push(format!("{} | {}", failed_query, failure));
            self.replies.remove(0)
        }
    }

    fn scripted(replies: Vec<QueryReply>) -> (Box<dyn QueryPrompt>, Arc<std::sync::Mutex<Vec<String>>>) {
        let asked = Arc::new(std::sync::Mutex::new(Vec::new()));
        let prompt = ScriptedPrompt {
            replies,
            asked: asked.clone(),
        };
        (Box::new(prompt), asked)
    }

    #[tokio::test]
    async fn test_results_on_first_try() {
        let search = Arc::new(StaticSearch::with_responses(vec![Ok(vec![arxiv_paper(
            "C",
            "2410.00001",
        )])]));
        let (prompt, asked) = scripted(vec![]);
        let mut retrying = RetryingSearch::new(search.clone(), prompt, "fallback");

        let papers = retrying.search("llm attacks", 10).await;
        assert_eq!(papers.len(), 1);
        assert!(asked.lock().unwrap().is_empty());
        assert_eq!(search.queries(), vec!["llm attacks"]);
    }

    #[tokio::test]
    async fn test_empty_result_then_skip() {
        let search = Arc::new(StaticSearch::with_responses(vec![Ok(vec![])]));
        let (prompt, asked) = scripted(vec![QueryReply::Skip]);
        let mut retrying = RetryingSearch::new(search.clone(), prompt, "fallback");

        let papers = retrying.search("nothing matches", 10).await;
        assert!(papers.is_empty());
        assert_eq!(asked.lock().unwrap().as_slice(), ["nothing matches | no results"]);
        assert_eq!(search.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_page_error_then_new_query() {
        let search = Arc::new(StaticSearch::with_responses(vec![
            Err(AppError::EmptyPage {
                query: "first".into(),
            }),
            Ok(vec![arxiv_paper("Found", "2410.00002")]),
        ]));
        let (prompt, asked) = scripted(vec![QueryReply::Query("second".into())]);
        let mut retrying = RetryingSearch::new(search.clone(), prompt, "fallback");

        let papers = retrying.search("first", 10).await;
        assert_eq!(papers.len(), 1);
        assert_eq!(search.queries(), vec!["first", "second"]);
        assert_eq!(asked.lock().unwrap()[0], "first | no results");
    }

    #[test]
    fn test_empty_page_error_becomes_empty_result() {
        let next = SearchState::after_error(
            "first".into(),
            AppError::EmptyPage {
                query: "first".into(),
            },
        );
        assert!(matches!(next, SearchState::EmptyResult(ref q) if q == "first"));

        let next = SearchState::after_error(
            "first".into(),
            AppError::Transport {
                message: "connection reset".into(),
            },
        );
        assert!(matches!(
            next,
            SearchState::AwaitingNewQuery {
                failure: SearchFailure::Error(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_other_errors_are_reported_and_retried() {
        let search = Arc::new(StaticSearch::with_responses(vec![
            Err(AppError::Transport {
                message: "connection reset".into(),
            }),
            Ok(vec![arxiv_paper("Found", "2410.00003")]),
        ]));
        let (prompt, asked) = scripted(vec![QueryReply::UseDefault]);
        let mut retrying = RetryingSearch::new(search.clone(), prompt, "fallback");

        let papers = retrying.search("first", 10).await;
        assert_eq!(papers.len(), 1);
        assert_eq!(search.queries(), vec!["first", "fallback"]);

        let asked = asked.lock().unwrap();
        assert!(asked[0].contains("Transport"));
        assert!(asked[0].contains("connection reset"));
    }

    #[tokio::test]
    async fn test_unattended_policy_retries_default_then_skips() {
        let search = Arc::new(StaticSearch::with_responses(vec![Ok(vec![]), Ok(vec![])]));
        let mut retrying =
            RetryingSearch::new(search.clone(), Box::new(UnattendedPolicy::new(1)), "fallback");

        let papers = retrying.search("first", 10).await;
        assert!(papers.is_empty());
        assert_eq!(search.queries(), vec!["first", "fallback"]);
    }

    #[tokio::test]
    async fn test_unattended_policy_without_retries_skips() {
        let mut policy = UnattendedPolicy::new(0);
        let reply = policy.next_query("q", &SearchFailure::Empty).await;
        assert_eq!(reply, QueryReply::Skip);
    }

    #[tokio::test]
    async fn test_interactive_prompt_reads_answers() {
        let input = tokio_test::io::Builder::new()
            .read(b"\n")
            .read(b"  red teaming  \n")
            .read(b"DEFAULT\n")
            .read(b"skip\n")
            .build();
        let mut prompt = InteractivePrompt::new(BufReader::new(input), Vec::new());

        // Blank input is asked again
        let reply = prompt.next_query("q", &SearchFailure::Empty).await;
        assert_eq!(reply, QueryReply::Query("red teaming".into()));
        assert_eq!(prompt.next_query("q", &SearchFailure::Empty).await, QueryReply::UseDefault);
        assert_eq!(prompt.next_query("q", &SearchFailure::Empty).await, QueryReply::Skip);

        let output = String::from_utf8(prompt.writer.clone()).unwrap();
        assert_eq!(output.matches("Search for 'q' failed (no results)").count(), 4);
    }

    #[tokio::test]
    async fn test_interactive_prompt_skips_on_closed_input() {
        let input = tokio_test::io::Builder::new().build();
        let mut prompt = InteractivePrompt::new(BufReader::new(input), Vec::new());
        assert_eq!(prompt.next_query("q", &SearchFailure::Empty).await, QueryReply::Skip);
    }
}

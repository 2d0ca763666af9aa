//! AI labeling backends
//!
//! Provides a unified interface for the enrichment stages:
//! - Abstract summarization
//! - Focus labeling
//! - Attack-type labeling
//!
//! Two chat backends (OpenAI, Anthropic) share the prompt and parsing logic
//! through [`ChatLabeler`]; [`MockLabeler`] answers deterministically offline.

pub mod anthropic;
pub mod openai;
pub mod prompts;

use crate::config::{LabelingConfig, LabelingProvider};
use crate::errors::{AppError, Result};
use crate::models::{AttackType, Focus};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use anthropic::AnthropicChat;
pub use openai::OpenAiChat;

/// Trait for the three enrichment operations
#[async_trait]
pub trait Labeler: Send + Sync {
    /// Compress an abstract into one or two sentences
    async fn summarize(&self, text: &str) -> Result<String>;

    /// Assign a focus label
    async fn classify_focus(&self, text: &str) -> Result<Focus>;

    /// Assign an attack type
    async fn classify_attack_type(&self, text: &str) -> Result<AttackType>;

    /// Backend name for log lines
    fn name(&self) -> &str;
}

/// One chat completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub system: &'a str,
    pub user: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Raw chat completion transport
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String>;

    fn name(&self) -> &str;
}

/// Model selection for a chat backend
#[derive(Debug, Clone)]
pub struct ChatModels {
    pub summary: String,
    pub label: String,
}

/// Labeler built on a chat completion backend
pub struct ChatLabeler<C> {
    chat: C,
    models: ChatModels,
    focus_prompt: String,
    attack_type_prompt: String,
    max_retries: u32,
}

impl<C: ChatCompletion> ChatLabeler<C> {
    pub fn new(chat: C, models: ChatModels, max_retries: u32) -> Self {
        Self {
            chat,
            models,
            focus_prompt: prompts::focus_prompt(),
            attack_type_prompt: prompts::attack_type_prompt(),
            max_retries,
        }
    }

    /// Make request with retry on transient failures
    async fn complete_with_retry(&self, request: CompletionRequest<'_>) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.chat.complete(request.clone()).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        backend = self.chat.name(),
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Labeling request failed, retrying"
                    );
                    // Exponential backoff
                    let delay = Duration::from_millis(250 * 2_u64.pow(attempt));
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(AppError::Labeling {
                        message: format!("{} request failed: {}", self.chat.name(), e),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl<C: ChatCompletion> Labeler for ChatLabeler<C> {
    async fn summarize(&self, text: &str) -> Result<String> {
        let content = self
            .complete_with_retry(CompletionRequest {
                model: &self.models.summary,
                system: prompts::SUMMARIZE_PROMPT,
                user: text,
                max_tokens: 100,
                temperature: 0.5,
            })
            .await?;

        let summary = content.trim();
        if summary.is_empty() {
            return Err(AppError::Labeling {
                message: "empty summary returned".to_string(),
            });
        }
        Ok(summary.to_string())
    }

    async fn classify_focus(&self, text: &str) -> Result<Focus> {
        let content = self
            .complete_with_retry(CompletionRequest {
                model: &self.models.label,
                system: &self.focus_prompt,
                user: text,
                max_tokens: 10,
                temperature: 0.5,
            })
            .await?;

        content.parse().map_err(|_| AppError::Labeling {
            message: format!("invalid focus label: {}", content.trim()),
        })
    }

    async fn classify_attack_type(&self, text: &str) -> Result<AttackType> {
        let content = self
            .complete_with_retry(CompletionRequest {
                model: &self.models.label,
                system: &self.attack_type_prompt,
                user: text,
                max_tokens: 10,
                temperature: 0.5,
            })
            .await?;

        content.parse().map_err(|_| AppError::Labeling {
            message: format!("invalid attack type: {}", content.trim()),
        })
    }

    fn name(&self) -> &str {
        self.chat.name()
    }
}

/// Mock labeler for testing and dry runs
#[derive(Default)]
pub struct MockLabeler {
    fail_marker: Option<String>,
    calls: AtomicUsize,
}

impl MockLabeler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call whose input contains `marker`
    pub fn failing_on(marker: impl Into<String>) -> Self {
        Self {
            fail_marker: Some(marker.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of labeling calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, text: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_marker {
            Some(marker) if text.contains(marker.as_str()) => Err(AppError::Labeling {
                message: format!("mock failure for input containing '{}'", marker),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Labeler for MockLabeler {
    async fn summarize(&self, text: &str) -> Result<String> {
        self.record(text)?;
        let first = text.split(". ").next().unwrap_or(text).trim();
        Ok(format!("Summary: {}", first.chars().take(80).collect::<String>()))
    }

    async fn classify_focus(&self, text: &str) -> Result<Focus> {
        self.record(text)?;
        let lower = text.to_lowercase();
        let focus = if lower.contains("defen") || lower.contains("detect") {
            Focus::Defensive
        } else if lower.contains("attack") || lower.contains("jailbreak") {
            Focus::Offensive
        } else if lower.contains("adversarial") {
            Focus::Adversarial
        } else if lower.contains("safety") || lower.contains("alignment") {
            Focus::Safety
        } else {
            Focus::Other
        };
        Ok(focus)
    }

    async fn classify_attack_type(&self, text: &str) -> Result<AttackType> {
        self.record(text)?;
        let lower = text.to_lowercase();
        let attack_type = if lower.contains("injection") || lower.contains("jailbreak") {
            AttackType::PromptInjection
        } else if lower.contains("poison") || lower.contains("backdoor") {
            AttackType::Poisoning
        } else if lower.contains("extraction") || lower.contains("stealing") {
            AttackType::Extraction
        } else if lower.contains("inversion") || lower.contains("membership") {
            AttackType::Inversion
        } else if lower.contains("evasion") || lower.contains("adversarial example") {
            AttackType::Evasion
        } else {
            AttackType::Other
        };
        Ok(attack_type)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Create a labeler based on configuration
pub fn create_labeler(config: &LabelingConfig) -> Result<Arc<dyn Labeler>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let api_key = || {
        config.api_key.clone().ok_or_else(|| AppError::MissingField {
            field: "labeling.api_key".to_string(),
        })
    };

    match config.provider {
        LabelingProvider::OpenAi => {
            let chat = OpenAiChat::new(api_key()?, config.api_base.clone(), timeout)?;
            let models = ChatModels {
                summary: config
                    .summary_model
                    .clone()
                    .unwrap_or_else(|| openai::DEFAULT_SUMMARY_MODEL.to_string()),
                label: config
                    .label_model
                    .clone()
                    .unwrap_or_else(|| openai::DEFAULT_LABEL_MODEL.to_string()),
            };
            Ok(Arc::new(ChatLabeler::new(chat, models, config.max_retries)))
        }
        LabelingProvider::Anthropic => {
            let chat = AnthropicChat::new(api_key()?, config.api_base.clone(), timeout)?;
            let models = ChatModels {
                summary: config
                    .summary_model
                    .clone()
                    .unwrap_or_else(|| anthropic::DEFAULT_MODEL.to_string()),
                label: config
                    .label_model
                    .clone()
                    .unwrap_or_else(|| anthropic::DEFAULT_MODEL.to_string()),
            };
            Ok(Arc::new(ChatLabeler::new(chat, models, config.max_retries)))
        }
        LabelingProvider::Mock => Ok(Arc::new(MockLabeler::new())),
    }
}

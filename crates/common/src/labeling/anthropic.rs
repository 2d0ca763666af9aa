//! Anthropic messages backend

use super::{ChatCompletion, CompletionRequest};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic messages client
pub struct AnthropicChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicChat {
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

/// Concatenate the text blocks of a messages response
fn parse_response(body: &str) -> Result<String> {
    let response: MessagesResponse = serde_json::from_str(body)?;
    let text: String = response
        .content
        .into_iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text)
        .collect();

    if text.trim().is_empty() {
        return Err(AppError::Labeling {
            message: "Empty response".to_string(),
        });
    }
    Ok(text.trim().to_string())
}

#[async_trait]
impl ChatCompletion for AnthropicChat {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String> {
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));

        let body = MessagesRequest {
            model: request.model,
            system: request.system,
            messages: vec![Message { role: "user", content: request.user }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        // 529 is Anthropic's overloaded status
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(AppError::Transport {
                message: format!("Anthropic API error {}: {}", status, text),
            });
        }
        if !status.is_success() {
            return Err(AppError::Labeling {
                message: format!("Anthropic API error {}: {}", status, text),
            });
        }

        parse_response(&text)
    }

    fn name(&self) -> &str {
        "Claude"
    }
}

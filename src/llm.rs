//! Completion service
//!
//! The hosted generative model is an opaque, fallible text completer. The
//! `CompletionService` trait is the seam; `GeminiClient` talks to the
//! Generative Language `generateContent` endpoint.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sampling settings for one completion call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
}

impl GenerationConfig {
    pub const fn new(temperature: f32, max_output_tokens: u32, top_p: f32) -> Self {
        Self {
            temperature,
            max_output_tokens,
            top_p,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::new(0.7, 500, 0.95)
    }
}

/// Why the model stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    /// Hit the output token limit; text is usable but cut short
    Truncated,
    Safety,
    Other(String),
}

impl FinishReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::Truncated,
            "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" => FinishReason::Safety,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

/// A completion result
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub finish_reason: FinishReason,
}

impl Completion {
    pub fn new(text: impl Into<String>, finish_reason: FinishReason) -> Self {
        Self {
            text: text.into(),
            finish_reason,
        }
    }

    /// Candidate text, or an error when there is nothing usable
    pub fn into_text(self) -> Result<String> {
        if self.finish_reason == FinishReason::Truncated {
            tracing::warn!("[LLM] Completion truncated at max_output_tokens");
        }
        let text = self.text.trim();
        if text.is_empty() {
            return Err(anyhow!(
                "no usable candidate text (finish reason: {:?})",
                self.finish_reason
            ));
        }
        Ok(text.to_string())
    }
}

/// An external text-completion collaborator
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str, config: &GenerationConfig) -> Result<Completion>;
}

/// Run a completion with a deadline; a timeout is just another failure
pub async fn complete_with_timeout(
    service: &dyn CompletionService,
    prompt: &str,
    config: &GenerationConfig,
    timeout: std::time::Duration,
) -> Result<String> {
    tracing::debug!("[LLM] Prompt is {} chars", prompt.len());
    let completion = tokio::time::timeout(timeout, service.complete(prompt, config))
        .await
        .map_err(|_| anyhow!("completion timed out after {:?}", timeout))??;
    completion.into_text()
}

/// Client for the hosted Gemini models
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl CompletionService for GeminiClient {
    async fn complete(&self, prompt: &str, config: &GenerationConfig) -> Result<Completion> {
        if self.api_key.is_empty() {
            return Err(anyhow!("GOOGLE_API_KEY not set. Completion requires API access."));
        }

        let request_body = serde_json::json!({
            "contents": [
                { "role": "user", "parts": [ { "text": prompt } ] }
            ],
            "generationConfig": {
                "temperature": config.temperature,
                "maxOutputTokens": config.max_output_tokens,
                "topP": config.top_p,
            }
        });

        let api_response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .context("completion request failed")?;

        if !api_response.status().is_success() {
            let status = api_response.status();
            let error_text = api_response.text().await.unwrap_or_default();
            return Err(anyhow!("API error {}: {}", status, error_text));
        }

        let response_json: serde_json::Value = api_response.json().await?;
        parse_generate_response(&response_json)
    }
}

/// Pull the first candidate's text and finish reason out of a response body
pub fn parse_generate_response(body: &serde_json::Value) -> Result<Completion> {
    let candidate = body["candidates"]
        .get(0)
        .ok_or_else(|| anyhow!("no candidates in response"))?;

    let finish_reason = candidate["finishReason"]
        .as_str()
        .map(FinishReason::parse)
        .unwrap_or(FinishReason::Stop);

    let text = candidate["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default();

    tracing::debug!(
        "[LLM] Candidate {} chars, finish reason {:?}",
        text.len(),
        finish_reason
    );
    Ok(Completion::new(text, finish_reason))
}

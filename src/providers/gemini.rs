//! Gemini provider (Google Generative Language API).

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::providers::{ProviderError, ProviderErrorKind};
use crate::session::Message;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini API configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_output_tokens: u32,
}

impl GeminiConfig {
    /// Creates a new config from environment.
    ///
    /// Environment variables:
    /// - `GEMINI_API_KEY` (required)
    /// - `GEMINI_BASE_URL` (optional)
    pub fn from_env(
        model: String,
        max_output_tokens: u32,
        config_base_url: Option<&str>,
    ) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .context("GEMINI_API_KEY is not set. Set it to use Grace.")?;
        let base_url = resolve_base_url(config_base_url)?;

        Ok(Self {
            api_key,
            base_url,
            model,
            max_output_tokens,
        })
    }
}

/// Gemini client.
pub struct GeminiClient {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Posts the full message history and returns the generated reply text.
    ///
    /// A single request, no retry or backoff; retry is a caller-initiated
    /// re-send of the same history.
    pub async fn generate(&self, history: &[Message], system: Option<&str>) -> Result<String> {
        let request = build_request(history, system, self.config.max_output_tokens);
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        let response = self
            .http
            .post(&url)
            .headers(build_headers(&self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status(status.as_u16(), &error_body).into());
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::parse(format!("Failed to parse response JSON: {}", e)))?;

        extract_text(&body)
            .ok_or_else(|| ProviderError::parse("API response was empty or malformed").into())
    }
}

fn resolve_base_url(config_base_url: Option<&str>) -> Result<String> {
    if let Ok(env_url) = std::env::var("GEMINI_BASE_URL") {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.to_string());
        }
    }

    if let Some(config_url) = config_base_url {
        let trimmed = config_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.to_string());
        }
    }

    Ok(DEFAULT_BASE_URL.to_string())
}

fn validate_url(url: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid Gemini base URL: {}", url))?;
    Ok(())
}

fn build_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-goog-api-key",
        HeaderValue::from_str(api_key).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    headers.insert("accept", HeaderValue::from_static("application/json"));
    headers
}

fn classify_reqwest_error(e: reqwest::Error) -> anyhow::Error {
    if e.is_timeout() {
        ProviderError::timeout(format!("Request timed out: {}", e)).into()
    } else if e.is_connect() {
        ProviderError::timeout(format!("Connection failed: {}", e)).into()
    } else {
        ProviderError::new(
            ProviderErrorKind::HttpStatus,
            format!("Network error: {}", e),
        )
        .into()
    }
}

/// Builds the `generateContent` request body.
///
/// Wire shape: `{ contents: [{role, parts:[{text}]}], systemInstruction:
/// {role:"system", parts:[{text}]}, generationConfig: {maxOutputTokens} }`.
fn build_request(history: &[Message], system: Option<&str>, max_output_tokens: u32) -> Value {
    let contents: Vec<Value> = history
        .iter()
        .map(|msg| {
            let role = if msg.role == "user" { "user" } else { "model" };
            json!({
                "role": role,
                "parts": [{"text": msg.text}]
            })
        })
        .collect();

    let mut request = json!({
        "contents": contents,
    });

    if let Some(prompt) = system
        && !prompt.trim().is_empty()
    {
        request["systemInstruction"] = json!({
            "role": "system",
            "parts": [{"text": prompt}]
        });
    }

    if max_output_tokens > 0 {
        request["generationConfig"] = json!({
            "maxOutputTokens": max_output_tokens
        });
    }

    request
}

/// Extracts the generated text from `candidates[0].content.parts[*].text`.
///
/// Returns `None` when no candidate carries non-empty text.
fn extract_text(body: &Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let mut combined = String::new();
    for part in parts {
        if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
            combined.push_str(text);
        }
    }

    (!combined.is_empty()).then_some(combined)
}

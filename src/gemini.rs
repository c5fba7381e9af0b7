use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::generation::GenerationError;

const MODELS_PAGE_SIZE: u32 = 100;

/// Minimal client for the Generative Language REST API.
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    pub fn supports_generate_content(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == "generateContent")
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelsPage {
    #[serde(default)]
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

impl GeminiClient {
    pub fn new(api_base: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(GeminiClient {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.trim_start_matches("models/").to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Single-turn generation. Returns the concatenated text of the first candidate.
    pub async fn generate_content(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Fatal(format!("request to {} failed: {}", self.model, e)))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| GenerationError::Fatal(format!("reading response body: {}", e)))?;

        if !status.is_success() {
            return Err(classify_http_failure(status, &raw));
        }

        let parsed: GenerateResponse = serde_json::from_str(&raw)
            .map_err(|e| GenerationError::MalformedOutput(format!("response body: {}", e)))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::MalformedOutput(
                "model returned no text".to_string(),
            ));
        }
        debug!(model = %self.model, chars = text.len(), "generation complete");
        Ok(text)
    }

    /// Every model visible to the key, following pagination.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/models", self.api_base);
        let page_size = MODELS_PAGE_SIZE.to_string();
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("key", self.api_key.as_str()), ("pageSize", page_size.as_str())];
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.as_str()));
            }
            let response = self.http.get(&url).query(&query).send().await?;
            let status = response.status();
            if !status.is_success() {
                let raw = response.text().await.unwrap_or_default();
                bail!("HTTP {}: {}", status.as_u16(), api_error_message(&raw));
            }
            let page: ModelsPage = response.json().await.context("Failed to decode model list")?;
            models.extend(page.models);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(models)
    }
}

fn api_error_message(raw: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(raw)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| raw.chars().take(200).collect())
}

fn classify_http_failure(status: StatusCode, raw: &str) -> GenerationError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(raw).ok();
    let exhausted = envelope
        .as_ref()
        .and_then(|e| e.error.status.as_deref())
        .is_some_and(|s| s == "RESOURCE_EXHAUSTED");
    let message = envelope
        .map(|e| e.error.message)
        .unwrap_or_else(|| raw.chars().take(200).collect());

    if status == StatusCode::TOO_MANY_REQUESTS || exhausted {
        warn!(status = status.as_u16(), "generation rate limited");
        GenerationError::RateLimited(message)
    } else {
        GenerationError::Fatal(format!("HTTP {}: {}", status.as_u16(), message))
    }
}

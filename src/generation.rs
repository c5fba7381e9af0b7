use thiserror::Error;

use crate::gemini::GeminiClient;
use crate::scraper::PageScraper;
use crate::targets::Target;

/// Failure of one generation attempt, already sorted by retry policy.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("rate limited (429): {0}")]
    RateLimited(String),
    #[error("malformed model output: {0}")]
    MalformedOutput(String),
    #[error("{0}")]
    Fatal(String),
}

impl GenerationError {
    /// Sort an opaque error message using the markers the model SDKs emit:
    /// "429" for quota, "Expecting value"/"JSON" for parse trouble.
    pub fn classify_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("429") {
            GenerationError::RateLimited(message)
        } else if message.contains("Expecting value") || message.contains("JSON") {
            GenerationError::MalformedOutput(message)
        } else {
            GenerationError::Fatal(message)
        }
    }
}

/// Anything that can turn a target into raw model text.
pub trait Generator {
    async fn generate(&self, target: &Target) -> Result<String, GenerationError>;
}

pub fn build_instruction(target: &Target, question_count: u32) -> String {
    format!(
        r#"Read {url}.
Extract exactly {count} Technical/DSA MCQs.

CRITICAL INSTRUCTION:
Return ONLY a valid JSON list. Do NOT return URLs. Do NOT return "Repaired JSON".

Format:
[
    {{ "question": "...", "options": ["A", "B", "C", "D"], "answer": "..." }}
]"#,
        url = target.url,
        count = question_count,
    )
}

fn build_prompt(instruction: &str, page_text: &str) -> String {
    format!(
        "You are a technical recruiter. You extract technical questions from text \
         and format them as strict JSON.\n\n{}\n\n--- PAGE CONTENT ---\n{}",
        instruction, page_text
    )
}

/// A throttled page ("429") retries like a model rate limit. Only the error
/// detail is classified, with the URL masked out.
fn scrape_failure(url: &str, err: anyhow::Error) -> GenerationError {
    let detail = format!("{:#}", err).replace(url, "<page>");
    let message = format!("scrape {}: {}", url, detail);
    match GenerationError::classify_message(detail) {
        GenerationError::RateLimited(_) => GenerationError::RateLimited(message),
        _ => GenerationError::Fatal(message),
    }
}

/// Scrape the target page, then ask the model to turn it into questions.
pub struct ScrapeAndGenerate {
    scraper: PageScraper,
    gemini: GeminiClient,
    question_count: u32,
}

impl ScrapeAndGenerate {
    pub fn new(scraper: PageScraper, gemini: GeminiClient, question_count: u32) -> Self {
        ScrapeAndGenerate {
            scraper,
            gemini,
            question_count,
        }
    }
}

impl Generator for ScrapeAndGenerate {
    async fn generate(&self, target: &Target) -> Result<String, GenerationError> {
        let page = self
            .scraper
            .fetch_text(&target.url)
            .await
            .map_err(|e| scrape_failure(&target.url, e))?;
        let instruction = build_instruction(target, self.question_count);
        self.gemini
            .generate_content(&build_prompt(&instruction, &page))
            .await
    }
}

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use regex::Regex;
use ::scraper::{Html, Selector};
use tracing::info;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Fetches a page and reduces it to readable text for the model.
pub struct PageScraper {
    client: reqwest::Client,
    max_chars: usize,
}

impl PageScraper {
    pub fn new(timeout: Duration, max_chars: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(PageScraper { client, max_chars })
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let start = Instant::now();
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} fetching {}", status.as_u16(), url);
        }
        let html = response.text().await?;
        let text = truncate_chars(&html_to_text(&html), self.max_chars);
        info!(
            url,
            html_bytes = html.len(),
            text_chars = text.chars().count(),
            latency_ms = start.elapsed().as_millis() as u64,
            "scraped page"
        );
        if text.is_empty() {
            bail!("No readable text at {}", url);
        }
        Ok(text)
    }
}

/// Visible text of the document body, one text run per line.
pub fn html_to_text(html: &str) -> String {
    static BODY: OnceLock<Selector> = OnceLock::new();
    let body_sel = BODY.get_or_init(|| Selector::parse("body").unwrap());

    let doc = Html::parse_document(html);
    let root = match doc.select(body_sel).next() {
        Some(body) => body,
        None => doc.root_element(),
    };

    let runs: Vec<String> = root
        .descendants()
        .filter(|node| {
            !node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
            })
        })
        .filter_map(|node| node.value().as_text().map(|t| collapse_spaces(t)))
        .filter(|t| !t.is_empty())
        .collect();
    runs.join("\n")
}

fn collapse_spaces(s: &str) -> String {
    static WS: OnceLock<Regex> = OnceLock::new();
    let re = WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re.replace_all(s.trim(), " ").to_string()
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

mod config;
mod db;
mod extract;
mod gemini;
mod generation;
mod pacing;
mod pipeline;
mod retry;
mod scraper;
mod targets;
#[cfg(test)]
mod testing;

use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{key_preview, Settings};
use crate::db::PersistenceSink;
use crate::gemini::GeminiClient;
use crate::generation::ScrapeAndGenerate;
use crate::pacing::SpinnerSleeper;
use crate::pipeline::TargetLoop;
use crate::retry::RetryPolicy;
use crate::scraper::PageScraper;

#[derive(Parser)]
#[command(
    name = "mocktest_scraper",
    about = "Turn company interview-question pages into multiple-choice mock tests"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every target, generate questions and save them
    Run {
        /// Model to use instead of the configured one
        #[arg(short, long)]
        model: Option<String>,
        /// Only process this company (case-insensitive)
        #[arg(long)]
        only: Option<String>,
    },
    /// List models available to GOOGLE_API_KEY that support generateContent
    Models,
    /// Show stored question sets
    Records {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        /// Print full records as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;

    let result = match cli.command {
        Commands::Run { model, only } => run(&settings, model, only).await,
        Commands::Models => list_models(&settings).await,
        Commands::Records { limit, json } => show_records(&settings, limit, json),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run(settings: &Settings, model: Option<String>, only: Option<String>) -> anyhow::Result<()> {
    let api_key = settings.require_api_key()?;
    let model = model.unwrap_or_else(|| settings.model.clone());

    let scraper = PageScraper::new(settings.request_timeout(), settings.max_page_chars)?;
    let gemini = GeminiClient::new(&settings.api_base, api_key, &model, settings.request_timeout())?;
    info!(model = gemini.model(), strategy = ?settings.extract_strategy, "generation configured");
    let generator = ScrapeAndGenerate::new(scraper, gemini, settings.question_count);

    let sink = PersistenceSink::connect(settings.db_path.as_deref());
    let sleeper = SpinnerSleeper::new();

    let targets = targets::filter_by_company(targets::default_targets(), only.as_deref());
    if targets.is_empty() {
        println!("{}", no_match_message(only.as_deref()));
        return Ok(());
    }

    println!("Starting mock test scraper ({} targets)...", targets.len());
    let stats = TargetLoop::new(
        &generator,
        &sleeper,
        &sink,
        RetryPolicy::from_settings(settings),
        settings.target_pause(),
    )
    .run(&targets)
    .await;

    println!(
        "\nScraper finished: {}/{} targets succeeded.",
        stats.succeeded, stats.total
    );
    Ok(())
}

async fn list_models(settings: &Settings) -> anyhow::Result<()> {
    let Ok(api_key) = settings.require_api_key() else {
        println!("Error: GOOGLE_API_KEY not found in .env");
        return Ok(());
    };
    println!("Key found: {}", key_preview(api_key));

    let client = GeminiClient::new(
        &settings.api_base,
        api_key,
        &settings.model,
        settings.request_timeout(),
    )?;

    println!("\nAttempting to list models...");
    match client.list_models().await {
        Ok(models) => {
            for m in models.iter().filter(|m| m.supports_generate_content()) {
                match &m.display_name {
                    Some(display) => println!("FOUND MODEL: {} ({})", m.name, display),
                    None => println!("FOUND MODEL: {}", m.name),
                }
            }
        }
        Err(e) => println!("Error connecting to Google: {:#}", e),
    }
    Ok(())
}

fn show_records(settings: &Settings, limit: usize, json: bool) -> anyhow::Result<()> {
    let Some(path) = settings.db_path.as_deref() else {
        bail!("MOCKTEST_DB_PATH not set; nothing to show");
    };
    let store = db::SqliteStore::open(path).with_context(|| format!("Failed to open {}", path))?;
    let rows = store.fetch_all(limit)?;
    if rows.is_empty() {
        println!("No records yet. Run 'run' first.");
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "{:>3} | {:<12} | {:<26} | {:>4} | {:<19} | {}",
        "#", "Company", "Profile", "Qs", "Scraped at", "Source"
    );
    println!("{}", "-".repeat(110));
    for (i, r) in rows.iter().enumerate() {
        println!(
            "{:>3} | {:<12} | {:<26} | {:>4} | {:<19} | {}",
            i + 1,
            truncate(&r.company, 12),
            truncate(&r.profile, 26),
            r.questions.len(),
            r.scraped_at,
            truncate(&r.source, 40)
        );
    }
    println!("\n{} of {} records", rows.len(), store.count()?);
    Ok(())
}

fn no_match_message(only: Option<&str>) -> String {
    format!("No targets match {:?}.", only.unwrap_or_default().trim())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

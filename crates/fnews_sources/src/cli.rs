use clap::{Args, Subcommand};
use fnews_core::{Article, Result};

use crate::orchestrator::{CollectReport, FetchStatus, Orchestrator};

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Keyword, phrase or ticker to collect news for
    pub keyword: String,
    /// How many days back to look
    #[arg(short, long, default_value_t = 3)]
    pub days: u32,
    /// Print articles as JSON instead of one line each
    #[arg(long)]
    pub json: bool,
    /// Print the per-source run report after the articles
    #[arg(long)]
    pub report: bool,
}

#[derive(Subcommand, Debug)]
pub enum SourceCommands {
    /// Fetch, merge, score and store articles for a query
    Collect(CollectArgs),
    /// List the enabled sources
    Sources,
}

pub async fn handle_command(command: SourceCommands, orchestrator: &Orchestrator) -> Result<()> {
    match command {
        SourceCommands::Collect(args) => {
            let (articles, report) = orchestrator.collect_with_report(&args.keyword, args.days).await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&articles)?);
            } else {
                println!("Found {} articles", articles.len());
                for article in &articles {
                    println!("{}", format_article(article));
                }
            }
            if args.report {
                print_report(&report);
            }
        }
        SourceCommands::Sources => {
            println!("Enabled sources:");
            for adapter in orchestrator.adapters() {
                println!("  - {} ({})", adapter.name(), adapter.source_type());
            }
        }
    }
    Ok(())
}

pub fn format_article(article: &Article) -> String {
    let emoji = match article.sentiment.as_ref().map(|s| s.label) {
        Some(fnews_core::SentimentLabel::Positive) => "📈",
        Some(fnews_core::SentimentLabel::Negative) => "📉",
        Some(fnews_core::SentimentLabel::Neutral) => "➖",
        None => "❔",
    };
    format!(
        "{} {} [{}] {} - {}",
        emoji,
        article.published_date.format("%Y-%m-%d %H:%M"),
        article.sources.join(", "),
        article.title,
        article.url
    )
}

fn print_report(report: &CollectReport) {
    println!();
    for source in &report.per_source {
        let emoji = match source.status {
            FetchStatus::Completed => "✅",
            FetchStatus::Panicked => "💥",
            FetchStatus::Cancelled => "🚫",
            FetchStatus::TimedOut => "⏰",
        };
        println!("{} {}: {} records", emoji, source.name, source.fetched);
    }
    println!(
        "🧬 {} fetched, {} after merge, {} scored ({} unscored)",
        report.fetched, report.merged, report.sentiment_backfilled, report.sentiment_failed
    );
    println!(
        "💾 {} inserted, {} updated, {} failed in {} ms",
        report.inserted, report.updated, report.persist_failed, report.elapsed_ms
    );
}

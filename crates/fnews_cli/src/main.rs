use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use fnews_core::config::{AppConfig, SimilarityMetric};
use fnews_core::{ArticleQuery, Error, Result};
use fnews_sources::cli::{format_article, handle_command, SourceCommands};
use fnews_sources::logging::init_logging;
use fnews_sources::Orchestrator;
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(author, version, about = "Collects, merges and scores financial news", long_about = None)]
pub struct Cli {
    /// YAML configuration file. Built-in defaults are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Storage backend: memory or sqlite
    #[arg(long)]
    storage: Option<String>,
    /// Database file for the sqlite backend
    #[arg(long)]
    db: Option<PathBuf>,
    /// Sentiment model: lexicon or http
    #[arg(long)]
    model: Option<String>,
    /// Scoring service endpoint for the http model
    #[arg(long)]
    model_url: Option<String>,
    /// Title similarity (0-100) above which two records are the same story
    #[arg(long)]
    threshold: Option<u8>,
    /// Seconds two publish times may differ and still merge
    #[arg(long)]
    window: Option<u64>,
    /// Title similarity metric: ratio, token_sort or jaro_winkler
    #[arg(long, value_parser = parse_metric)]
    metric: Option<SimilarityMetric>,
    /// Enable a source that is disabled in the configuration (repeatable)
    #[arg(long = "enable", value_name = "SOURCE")]
    enable: Vec<String>,
    /// Log more (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(flatten)]
    Sources(SourceCommands),
    /// Look up previously stored articles
    Search(SearchArgs),
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Text to look for in title, summary and content
    text: Option<String>,
    #[arg(long)]
    source: Option<String>,
    #[arg(long)]
    symbol: Option<String>,
    /// Only articles published within this many days
    #[arg(short, long)]
    days: Option<u32>,
    #[arg(short, long, default_value_t = 20)]
    limit: usize,
    #[arg(long)]
    json: bool,
}

fn parse_metric(s: &str) -> std::result::Result<SimilarityMetric, String> {
    match s {
        "ratio" => Ok(SimilarityMetric::Ratio),
        "token_sort" => Ok(SimilarityMetric::TokenSort),
        "jaro_winkler" => Ok(SimilarityMetric::JaroWinkler),
        other => Err(format!("unknown metric {} (expected ratio, token_sort or jaro_winkler)", other)),
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let yaml = std::fs::read_to_string(path)?;
            AppConfig::from_yaml_str(&yaml)?
        }
        None => {
            let mut config = AppConfig::default();
            config.resolve_env();
            config
        }
    };

    if let Some(backend) = &cli.storage {
        config.storage.backend = backend.clone();
    }
    if let Some(path) = &cli.db {
        config.storage.path = Some(path.clone());
    }
    if let Some(model) = &cli.model {
        config.sentiment.model = model.clone();
    }
    if let Some(endpoint) = &cli.model_url {
        config.sentiment.endpoint = Some(endpoint.clone());
    }
    if let Some(threshold) = cli.threshold {
        config.dedup.title_similarity = threshold;
    }
    if let Some(window) = cli.window {
        config.dedup.time_window_secs = window;
    }
    if let Some(metric) = cli.metric {
        config.dedup.metric = metric;
    }
    for name in &cli.enable {
        let source = config
            .sources
            .iter_mut()
            .find(|s| &s.name == name)
            .ok_or_else(|| Error::Config(format!("No source named {}", name)))?;
        source.enabled = true;
    }

    config.validate()?;
    Ok(config)
}

async fn search(storage: &dyn fnews_core::ArticleStorage, args: SearchArgs) -> Result<()> {
    let query = ArticleQuery {
        text: args.text,
        source: args.source,
        symbol: args.symbol,
        published_from: args.days.map(|d| Utc::now() - Duration::days(i64::from(d))),
        published_to: None,
        limit: Some(args.limit),
    };
    let articles = storage.search(&query).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&articles)?);
    } else {
        println!("Found {} stored articles", articles.len());
        for article in &articles {
            println!("{}", format_article(article));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    init_logging(level);

    let config = load_config(&cli)?;
    let storage = fnews_storage::create_storage(&config.storage).await?;
    info!("✨ Storage initialized (using {})", config.storage.backend);

    match cli.command {
        Commands::Search(args) => search(storage.as_ref(), args).await,
        Commands::Sources(command) => {
            let sentiment = fnews_inference::create_model(&config.sentiment)?;
            info!("🧠 Sentiment model initialized (using {})", sentiment.name());
            let orchestrator = Orchestrator::from_config(&config, sentiment, storage)?;
            info!("🦗 Sources initialized: {}", orchestrator.adapter_names().join(", "));
            handle_command(command, &orchestrator).await
        }
    }
}

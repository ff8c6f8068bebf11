mod query_tokens;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comicmeta_core::{
    load_config, load_default_config, metrics, validate_config, CatalogClient, ComicVineClient,
    Config, IdentifyPipeline, JsonFileStateStore, RankedResult, RateLimiter, SanitizedConfig,
};

use query_tokens::parse_query;

/// Config file picked up from the working directory.
const DEFAULT_CONFIG_FILE: &str = "comicmeta.toml";

#[derive(Parser)]
#[command(name = "comicmeta")]
#[command(version, about = "Identify comic issues in the ComicVine catalog", long_about = None)]
struct Cli {
    /// Config file (defaults to $COMICMETA_CONFIG, then ./comicmeta.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print collected metrics after the command
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Find and rank issues matching the query tokens
    Identify {
        /// t:<title>, a:<author>, i:<kind>:<id>
        tokens: Vec<String>,

        /// Print only the best match
        #[arg(long)]
        best: bool,
    },
    /// Print cover URLs of the issue given as i:comicvine:<id>
    Covers {
        tokens: Vec<String>,

        /// Print only the best quality cover
        #[arg(long)]
        best: bool,
    },
    /// Print the effective configuration, API key redacted
    Config,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load(cli.config.as_deref())?;
    validate_config(&config).context("Configuration validation failed")?;

    match &cli.command {
        Command::Identify { tokens, best } => identify(&config, tokens, *best).await?,
        Command::Covers { tokens, best } => covers(&config, tokens, *best).await?,
        Command::Config => {
            let sanitized = SanitizedConfig::from(&config);
            println!("{}", serde_json::to_string_pretty(&sanitized)?);
        }
    }

    if cli.metrics {
        print!("{}", encode_metrics()?);
    }

    Ok(())
}

fn load(path: Option<&Path>) -> Result<Config> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("COMICMETA_CONFIG").map(PathBuf::from))
        .or_else(|| {
            let local = PathBuf::from(DEFAULT_CONFIG_FILE);
            local.exists().then_some(local)
        });

    match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))
        }
        None => {
            debug!("No config file, using defaults and environment");
            load_default_config().context("Failed to load default config")
        }
    }
}

fn build_pipeline(config: &Config) -> Result<IdentifyPipeline> {
    let interval = config.rate_limit.interval();
    let burst_size = config.rate_limit.burst_size;
    let limiter = match &config.rate_limit.state_path {
        Some(path) => {
            debug!("Rate limiter state at {:?}", path);
            RateLimiter::with_store(interval, burst_size, Arc::new(JsonFileStateStore::new(path)))
        }
        None => RateLimiter::new(interval, burst_size),
    };

    let catalog =
        ComicVineClient::new(&config.catalog).context("Failed to create ComicVine client")?;
    let client = CatalogClient::from_config(Arc::new(catalog), Arc::new(limiter), config);

    Ok(IdentifyPipeline::from_config(Arc::new(client), &config.identify))
}

async fn identify(config: &Config, tokens: &[String], best: bool) -> Result<()> {
    let query = parse_query(tokens)?;
    let pipeline = build_pipeline(config)?;

    let ranked = pipeline
        .identify_and_rank(&query)
        .await
        .context("Identify failed")?;

    if ranked.is_empty() {
        info!("No matching issues found");
        return Ok(());
    }

    let shown = if best { 1 } else { ranked.len() };
    for result in ranked.iter().take(shown) {
        println!("{}", format_result(result));
    }
    Ok(())
}

async fn covers(config: &Config, tokens: &[String], best: bool) -> Result<()> {
    let query = parse_query(tokens)?;
    if query.comicvine_id().is_none() {
        bail!("covers needs an i:comicvine:<id> token");
    }

    let pipeline = build_pipeline(config)?;
    let urls = pipeline
        .cover_urls(&query, best)
        .await
        .context("Cover lookup failed")?;

    if urls.is_empty() {
        info!("No covers found");
    }
    for url in urls {
        println!("{}", url);
    }
    Ok(())
}

fn format_result(result: &RankedResult) -> String {
    let record = &result.record;
    let date = record
        .pubdate
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    format!(
        "({:04}) - {}: {} [{}]",
        result.rank,
        record.comicvine_id().unwrap_or("?"),
        record.title,
        date
    )
}

fn encode_metrics() -> Result<String> {
    let registry = Registry::new();
    for metric in metrics::all_metrics() {
        registry.register(metric)?;
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use comicmeta_core::testing::fixtures;

    #[test]
    fn test_format_result() {
        let result = RankedResult {
            record: fixtures::record("Preacher Special", "1", Some(1996)),
            rank: 7,
        };
        assert_eq!(
            format_result(&result),
            "(0007) - 1: Preacher Special #1 [1996-01-01]"
        );

        let undated = RankedResult {
            record: fixtures::record("Preacher Special", "1", None),
            rank: 0,
        };
        assert!(format_result(&undated).ends_with("[Unknown]"));
    }

    #[test]
    fn test_cli_parses_identify() {
        let cli = Cli::try_parse_from([
            "comicmeta",
            "identify",
            "t:Preacher Special #1",
            "a:Garth Ennis",
            "--best",
        ])
        .unwrap();

        match cli.command {
            Command::Identify { tokens, best } => {
                assert_eq!(tokens, vec!["t:Preacher Special #1", "a:Garth Ennis"]);
                assert!(best);
            }
            _ => panic!("expected identify"),
        }
    }

    #[test]
    fn test_encode_metrics() {
        let text = encode_metrics().unwrap();
        assert!(text.contains("comicmeta_rate_limit_waits_total"));
    }
}

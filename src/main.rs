use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use glyphs_info_mcp::config::Config;
use glyphs_info_mcp::corpus::CorpusSource;
use glyphs_info_mcp::error::RetrievalError;
use glyphs_info_mcp::freshness::FreshnessManager;
use glyphs_info_mcp::mcp::server::{McpContext, McpServer};
use glyphs_info_mcp::mcp::tools::{handle_list, handle_lookup, handle_search};
use glyphs_info_mcp::upstream::UpstreamProbe;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "glyphs-info-mcp", version, about = "Glyphs handbook retrieval MCP server")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, global = true, default_value = "")]
    config: String,

    /// Release channel to serve (overrides the config file)
    #[arg(long, global = true)]
    channel: Option<String>,

    /// Cache root directory (overrides the config file)
    #[arg(long, global = true)]
    cache_root: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve MCP over stdio (default)
    Serve,
    /// Run one search and print the results as JSON
    Search {
        query: String,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Print one section as JSON
    Lookup { path: String, slug: String },
    /// List sections under a path prefix
    Sections {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Print cache status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the MCP protocol, logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // 1. Load config
    let mut config = Config::load(&cli.config)?;
    if let Some(channel) = cli.channel {
        config.channel = channel;
    }
    if let Some(cache_root) = cli.cache_root {
        config.cache_root = cache_root;
    }
    config.validate().context("Invalid configuration")?;
    let config = Arc::new(config);

    // 2. Load corpus and build the serving snapshot
    let source = CorpusSource::from_config(&config);
    let manager = tokio::task::spawn_blocking(move || FreshnessManager::bootstrap(source))
        .await
        .context("Corpus bootstrap task failed")?;
    let manager = Arc::new(manager);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(manager, config).await,
        Command::Search { query, limit } => {
            print_result(handle_search(&manager.snapshot(), &config, &query, limit))
        }
        Command::Lookup { path, slug } => {
            print_result(handle_lookup(&manager.snapshot(), &path, &slug))
        }
        Command::Sections { prefix } => print_result(handle_list(&manager.snapshot(), &prefix)),
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&manager.status())?);
            Ok(())
        }
    }
}

async fn serve(manager: Arc<FreshnessManager>, config: Arc<Config>) -> Result<()> {
    info!("Starting glyphs-info-mcp {}...", env!("CARGO_PKG_VERSION"));

    // 3. Start the freshness scheduler
    let shutdown = CancellationToken::new();
    if config.refresh_interval_secs > 0 {
        let probe = match config.upstream_manifest_url.as_deref() {
            Some(url) => match UpstreamProbe::new(url) {
                Ok(probe) => Some(probe),
                Err(e) => {
                    warn!("Upstream probe disabled: {e:#}");
                    None
                }
            },
            None => None,
        };
        tokio::spawn(manager.clone().run_scheduler(
            Duration::from_secs(config.refresh_interval_secs),
            probe,
            shutdown.clone(),
        ));
    }

    // 4. Start Server
    let server = McpServer::new(McpContext { manager, config });
    let result = server.start().await;
    shutdown.cancel();
    result
}

fn print_result(result: Result<Value, RetrievalError>) -> Result<()> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => bail!("{:?}: {e}", e.kind()),
    }
}

mod cli;
mod server;

use anirec::config::AppConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "anirec", version, about = "Anime catalog ingestion and semantic recommendations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Concurrently ingest an inclusive range of catalog pages
    Ingest {
        #[arg(long, default_value_t = 1)]
        start: u32,
        #[arg(long)]
        end: u32,
        #[arg(long, default_value_t = 50)]
        per_page: u32,
    },
    /// Ingest a single catalog page, embedding items one at a time
    IngestPage {
        #[arg(long)]
        page: u32,
        #[arg(long, default_value_t = 50)]
        per_page: u32,
    },
    /// Recommend stored anime for a free-text query
    Recommend {
        query: String,
        /// Number of results (defaults to retrieval.default_k)
        #[arg(short, long)]
        k: Option<usize>,
        /// Use the sqlite-vec index instead of the exhaustive scan
        #[arg(long)]
        indexed: bool,
    },
    /// Fetch one catalog page and print its titles
    Fetch {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        per_page: u32,
    },
    /// Run database diagnostics and print a health report
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load()?;

    // Log to stderr so command output on stdout stays clean.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve_http(config).await?,
        Command::Ingest {
            start,
            end,
            per_page,
        } => cli::ingest::ingest_range(config, start, end, per_page).await?,
        Command::IngestPage { page, per_page } => {
            cli::ingest::ingest_page(config, page, per_page).await?
        }
        Command::Recommend { query, k, indexed } => {
            cli::recommend::recommend(config, &query, k, indexed).await?
        }
        Command::Fetch { page, per_page } => cli::fetch::fetch(&config, page, per_page).await?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}

//! taskbunch: solve a list of integer pairs through bunched background tasks.
//!
//! Reads one `a b` pair per line (stdin by default), solves every pair and
//! prints one sum per line in input order.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::io::AsyncReadExt;

use taskbunch::input::{parse_pairs, write_results};
use taskbunch::logging::init_tracing;
use taskbunch::{
    BalancedBatches, BatchSizePolicy, BunchConfig, Dispatcher, FixedBatches, RetryPolicy,
    SumSolver,
};

/// Solve integer pairs through bunched background tasks
#[derive(Parser)]
#[command(name = "taskbunch")]
#[command(about = "Sum integer pairs using bunched background tasks", long_about = None)]
#[command(version)]
struct Cli {
    /// File with one `a b` pair per line (defaults to stdin)
    #[arg(long, short)]
    input: Option<PathBuf>,

    /// TOML file overriding delays and limits
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Fixed bunch size instead of balanced batches
    #[arg(long)]
    batch_size: Option<usize>,

    /// Give up after this many consecutive empty polls
    #[arg(long, default_value = "50")]
    max_attempts: u32,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// One result per line
    Text,
    /// A JSON array of results
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("taskbunch=info");
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => BunchConfig::from_file(path)?,
        None => BunchConfig::default(),
    };

    let text = match &cli.input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("failed to read stdin")?;
            text
        },
    };
    let pairs = parse_pairs(&text)?;

    let batches: Box<dyn BatchSizePolicy> = match cli.batch_size {
        Some(size) => Box::new(FixedBatches::new(size)),
        None => Box::new(BalancedBatches::new(
            config.min_bunch_size,
            config.max_bunch_size,
        )),
    };
    let policy = RetryPolicy::default().with_max_attempts(cli.max_attempts);

    let dispatcher = Dispatcher::new(SumSolver, config)?;
    let outcome = dispatcher
        .solve_all(pairs, batches.as_ref(), &policy)
        .await;
    dispatcher.shutdown().await;
    let results = outcome?;

    match cli.format {
        OutputFormat::Text => write_results(std::io::stdout().lock(), &results)?,
        OutputFormat::Json => println!("{}", serde_json::to_string(&results)?),
    }
    Ok(())
}

mod chunker;
mod config;
mod dataset;
mod error;
mod extract;
mod menu;
mod merge;
mod processor;
mod progress;
mod runner;
mod scrape;

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use config::Config;
use progress::{ProgressState, RunLock};
use scrape::HttpScraper;

#[derive(Parser)]
#[command(
    name = "contact_scraper",
    about = "Batch contact scraper: resumable, chunked email/phone extraction from spreadsheet URLs"
)]
struct Cli {
    /// Base directory holding input/ and output/
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Rows per chunk, applied when the dataset is first split
    #[arg(long, default_value_t = config::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Input column holding the website URL
    #[arg(long, default_value = config::DEFAULT_URL_COLUMN)]
    url_column: String,

    /// Seconds to pause between requests
    #[arg(long, default_value_t = config::DEFAULT_DELAY_SECS)]
    delay: u64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = config::DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Split the input dataset into chunks (also happens on first run)
    Init,
    /// Process the next batch of outstanding chunks
    Run {
        /// Chunks to process this session (default: all remaining)
        #[arg(short = 'n', long)]
        chunks: Option<usize>,
    },
    /// Show progress and statistics
    Status,
    /// Merge all completed results into a final timestamped file
    Merge,
    /// Clear chunks, results and progress so the input can be re-split
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Interactive menu (default when no subcommand is given)
    Menu,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config {
        base_dir: cli.base_dir.clone(),
        chunk_size: cli.chunk_size,
        url_column: cli.url_column.clone(),
        delay: Duration::from_secs(cli.delay),
        timeout: Duration::from_secs(cli.timeout),
    };
    runner::install_interrupt_handler();

    match cli.command.unwrap_or(Commands::Menu) {
        Commands::Init => {
            let _lock = RunLock::acquire(&cfg)?;
            let state = chunker::split_if_needed(&cfg)?;
            runner::report(&state);
        }
        Commands::Run { chunks } => {
            let _lock = RunLock::acquire(&cfg)?;
            let mut state = chunker::split_if_needed(&cfg)?;
            let scraper = HttpScraper::new(cfg.timeout, cfg.delay)?;
            let count = chunks.unwrap_or(usize::MAX);
            runner::run_batch(&cfg, &scraper, &mut state, count).await?;
        }
        Commands::Status => {
            if !ProgressState::exists(&cfg) {
                println!("No progress yet. Run 'init' or 'run' to split the input and start.");
            } else {
                let state = ProgressState::load(&cfg)?;
                runner::report(&state);
            }
        }
        Commands::Merge => {
            let _lock = RunLock::acquire(&cfg)?;
            if !ProgressState::exists(&cfg) {
                println!("No progress yet; nothing to merge.");
            } else {
                let state = ProgressState::load(&cfg)?;
                merge::merge(&cfg, &state)?;
                runner::report(&state);
            }
        }
        Commands::Reset { force } => {
            let _lock = RunLock::acquire(&cfg)?;
            reset(&cfg, force)?;
        }
        Commands::Menu => {
            let _lock = RunLock::acquire(&cfg)?;
            menu::run(&cfg).await?;
        }
    }
    Ok(())
}

/// Destructive: removes chunks, results and the progress file so the next
/// run re-splits the input. Final merged outputs are kept.
fn reset(cfg: &Config, force: bool) -> Result<()> {
    if !ProgressState::exists(cfg) && !cfg.chunks_dir().exists() {
        println!("Nothing to reset.");
        return Ok(());
    }
    if !force {
        print!(
            "This deletes all chunks, results and progress (final merged files are kept). \
             Type 'yes' to continue: "
        );
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        if line.trim() != "yes" {
            println!("Aborted.");
            return Ok(());
        }
    }
    for dir in [cfg.chunks_dir(), cfg.results_dir()] {
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
    }
    if cfg.progress_file().exists() {
        fs::remove_file(cfg.progress_file())?;
    }
    println!("State cleared. The next run will re-split the input.");
    Ok(())
}

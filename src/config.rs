use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

pub const DEFAULT_CHUNK_SIZE: usize = 50;
pub const DEFAULT_URL_COLUMN: &str = "WEBSITE";
pub const DEFAULT_DELAY_SECS: u64 = 2;
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Run configuration: where the data lives and how politely to scrape it.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_dir: PathBuf,
    /// Rows per chunk, fixed at split time.
    pub chunk_size: usize,
    /// Name of the input column holding the website URL.
    pub url_column: String,
    /// Pause between consecutive requests.
    pub delay: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Config {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            chunk_size: DEFAULT_CHUNK_SIZE,
            url_column: DEFAULT_URL_COLUMN.to_string(),
            delay: Duration::from_secs(DEFAULT_DELAY_SECS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.base_dir.join("input")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.base_dir.join("output")
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.output_dir().join("chunks")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.output_dir().join("results")
    }

    pub fn final_dir(&self) -> PathBuf {
        self.output_dir().join("final")
    }

    pub fn progress_file(&self) -> PathBuf {
        self.output_dir().join("progress.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.output_dir().join("progress.lock")
    }

    /// Chunk ids are zero-padded so lexical sort matches identifier order.
    pub fn chunk_file(&self, id: u32) -> PathBuf {
        self.chunks_dir().join(format!("chunk_{:03}.csv", id))
    }

    pub fn result_file(&self, id: u32) -> PathBuf {
        self.results_dir().join(format!("chunk_{:03}_contacts.csv", id))
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.input_dir(),
            self.output_dir(),
            self.chunks_dir(),
            self.results_dir(),
            self.final_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;
use crate::error::BatchError;
use crate::scrape::StatusKind;

/// Named counters, accumulated once per completed chunk.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_processed: u64,
    pub success: u64,
    pub no_contacts: u64,
    pub sites_unavailable: u64,
    /// Rows with at least one email / phone.
    pub emails_found: u64,
    pub phones_found: u64,
    pub empty_url: u64,
    pub timeout: u64,
    pub connection_error: u64,
    pub http_error: u64,
    pub parse_error: u64,
}

impl Stats {
    pub fn record(&mut self, status: &StatusKind, emails: usize, phones: usize) {
        self.total_processed += 1;
        if emails > 0 {
            self.emails_found += 1;
        }
        if phones > 0 {
            self.phones_found += 1;
        }
        if status.site_unavailable() {
            self.sites_unavailable += 1;
        }
        match status {
            StatusKind::Success => self.success += 1,
            StatusKind::NoContactsFound => self.no_contacts += 1,
            StatusKind::EmptyUrl => self.empty_url += 1,
            StatusKind::Timeout => self.timeout += 1,
            StatusKind::ConnectionError => self.connection_error += 1,
            StatusKind::HttpError(_) => self.http_error += 1,
            StatusKind::ParseError => self.parse_error += 1,
        }
    }

    pub fn add(&mut self, other: &Stats) {
        self.total_processed += other.total_processed;
        self.success += other.success;
        self.no_contacts += other.no_contacts;
        self.sites_unavailable += other.sites_unavailable;
        self.emails_found += other.emails_found;
        self.phones_found += other.phones_found;
        self.empty_url += other.empty_url;
        self.timeout += other.timeout;
        self.connection_error += other.connection_error;
        self.http_error += other.http_error;
        self.parse_error += other.parse_error;
    }

    /// Rows where the site could not be scraped at all.
    pub fn failed(&self) -> u64 {
        self.timeout + self.connection_error + self.http_error + self.parse_error
    }
}

/// Durable record of the split geometry, the completed set, and statistics.
/// Single source of truth for resumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressState {
    pub total_chunks: u32,
    pub chunk_size: usize,
    #[serde(default)]
    pub completed_chunks: BTreeSet<u32>,
    #[serde(default)]
    pub last_run: Option<String>,
    #[serde(default)]
    pub stats: Stats,
    /// Per-chunk counters; the aggregate above is always their sum, which
    /// lets reconciliation subtract a chunk whose result file disappeared.
    #[serde(default)]
    pub chunk_stats: BTreeMap<u32, Stats>,
}

impl ProgressState {
    pub fn new(total_chunks: u32, chunk_size: usize) -> Self {
        Self {
            total_chunks,
            chunk_size,
            completed_chunks: BTreeSet::new(),
            last_run: None,
            stats: Stats::default(),
            chunk_stats: BTreeMap::new(),
        }
    }

    pub fn exists(cfg: &Config) -> bool {
        cfg.progress_file().exists()
    }

    /// Load and reconcile: a chunk counts as completed only while its result
    /// file is present and readable with data.
    pub fn load(cfg: &Config) -> Result<ProgressState> {
        let path = cfg.progress_file();
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut state: ProgressState =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        state.reconcile(cfg);
        Ok(state)
    }

    fn reconcile(&mut self, cfg: &Config) {
        let stale: Vec<u32> = self
            .completed_chunks
            .iter()
            .copied()
            .filter(|id| !result_file_ok(&cfg.result_file(*id)))
            .collect();
        if stale.is_empty() {
            return;
        }
        warn!(
            "result file missing or unreadable for chunk(s) {:?}; they will be reprocessed",
            stale
        );
        for id in stale {
            self.completed_chunks.remove(&id);
            self.chunk_stats.remove(&id);
        }
        self.stats = self.chunk_stats.values().fold(Stats::default(), |mut acc, s| {
            acc.add(s);
            acc
        });
    }

    /// Record a finished chunk. Callers must have written its result file
    /// before this, and must persist the state right after.
    pub fn mark_complete(&mut self, id: u32, chunk: Stats) {
        self.stats.add(&chunk);
        self.chunk_stats.insert(id, chunk);
        self.completed_chunks.insert(id);
    }

    /// Outstanding chunk identifiers, ascending.
    pub fn remaining(&self) -> Vec<u32> {
        (1..=self.total_chunks)
            .filter(|id| !self.completed_chunks.contains(id))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_chunks.len() as u32 == self.total_chunks
    }

    /// Atomic replace: write a temp file, then rename. The progress file is
    /// never left half-written.
    pub fn save(&mut self, cfg: &Config) -> Result<()> {
        self.last_run = Some(Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
        let path = cfg.progress_file();
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

/// True when the file exists and holds at least one data row.
pub fn result_file_ok(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    match csv::Reader::from_path(path) {
        Ok(mut rdr) => matches!(rdr.records().next(), Some(Ok(_))),
        Err(_) => false,
    }
}

// ── Run lock ──

/// Lock file beside the progress store, held for the whole command. A second
/// instance fails with `AlreadyRunning` instead of corrupting state.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(cfg: &Config) -> Result<RunLock> {
        fs::create_dir_all(cfg.output_dir())?;
        let path = cfg.lock_file();
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                Ok(RunLock { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(BatchError::AlreadyRunning(path).into())
            }
            Err(e) => Err(e).with_context(|| format!("creating lock {}", path.display())),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config(dir: &Path) -> Config {
        let mut cfg = Config::new(dir.to_path_buf());
        cfg.delay = Duration::ZERO;
        cfg
    }

    fn one_success() -> Stats {
        let mut s = Stats::default();
        s.record(&StatusKind::Success, 1, 1);
        s
    }

    #[test]
    fn record_tallies_by_kind() {
        let mut s = Stats::default();
        s.record(&StatusKind::Success, 2, 1);
        s.record(&StatusKind::NoContactsFound, 0, 0);
        s.record(&StatusKind::Timeout, 0, 0);
        s.record(&StatusKind::HttpError(404), 0, 0);
        s.record(&StatusKind::EmptyUrl, 0, 0);
        assert_eq!(s.total_processed, 5);
        assert_eq!(s.success, 1);
        assert_eq!(s.no_contacts, 1);
        assert_eq!(s.emails_found, 1);
        assert_eq!(s.phones_found, 1);
        assert_eq!(s.sites_unavailable, 2);
        assert_eq!(s.failed(), 2);
        assert_eq!(s.empty_url, 1);
    }

    #[test]
    fn save_is_atomic_and_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        cfg.ensure_dirs().unwrap();
        let mut state = ProgressState::new(4, 50);
        state.save(&cfg).unwrap();
        assert!(cfg.progress_file().exists());
        assert!(!cfg.progress_file().with_extension("json.tmp").exists());

        let loaded = ProgressState::load(&cfg).unwrap();
        assert_eq!(loaded.total_chunks, 4);
        assert_eq!(loaded.chunk_size, 50);
        assert!(loaded.completed_chunks.is_empty());
        assert!(loaded.last_run.is_some());
    }

    #[test]
    fn reconcile_drops_chunks_without_result_files() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        cfg.ensure_dirs().unwrap();
        // Chunk 1 has a real result file; chunk 2 claims completion without one.
        fs::write(cfg.result_file(1), "A,Emails,Phones,Status\nx,,,Success\n").unwrap();
        let mut state = ProgressState::new(2, 50);
        state.mark_complete(1, one_success());
        state.mark_complete(2, one_success());
        state.save(&cfg).unwrap();

        let loaded = ProgressState::load(&cfg).unwrap();
        assert_eq!(loaded.completed_chunks.iter().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(loaded.stats.total_processed, 1);
        assert_eq!(loaded.remaining(), vec![2]);
    }

    #[test]
    fn result_file_check_requires_data() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.csv");
        assert!(!result_file_ok(&missing));

        let header_only = dir.path().join("header.csv");
        fs::write(&header_only, "A,B\n").unwrap();
        assert!(!result_file_ok(&header_only));

        let with_data = dir.path().join("data.csv");
        fs::write(&with_data, "A,B\n1,2\n").unwrap();
        assert!(result_file_ok(&with_data));
    }

    #[test]
    fn lock_is_exclusive_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let lock = RunLock::acquire(&cfg).unwrap();
        let second = RunLock::acquire(&cfg);
        assert!(matches!(
            second.unwrap_err().downcast_ref::<BatchError>(),
            Some(BatchError::AlreadyRunning(_))
        ));
        drop(lock);
        let third = RunLock::acquire(&cfg);
        assert!(third.is_ok());
    }
}

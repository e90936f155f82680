use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::dataset::{self, Table};
use crate::progress::ProgressState;

/// One-time split: runs only when no progress file exists yet. Re-splitting
/// conflicts with resumption keyed by chunk id, so an existing state always
/// wins (clear it with `reset` first).
pub fn split_if_needed(cfg: &Config) -> Result<ProgressState> {
    if ProgressState::exists(cfg) {
        return ProgressState::load(cfg);
    }
    split(cfg)
}

/// Partition the input into `ceil(N/S)` contiguous, order-preserving chunk
/// files and initialize the progress store.
pub fn split(cfg: &Config) -> Result<ProgressState> {
    anyhow::ensure!(cfg.chunk_size > 0, "chunk size must be at least 1");
    let table = dataset::read_input(cfg)?;
    cfg.ensure_dirs()?;

    let total = table.len().div_ceil(cfg.chunk_size) as u32;
    info!(
        "splitting {} rows into {} chunks of up to {}",
        table.len(),
        total,
        cfg.chunk_size
    );

    for (i, rows) in table.rows.chunks(cfg.chunk_size).enumerate() {
        let id = i as u32 + 1;
        let chunk = Table {
            headers: table.headers.clone(),
            rows: rows.to_vec(),
        };
        chunk.write(&cfg.chunk_file(id))?;
    }

    let mut state = ProgressState::new(total, cfg.chunk_size);
    state.save(cfg)?;
    println!(
        "Created {} chunk(s) of up to {} rows in {}",
        total,
        cfg.chunk_size,
        cfg.chunks_dir().display()
    );
    Ok(state)
}

// ── Tests ──

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::error::BatchError;

/// An in-memory CSV table: one header row plus string data rows.
/// Rows are padded to header width on read so downstream writes stay regular.
#[derive(Debug, Clone)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn read(path: &Path) -> Result<Table> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let width = headers.len();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record.with_context(|| format!("reading {}", path.display()))?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            if row.len() < width {
                row.resize(width, String::new());
            }
            rows.push(row);
        }
        Ok(Table { headers, rows })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("creating {}", path.display()))?;
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Exact-match column lookup against the trimmed header names.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Locate the input dataset: lexicographically first .csv in input/.
pub fn find_input(cfg: &Config) -> Result<PathBuf> {
    let dir = cfg.input_dir();
    let mut files: Vec<PathBuf> = match fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    if files.len() > 1 {
        info!(
            "{} csv files in {}, using the first",
            files.len(),
            dir.display()
        );
    }
    files
        .into_iter()
        .next()
        .ok_or_else(|| BatchError::InputMissing(dir).into())
}

/// Read the input dataset and validate the required URL column.
pub fn read_input(cfg: &Config) -> Result<Table> {
    let path = find_input(cfg)?;
    info!("reading input {}", path.display());
    let table = Table::read(&path)?;
    if table.column_index(&cfg.url_column).is_none() {
        return Err(BatchError::ColumnMissing {
            column: cfg.url_column.clone(),
            available: table.headers.join(", "),
        }
        .into());
    }
    Ok(table)
}

// ── Tests ──

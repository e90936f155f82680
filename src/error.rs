use std::path::PathBuf;

use thiserror::Error;

/// Operator-facing failures. Everything row-level is a status, not an error
/// (see `scrape::StatusKind`); only setup and merge preconditions halt a
/// command.
#[derive(Debug, Error)]
pub enum BatchError {
    /// No input dataset was found where one is required.
    #[error("no input .csv file found in {}; place the dataset there and rerun", .0.display())]
    InputMissing(PathBuf),

    /// The configured URL column is absent from the input header.
    #[error("column {column:?} not found in input (available: {available})")]
    ColumnMissing { column: String, available: String },

    /// Merge requested while chunks are still outstanding.
    #[error("cannot merge: {} chunk(s) not yet processed: {}", .missing.len(), id_list(.missing))]
    IncompleteBatch { missing: Vec<u32> },

    /// A second instance would corrupt the progress store.
    #[error("another run holds the lock at {}; if no other instance is active, remove the file and retry", .0.display())]
    AlreadyRunning(PathBuf),
}

pub(crate) fn id_list(ids: &[u32]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Tests ──

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Local;

use crate::config::Config;
use crate::dataset::Table;
use crate::error::BatchError;
use crate::progress::ProgressState;

/// Concatenate every chunk's result file, ascending by identifier, under a
/// single header row. Callable only once all chunks are complete; the output
/// name is timestamped so repeated merges never overwrite a prior file.
pub fn merge(cfg: &Config, state: &ProgressState) -> Result<PathBuf> {
    let missing = state.remaining();
    if !missing.is_empty() {
        return Err(BatchError::IncompleteBatch { missing }.into());
    }
    if state.total_chunks == 0 {
        bail!("nothing to merge: the dataset split into zero chunks");
    }

    fs::create_dir_all(cfg.final_dir())?;
    let out_path = final_path(cfg);
    let tmp = out_path.with_extension("csv.tmp");

    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(&tmp)
        .with_context(|| format!("creating {}", tmp.display()))?;
    let mut header_written = false;
    let mut rows = 0usize;
    for id in 1..=state.total_chunks {
        let table = Table::read(&cfg.result_file(id))
            .with_context(|| format!("reading result for chunk {:03}", id))?;
        if !header_written {
            wtr.write_record(&table.headers)?;
            header_written = true;
        }
        for row in &table.rows {
            wtr.write_record(row)?;
        }
        rows += table.len();
    }
    wtr.flush()?;
    drop(wtr);
    fs::rename(&tmp, &out_path)
        .with_context(|| format!("finalizing {}", out_path.display()))?;

    println!(
        "Merged {} chunk(s), {} rows -> {}",
        state.total_chunks,
        rows,
        out_path.display()
    );
    Ok(out_path)
}

/// Timestamped output name, suffixed when a merge lands twice in one second.
fn final_path(cfg: &Config) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let base = cfg.final_dir().join(format!("contacts_final_{}.csv", stamp));
    if !base.exists() {
        return base;
    }
    let mut n = 1;
    loop {
        let candidate = cfg
            .final_dir()
            .join(format!("contacts_final_{}_{}.csv", stamp, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Stats;
    use std::path::Path;
    use std::time::Duration;

    fn test_config(dir: &Path) -> Config {
        let mut cfg = Config::new(dir.to_path_buf());
        cfg.delay = Duration::ZERO;
        cfg
    }

    fn write_result(cfg: &Config, id: u32, names: &[&str]) {
        let mut body = String::from("NAME,Emails,Phones,Status\n");
        for n in names {
            body.push_str(&format!("{},a@b.co,,Success\n", n));
        }
        fs::write(cfg.result_file(id), body).unwrap();
    }

    #[test]
    fn incomplete_batch_lists_missing_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        cfg.ensure_dirs().unwrap();
        write_result(&cfg, 1, &["a"]);

        let mut state = ProgressState::new(10, 50);
        state.mark_complete(1, Stats::default());
        for id in 3..=9 {
            write_result(&cfg, id, &["x"]);
            state.mark_complete(id, Stats::default());
        }

        let err = merge(&cfg, &state).unwrap_err();
        match err.downcast_ref::<BatchError>() {
            Some(BatchError::IncompleteBatch { missing }) => {
                assert_eq!(missing, &vec![2, 10]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let written: Vec<_> = fs::read_dir(cfg.final_dir())
            .map(|rd| rd.filter_map(|e| e.ok()).collect())
            .unwrap_or_default();
        assert!(written.is_empty());
    }

    #[test]
    fn merges_in_identifier_order_with_one_header() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        cfg.ensure_dirs().unwrap();
        write_result(&cfg, 1, &["a", "b"]);
        write_result(&cfg, 2, &["c", "d"]);
        write_result(&cfg, 3, &["e"]);

        let mut state = ProgressState::new(3, 2);
        for id in 1..=3 {
            state.mark_complete(id, Stats::default());
        }

        let out = merge(&cfg, &state).unwrap();
        let table = Table::read(&out).unwrap();
        assert_eq!(table.headers, vec!["NAME", "Emails", "Phones", "Status"]);
        let names: Vec<&str> = table.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
        assert!(!out.with_extension("csv.tmp").exists());
    }

    #[test]
    fn repeated_merges_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        cfg.ensure_dirs().unwrap();
        write_result(&cfg, 1, &["a"]);
        let mut state = ProgressState::new(1, 50);
        state.mark_complete(1, Stats::default());

        let first = merge(&cfg, &state).unwrap();
        let second = merge(&cfg, &state).unwrap();
        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
    }
}

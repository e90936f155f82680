use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::Config;
use crate::dataset::Table;
use crate::progress::{ProgressState, Stats};
use crate::runner::interrupted;
use crate::scrape::{Scrape, ScrapeOutcome, StatusKind};

/// Columns appended to the original row schema in every result file.
pub const RESULT_COLUMNS: [&str; 3] = ["Emails", "Phones", "Status"];

/// Process one chunk to completion: scrape every row, write the result file,
/// then mark the chunk complete and persist progress, in that order. A crash
/// between the two writes re-runs the chunk instead of losing it.
///
/// Returns false when an interrupt abandoned the chunk before completion;
/// nothing is persisted in that case and the chunk re-runs from its first
/// row next time.
pub async fn process_chunk<S: Scrape>(
    cfg: &Config,
    scraper: &S,
    state: &mut ProgressState,
    id: u32,
) -> Result<bool> {
    let chunk = Table::read(&cfg.chunk_file(id))
        .with_context(|| format!("reading chunk {:03}", id))?;
    let url_col = chunk
        .column_index(&cfg.url_column)
        .ok_or_else(|| anyhow!("chunk {:03} lacks the {:?} column", id, cfg.url_column))?;

    let total_rows = chunk.len();
    let pb = ProgressBar::new(total_rows as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut headers = chunk.headers.clone();
    headers.extend(RESULT_COLUMNS.iter().map(|c| c.to_string()));

    let mut out_rows = Vec::with_capacity(total_rows);
    let mut stats = Stats::default();

    for (i, row) in chunk.rows.iter().enumerate() {
        if interrupted() {
            pb.finish_and_clear();
            warn!("interrupt: abandoning chunk {:03} before completion", id);
            return Ok(false);
        }

        let url = row.get(url_col).map(|s| s.trim()).unwrap_or("");
        let outcome = if url.is_empty() {
            ScrapeOutcome::empty_url()
        } else {
            pb.set_message(truncate(url, 40));
            scraper.scrape(url).await
        };

        stats.record(&outcome.status, outcome.emails.len(), outcome.phones.len());
        let mut out = row.clone();
        out.push(outcome.emails.join("; "));
        out.push(outcome.phones.join("; "));
        out.push(outcome.status.label());
        out_rows.push(out);
        pb.inc(1);

        // Politeness pause, skipped after the last row and after rows that
        // made no request.
        if i + 1 < total_rows && outcome.status != StatusKind::EmptyUrl {
            tokio::time::sleep(cfg.delay).await;
        }
    }
    pb.finish_and_clear();

    // Result file first, then the progress record.
    let result = Table {
        headers,
        rows: out_rows,
    };
    result.write(&cfg.result_file(id))?;
    state.mark_complete(id, stats);
    state.save(cfg)?;
    info!("chunk {:03} complete ({} rows)", id, total_rows);
    Ok(true)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

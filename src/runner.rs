use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tracing::warn;

use crate::config::Config;
use crate::processor;
use crate::progress::ProgressState;
use crate::scrape::Scrape;

/// Set by the Ctrl-C handler, polled between rows and chunks. Requests in
/// flight are never cut short; the per-request timeout bounds them.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

pub fn install_interrupt_handler() {
    let result = ctrlc::set_handler(|| {
        INTERRUPTED.store(true, Ordering::SeqCst);
        eprintln!("\nInterrupt received; finishing the current row, then stopping.");
    });
    if let Err(e) = result {
        warn!("could not install interrupt handler: {}", e);
    }
}

/// Next chunks to run: the lowest outstanding identifiers, ascending,
/// clamped to what remains. Over-requesting is never an error.
pub fn next_chunks(state: &ProgressState, count: usize) -> Vec<u32> {
    state.remaining().into_iter().take(count).collect()
}

/// Process up to `count` chunks sequentially, reporting before and after.
/// Chunks completed before an interrupt stay completed.
pub async fn run_batch<S: Scrape>(
    cfg: &Config,
    scraper: &S,
    state: &mut ProgressState,
    count: usize,
) -> Result<()> {
    report(state);
    let queue = next_chunks(state, count);
    if queue.is_empty() {
        if state.total_chunks > 0 && state.is_complete() {
            println!("All {} chunk(s) already processed.", state.total_chunks);
        }
        return Ok(());
    }

    println!("\nProcessing {} chunk(s)...", queue.len());
    let mut done = 0usize;
    for (i, id) in queue.iter().enumerate() {
        if interrupted() {
            break;
        }
        println!(
            "[{}/{}] chunk {:03} of {:03}",
            i + 1,
            queue.len(),
            id,
            state.total_chunks
        );
        if !processor::process_chunk(cfg, scraper, state, *id).await? {
            break;
        }
        done += 1;
    }
    if interrupted() {
        println!(
            "\nStopped early: {} of {} chunk(s) finished before the interrupt.",
            done,
            queue.len()
        );
    }
    report(state);
    Ok(())
}

/// Status summary computed purely from the progress record; no result file
/// is ever re-read for reporting.
pub fn report(state: &ProgressState) {
    let done = state.completed_chunks.len();
    let total = state.total_chunks as usize;

    println!("\n{}", "=".repeat(70));
    println!("BATCH CONTACT SCRAPER");
    println!("{}", "=".repeat(70));
    println!(
        "Chunks: {} total (up to {} rows each) | {} completed | {} remaining",
        total,
        state.chunk_size,
        done,
        total.saturating_sub(done)
    );

    let s = &state.stats;
    if s.total_processed > 0 {
        let t = s.total_processed;
        println!("\nRows processed: {}", t);
        println!("  Contacts found:    {:>6} ({:.1}%)", s.success, pct(s.success, t));
        println!("  No contacts found: {:>6} ({:.1}%)", s.no_contacts, pct(s.no_contacts, t));
        println!("  Rows with emails:  {:>6}", s.emails_found);
        println!("  Rows with phones:  {:>6}", s.phones_found);
        println!(
            "  Sites unavailable: {:>6} ({:.1}%)",
            s.sites_unavailable,
            pct(s.sites_unavailable, t)
        );
        let breakdown: [(&str, u64); 5] = [
            ("timeout", s.timeout),
            ("connection error", s.connection_error),
            ("http error", s.http_error),
            ("parse error", s.parse_error),
            ("empty url", s.empty_url),
        ];
        if breakdown.iter().any(|(_, n)| *n > 0) {
            println!("\nFailure breakdown:");
            for (label, n) in breakdown {
                if n > 0 {
                    println!("  {:<17} {:>6}", label, n);
                }
            }
        }
    }
    if let Some(last) = &state.last_run {
        println!("\nLast run: {}", last);
    }
    println!("{}", "=".repeat(70));
}

fn pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker;
    use crate::dataset::Table;
    use crate::merge;
    use crate::processor::RESULT_COLUMNS;
    use crate::progress::Stats;
    use crate::scrape::{ScrapeOutcome, StatusKind};
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    struct StubScraper;

    impl Scrape for StubScraper {
        async fn scrape(&self, _url: &str) -> ScrapeOutcome {
            ScrapeOutcome {
                emails: vec!["info@example.com".into()],
                phones: vec!["+33123456789".into()],
                status: StatusKind::Success,
            }
        }
    }

    /// Classifies by URL so row-failure containment can be exercised.
    struct FlakyScraper;

    impl Scrape for FlakyScraper {
        async fn scrape(&self, url: &str) -> ScrapeOutcome {
            if url.contains("down") {
                ScrapeOutcome {
                    emails: Vec::new(),
                    phones: Vec::new(),
                    status: StatusKind::Timeout,
                }
            } else {
                ScrapeOutcome {
                    emails: vec!["ok@example.com".into()],
                    phones: Vec::new(),
                    status: StatusKind::Success,
                }
            }
        }
    }

    fn test_config(dir: &Path) -> Config {
        let mut cfg = Config::new(dir.to_path_buf());
        cfg.chunk_size = 2;
        cfg.delay = Duration::ZERO;
        cfg
    }

    fn seeded(dir: &Path, rows: usize) -> (Config, ProgressState) {
        let cfg = test_config(dir);
        fs::create_dir_all(cfg.input_dir()).unwrap();
        let mut body = String::from("NAME,WEBSITE\n");
        for i in 0..rows {
            body.push_str(&format!("hotel{},site{}.example\n", i, i));
        }
        fs::write(cfg.input_dir().join("hotels.csv"), body).unwrap();
        let state = chunker::split(&cfg).unwrap();
        (cfg, state)
    }

    #[test]
    fn next_chunks_picks_lowest_outstanding() {
        let mut state = ProgressState::new(5, 2);
        state.mark_complete(1, Stats::default());
        state.mark_complete(3, Stats::default());
        assert_eq!(next_chunks(&state, 2), vec![2, 4]);
        assert_eq!(next_chunks(&state, 10), vec![2, 4, 5]);
        assert_eq!(next_chunks(&state, 0), Vec::<u32>::new());
    }

    #[tokio::test]
    async fn end_to_end_five_rows_chunk_size_two() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut state) = seeded(dir.path(), 5);
        assert_eq!(state.total_chunks, 3);

        // Over-request: clamped to the 3 remaining chunks.
        run_batch(&cfg, &StubScraper, &mut state, 10).await.unwrap();
        assert!(state.is_complete());
        assert_eq!(state.stats.total_processed, 5);
        assert_eq!(state.stats.success, 5);
        assert_eq!(state.stats.emails_found, 5);

        let out = merge::merge(&cfg, &state).unwrap();
        let table = Table::read(&out).unwrap();
        assert_eq!(table.len(), 5);
        assert_eq!(table.headers.len(), 2 + RESULT_COLUMNS.len());
        let names: Vec<&str> = table.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["hotel0", "hotel1", "hotel2", "hotel3", "hotel4"]);
        assert!(table.rows.iter().all(|r| r[4] == "Success"));
    }

    #[tokio::test]
    async fn zero_chunk_batch_changes_no_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, _) = seeded(dir.path(), 5);

        let before = fs::read(cfg.progress_file()).unwrap();
        let mut state = ProgressState::load(&cfg).unwrap();
        run_batch(&cfg, &StubScraper, &mut state, 0).await.unwrap();
        let after = fs::read(cfg.progress_file()).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn resumes_with_exactly_the_unfinished_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut state) = seeded(dir.path(), 5);
        run_batch(&cfg, &StubScraper, &mut state, 1).await.unwrap();
        assert_eq!(state.completed_chunks.len(), 1);

        // Fresh process: reload from disk and ask for everything.
        let first_result = fs::read_to_string(cfg.result_file(1)).unwrap();
        let mut resumed = ProgressState::load(&cfg).unwrap();
        assert_eq!(next_chunks(&resumed, usize::MAX), vec![2, 3]);
        run_batch(&cfg, &StubScraper, &mut resumed, usize::MAX)
            .await
            .unwrap();
        assert!(resumed.is_complete());
        // Chunk 1 was never re-touched.
        assert_eq!(fs::read_to_string(cfg.result_file(1)).unwrap(), first_result);
    }

    #[tokio::test]
    async fn crash_after_result_write_reprocesses_that_chunk_only() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut state) = seeded(dir.path(), 5);
        run_batch(&cfg, &StubScraper, &mut state, 1).await.unwrap();
        let first_result = fs::read_to_string(cfg.result_file(1)).unwrap();

        // Simulate a crash after the result file landed but before the
        // progress persist: roll the progress record back.
        let mut rolled = ProgressState::load(&cfg).unwrap();
        rolled.completed_chunks.remove(&1);
        rolled.chunk_stats.remove(&1);
        rolled.stats = Stats::default();
        rolled.save(&cfg).unwrap();

        let mut resumed = ProgressState::load(&cfg).unwrap();
        assert_eq!(next_chunks(&resumed, 1), vec![1]);
        run_batch(&cfg, &StubScraper, &mut resumed, usize::MAX)
            .await
            .unwrap();
        assert!(resumed.is_complete());
        assert_eq!(resumed.stats.total_processed, 5);
        // Deterministic stub: the re-run reproduces the same content.
        assert_eq!(fs::read_to_string(cfg.result_file(1)).unwrap(), first_result);
    }

    #[tokio::test]
    async fn deleting_a_result_file_triggers_reprocessing() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut state) = seeded(dir.path(), 5);
        run_batch(&cfg, &StubScraper, &mut state, usize::MAX)
            .await
            .unwrap();
        assert!(state.is_complete());

        fs::remove_file(cfg.result_file(2)).unwrap();
        let mut state = ProgressState::load(&cfg).unwrap();
        assert_eq!(state.remaining(), vec![2]);
        assert_eq!(state.stats.total_processed, 3);

        run_batch(&cfg, &StubScraper, &mut state, 1).await.unwrap();
        assert!(state.is_complete());
        assert_eq!(state.stats.total_processed, 5);
    }

    #[tokio::test]
    async fn row_failures_are_contained_in_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        fs::create_dir_all(cfg.input_dir()).unwrap();
        fs::write(
            cfg.input_dir().join("hotels.csv"),
            "NAME,WEBSITE\na,good.example\nb,\nc,down.example\n",
        )
        .unwrap();
        let mut state = chunker::split(&cfg).unwrap();

        run_batch(&cfg, &FlakyScraper, &mut state, usize::MAX)
            .await
            .unwrap();
        assert!(state.is_complete());
        assert_eq!(state.stats.total_processed, 3);
        assert_eq!(state.stats.success, 1);
        assert_eq!(state.stats.empty_url, 1);
        assert_eq!(state.stats.timeout, 1);
        assert_eq!(state.stats.sites_unavailable, 1);

        let chunk1 = Table::read(&cfg.result_file(1)).unwrap();
        assert_eq!(chunk1.rows[0][4], "Success");
        assert_eq!(chunk1.rows[1][4], "Empty URL");
        let chunk2 = Table::read(&cfg.result_file(2)).unwrap();
        assert_eq!(chunk2.rows[0][4], "Timeout");
    }
}

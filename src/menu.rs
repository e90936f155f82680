use std::io::{self, Write};

use anyhow::Result;

use crate::chunker;
use crate::config::Config;
use crate::merge;
use crate::runner;
use crate::scrape::HttpScraper;

/// Interactive control surface. Drives the batch controller and merger
/// exactly as the CLI subcommands do; the first run triggers the one-time
/// split automatically.
pub async fn run(cfg: &Config) -> Result<()> {
    let mut state = chunker::split_if_needed(cfg)?;
    let scraper = HttpScraper::new(cfg.timeout, cfg.delay)?;

    loop {
        if runner::interrupted() {
            break;
        }
        runner::report(&state);
        println!("\n1. Process next N chunks");
        println!("2. Merge results into the final file");
        println!("3. Exit");
        let Some(choice) = prompt("\nYour choice: ")? else {
            break;
        };
        match choice.as_str() {
            "1" => {
                let Some(raw) = prompt("How many chunks? ")? else {
                    break;
                };
                match raw.parse::<usize>() {
                    Ok(n) if n > 0 => runner::run_batch(cfg, &scraper, &mut state, n).await?,
                    _ => println!("Enter a positive number."),
                }
            }
            "2" => match merge::merge(cfg, &state) {
                Ok(_) => runner::report(&state),
                Err(e) => println!("Merge failed: {e}"),
            },
            "3" => break,
            "" => continue,
            other => println!("Invalid choice: {other}"),
        }
    }
    println!("Progress saved. Goodbye.");
    Ok(())
}

/// None on EOF, so piped input ends the menu cleanly.
fn prompt(msg: &str) -> Result<Option<String>> {
    print!("{msg}");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

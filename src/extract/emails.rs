use std::collections::HashSet;

use regex::Regex;
use scraper::{Html, Selector};

const LINK_PREFIXES: &[&str] = &["mailto:", "goto:", "email:", "e-mail:", "mail:"];

/// Emails from mailto-family links plus page text, lowercased and
/// deduplicated, discovery order preserved.
pub fn extract(doc: &Html, text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    let sel = Selector::parse("a[href]").unwrap();
    for a in doc.select(&sel) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Some(raw) = LINK_PREFIXES
            .iter()
            .find_map(|prefix| href.strip_prefix(prefix))
        else {
            continue;
        };
        // Strip any ?subject=... tail, then every whitespace character.
        let email: String = raw
            .split('?')
            .next()
            .unwrap_or("")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        if email.contains('@') && email.contains('.') && seen.insert(email.clone()) {
            found.push(email);
        }
    }

    let re = Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap();
    for m in re.find_iter(text) {
        let email = m.as_str().to_lowercase();
        if seen.insert(email.clone()) {
            found.push(email);
        }
    }

    found
}

// ── Tests ──

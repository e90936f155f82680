use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::extract::{emails, phones};

/// Contact-ish pages worth a follow-up visit after the homepage.
pub const MAX_CONTACT_PAGES: usize = 3;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const CONTACT_KEYWORDS: &[&str] = &[
    "contact",
    "nous-contacter",
    "contactez",
    "contactez-nous",
    "about",
    "a-propos",
    "qui-sommes-nous",
    "mentions-legales",
    "mentions",
    "legal",
    "impressum",
    "privacy",
    "politique",
    "confidentialite",
];

/// Row-level disposition. Recorded in the result file and tallied into the
/// aggregate statistics; row failures never surface as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    NoContactsFound,
    EmptyUrl,
    ConnectionError,
    HttpError(u16),
    Timeout,
    ParseError,
}

impl StatusKind {
    pub fn label(&self) -> String {
        match self {
            StatusKind::Success => "Success".into(),
            StatusKind::NoContactsFound => "No Contacts Found".into(),
            StatusKind::EmptyUrl => "Empty URL".into(),
            StatusKind::ConnectionError => "Connection Error".into(),
            StatusKind::HttpError(code) => format!("HTTP Error {}", code),
            StatusKind::Timeout => "Timeout".into(),
            StatusKind::ParseError => "Parse Error".into(),
        }
    }

    /// True when the site itself could not be read at all.
    pub fn site_unavailable(&self) -> bool {
        matches!(
            self,
            StatusKind::ConnectionError
                | StatusKind::HttpError(_)
                | StatusKind::Timeout
                | StatusKind::ParseError
        )
    }
}

/// What one URL yielded.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub status: StatusKind,
}

impl ScrapeOutcome {
    pub fn empty_url() -> Self {
        Self {
            emails: Vec::new(),
            phones: Vec::new(),
            status: StatusKind::EmptyUrl,
        }
    }
}

/// Per-URL contact extraction collaborator. Implementations must finish
/// within their configured timeout and classify every failure into a
/// `StatusKind` instead of returning an error.
pub trait Scrape {
    fn scrape(&self, url: &str) -> impl Future<Output = ScrapeOutcome>;
}

/// Add a default scheme when the spreadsheet cell has none.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

// ── HTTP implementation ──

pub struct HttpScraper {
    client: Client,
    /// Pause between homepage and contact-page fetches.
    page_delay: Duration,
}

impl HttpScraper {
    pub fn new(timeout: Duration, page_delay: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, page_delay })
    }

    async fn fetch(&self, url: &str) -> Result<Page, StatusKind> {
        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => return Err(classify(&e)),
        };
        let status = resp.status();
        if !status.is_success() {
            return Err(StatusKind::HttpError(status.as_u16()));
        }
        let final_url = resp.url().to_string();
        match resp.text().await {
            Ok(body) => Ok(Page { final_url, body }),
            Err(e) => Err(classify(&e)),
        }
    }
}

impl Scrape for HttpScraper {
    async fn scrape(&self, url: &str) -> ScrapeOutcome {
        let url = normalize_url(url);
        debug!("checking {}", url);

        // Homepage, with a one-shot http fallback when https fails outright.
        let page = match self.fetch(&url).await {
            Ok(page) => page,
            Err(first) => {
                if !url.starts_with("https://") {
                    return failed(first);
                }
                let fallback = url.replacen("https://", "http://", 1);
                debug!("retrying {} over http", fallback);
                match self.fetch(&fallback).await {
                    Ok(page) => page,
                    Err(_) => return failed(first),
                }
            }
        };

        let harvest = extract_page(&page.body, &page.final_url);
        let mut all_emails = harvest.emails;
        let mut all_phones = harvest.phones;

        // Follow contact-ish links only while an email or phone is still missing.
        for link in harvest.contact_links.into_iter().take(MAX_CONTACT_PAGES) {
            if !all_emails.is_empty() && !all_phones.is_empty() {
                break;
            }
            tokio::time::sleep(self.page_delay).await;
            debug!("checking contact page {}", link);
            match self.fetch(&link).await {
                Ok(page) => {
                    let extra = extract_page(&page.body, &page.final_url);
                    merge_unique(&mut all_emails, extra.emails);
                    merge_unique(&mut all_phones, extra.phones);
                }
                // A broken contact page never degrades the homepage result.
                Err(status) => {
                    debug!("contact page failed: {}", status.label());
                    continue;
                }
            }
        }

        let all_phones = phones::dedupe(all_phones);
        let status = if all_emails.is_empty() && all_phones.is_empty() {
            StatusKind::NoContactsFound
        } else {
            StatusKind::Success
        };
        ScrapeOutcome {
            emails: all_emails,
            phones: all_phones,
            status,
        }
    }
}

struct Page {
    final_url: String,
    body: String,
}

struct Harvest {
    emails: Vec<String>,
    phones: Vec<String>,
    contact_links: Vec<String>,
}

fn failed(status: StatusKind) -> ScrapeOutcome {
    ScrapeOutcome {
        emails: Vec::new(),
        phones: Vec::new(),
        status,
    }
}

fn classify(e: &reqwest::Error) -> StatusKind {
    if e.is_timeout() {
        StatusKind::Timeout
    } else if e.is_connect() {
        StatusKind::ConnectionError
    } else if e.is_builder() || e.is_decode() || e.is_body() {
        StatusKind::ParseError
    } else {
        StatusKind::ConnectionError
    }
}

/// Parse one page and pull everything out of it in a single pass.
/// Kept synchronous: the parsed DOM never crosses an await point.
fn extract_page(body: &str, page_url: &str) -> Harvest {
    let doc = Html::parse_document(body);
    let text = page_text(&doc);
    Harvest {
        emails: emails::extract(&doc, &text),
        phones: phones::extract(&doc, &text),
        contact_links: contact_page_links(&doc, page_url),
    }
}

fn page_text(doc: &Html) -> String {
    doc.root_element().text().collect::<Vec<_>>().join("\n")
}

/// Same-domain links whose href or anchor text hints at a contact page.
fn contact_page_links(doc: &Html, base: &str) -> Vec<String> {
    let Ok(base_url) = Url::parse(base) else {
        return Vec::new();
    };
    let base_host = base_url.host_str().map(str::to_string);

    let sel = Selector::parse("a[href]").unwrap();
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for a in doc.select(&sel) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let href_lower = href.to_lowercase();
        let text_lower = a
            .text()
            .collect::<String>()
            .to_lowercase()
            .replace(' ', "-");
        let matches_keyword = CONTACT_KEYWORDS
            .iter()
            .any(|kw| href_lower.contains(kw) || text_lower.contains(kw));
        if !matches_keyword {
            continue;
        }
        let Ok(full) = base_url.join(href) else {
            continue;
        };
        if full.host_str().map(str::to_string) != base_host {
            continue;
        }
        let full = full.to_string();
        if seen.insert(full.clone()) {
            links.push(full);
        }
    }
    links
}

fn merge_unique(into: &mut Vec<String>, extra: Vec<String>) {
    for item in extra {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_scheme() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url(" example.com "), "https://example.com");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
    }

    #[test]
    fn status_labels() {
        assert_eq!(StatusKind::Success.label(), "Success");
        assert_eq!(StatusKind::HttpError(404).label(), "HTTP Error 404");
        assert_eq!(StatusKind::EmptyUrl.label(), "Empty URL");
    }

    #[test]
    fn unavailable_covers_fetch_failures_only() {
        assert!(StatusKind::Timeout.site_unavailable());
        assert!(StatusKind::HttpError(500).site_unavailable());
        assert!(!StatusKind::Success.site_unavailable());
        assert!(!StatusKind::NoContactsFound.site_unavailable());
        assert!(!StatusKind::EmptyUrl.site_unavailable());
    }

    #[test]
    fn contact_links_stay_on_domain() {
        let html = r#"
            <html><body>
            <a href="/contact">Contact</a>
            <a href="https://other.example.org/contact">Contact elsewhere</a>
            <a href="/about">About us</a>
            <a href="/products">Products</a>
            </body></html>
        "#;
        let doc = Html::parse_document(html);
        let links = contact_page_links(&doc, "https://example.com/");
        assert_eq!(
            links,
            vec![
                "https://example.com/contact".to_string(),
                "https://example.com/about".to_string(),
            ]
        );
    }

    #[test]
    fn extract_page_harvests_both_kinds() {
        let html = r#"
            <html><body>
            <a href="mailto:info@hotel.fr">Write us</a>
            <p>Tel: 04 91 54 19 52</p>
            </body></html>
        "#;
        let harvest = extract_page(html, "https://hotel.fr/");
        assert_eq!(harvest.emails, vec!["info@hotel.fr"]);
        assert_eq!(harvest.phones, vec!["0491541952"]);
    }
}

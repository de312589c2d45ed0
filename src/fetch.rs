use std::sync::LazyLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://www.thegradcafe.com/survey/";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 300;

static PAGE_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([?&]page=)\d+").unwrap());

/// One fetched listing page. A failed page carries its error instead of
/// aborting the batch; callers may re-request the same page later.
pub struct PageResult {
    pub page: u32,
    pub url: String,
    pub html: Option<String>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: i64,
}

pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("admit_scraper/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(READ_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

/// Replace an existing ?page= value or append one.
pub fn build_page_url(base: &str, page: u32) -> String {
    let replaced = PAGE_PARAM_RE.replace(base, format!("${{1}}{page}"));
    if replaced != base {
        return replaced.into_owned();
    }
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}page={page}")
}

/// Fetch pages 1..=pages strictly in order, one request in flight at a time,
/// with at least `delay_secs` between consecutive requests.
pub async fn fetch_pages(
    client: &reqwest::Client,
    base_url: &str,
    pages: u32,
    delay_secs: f64,
) -> Result<Vec<PageResult>> {
    let pb = ProgressBar::new(pages as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let delay = Duration::from_secs_f64(delay_secs.max(0.0));
    let mut results = Vec::with_capacity(pages as usize);

    for page in 1..=pages {
        if page > 1 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let url = build_page_url(base_url, page);
        results.push(fetch_with_retry(client, page, &url).await);
        pb.inc(1);
    }

    pb.finish_and_clear();
    let mut failed = 0usize;
    for r in results.iter().filter(|r| r.error.is_some()) {
        failed += 1;
        warn!(
            "page {} failed after {} ms: {}",
            r.page,
            r.latency_ms,
            r.error.as_deref().unwrap_or("unknown")
        );
    }
    info!(
        "Fetched {} pages ({} ok, {} errors)",
        results.len(),
        results.len() - failed,
        failed
    );
    Ok(results)
}

async fn fetch_with_retry(client: &reqwest::Client, page: u32, url: &str) -> PageResult {
    let mut result = fetch_one(client, page, url).await;
    for attempt in 0..MAX_RETRIES {
        let should_retry = match (&result.error, result.status) {
            (Some(_), Some(429)) => true,
            (Some(_), Some(s)) if s >= 500 => true,
            (Some(_), None) => true, // transport error, no response
            _ => false,
        };
        if !should_retry {
            break;
        }
        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "Page {} failed (attempt {}/{}), backing off {:.1}s",
            page,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        result = fetch_one(client, page, url).await;
    }
    result
}

async fn fetch_one(client: &reqwest::Client, page: u32, url: &str) -> PageResult {
    let start = Instant::now();
    let response = client.get(url).send().await;
    let latency_ms = start.elapsed().as_millis() as i64;

    match response {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status >= 400 {
                return PageResult {
                    page,
                    url: url.to_string(),
                    html: None,
                    status: Some(status),
                    error: Some(format!("HTTP {status}")),
                    latency_ms,
                };
            }
            match resp.text().await {
                Ok(body) => PageResult {
                    page,
                    url: url.to_string(),
                    html: Some(body),
                    status: Some(status),
                    error: None,
                    latency_ms,
                },
                Err(e) => PageResult {
                    page,
                    url: url.to_string(),
                    html: None,
                    status: Some(status),
                    error: Some(e.to_string()),
                    latency_ms,
                },
            }
        }
        Err(e) => PageResult {
            page,
            url: url.to_string(),
            html: None,
            status: e.status().map(|s| s.as_u16()),
            error: Some(e.to_string()),
            latency_ms,
        },
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_page_param() {
        assert_eq!(
            build_page_url("https://example.com/survey/", 3),
            "https://example.com/survey/?page=3"
        );
    }

    #[test]
    fn appends_with_existing_query() {
        assert_eq!(
            build_page_url("https://example.com/survey/?sort=new", 2),
            "https://example.com/survey/?sort=new&page=2"
        );
    }

    #[test]
    fn replaces_existing_page_param() {
        assert_eq!(
            build_page_url("https://example.com/survey/?page=9", 2),
            "https://example.com/survey/?page=2"
        );
        assert_eq!(
            build_page_url("https://example.com/survey/?sort=new&page=9", 4),
            "https://example.com/survey/?sort=new&page=4"
        );
    }
}

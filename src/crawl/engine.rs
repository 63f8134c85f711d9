use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};
use url::Url;

use super::{host_allowed, CrawlPipeline, FollowRequest, OutputRecord, Page};
use crate::error::FetchError;

pub const DEFAULT_CONCURRENCY: usize = 16;
pub const DEFAULT_TIMEOUT_SECS: u64 = 180;
const MAX_REDIRECTS: usize = 10;
pub const DEFAULT_USER_AGENT: &str = concat!("review_scraper/", env!("CARGO_PKG_VERSION"));

/// HTTP knobs for the crawl.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub concurrency: usize,
    pub delay: Duration,
    pub timeout: Duration,
    pub user_agent: String,
    pub progress: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            delay: Duration::ZERO,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            progress: false,
        }
    }
}

/// Totals reported once the crawl has drained.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CrawlStats {
    /// Follow-requests produced by listing pages
    pub discovered: usize,
    pub records: usize,
    /// Detail pages that failed to fetch
    pub errors: usize,
    /// Offsite or duplicate follow-requests
    pub skipped: usize,
}

/// HTTP client scoped to the allowed domains, redirects included.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    allowed_domains: Arc<Vec<String>>,
}

impl Fetcher {
    pub fn new(settings: &EngineSettings, allowed_domains: &[String]) -> Result<Self> {
        let allowed_domains = Arc::new(allowed_domains.to_vec());
        let scope = Arc::clone(&allowed_domains);
        // An offsite hop is not followed; `fetch` reports the 3xx as offsite
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if host_allowed(&scope, attempt.url()) {
                attempt.follow()
            } else {
                attempt.stop()
            }
        });

        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout)
            .redirect(policy)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            allowed_domains,
        })
    }

    /// GET `url`; anything but a 2xx is an error.
    pub async fn fetch(&self, url: &Url) -> Result<Page, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_redirection() {
            let target = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            return Err(FetchError::Offsite {
                url: url.to_string(),
                target,
            });
        }
        if !host_allowed(&self.allowed_domains, response.url()) {
            return Err(FetchError::Offsite {
                url: url.to_string(),
                target: response.url().to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Relative links resolve against where we ended up after redirects
        let final_url = response.url().clone();
        let body = response.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(Page {
            url: final_url,
            body,
        })
    }
}

/// Crawl every start URL and hand each record to `emit` as it arrives.
///
/// A listing page that fails to fetch aborts the run. Detail failures are
/// logged and counted.
pub async fn run<F>(
    pipeline: Arc<CrawlPipeline>,
    fetcher: Fetcher,
    settings: &EngineSettings,
    mut emit: F,
) -> Result<CrawlStats>
where
    F: FnMut(OutputRecord) -> Result<()>,
{
    let mut stats = CrawlStats::default();
    let mut seen: HashSet<Url> = HashSet::new();
    let mut requests: Vec<FollowRequest> = Vec::new();

    for start in &pipeline.config().start_urls {
        info!("Fetching listing page: {}", start);
        seen.insert(start.clone());
        let page = fetcher
            .fetch(start)
            .await
            .with_context(|| format!("Failed to fetch listing page {}", start))?;

        for req in pipeline.on_listing_page(&page) {
            stats.discovered += 1;
            if !pipeline.config().allows(&req.url) {
                debug!("Filtered offsite request to {}", req.url);
                stats.skipped += 1;
                continue;
            }
            if !seen.insert(req.url.clone()) {
                debug!("Filtered duplicate request to {}", req.url);
                stats.skipped += 1;
                continue;
            }
            requests.push(req);
        }
    }
    info!(
        "Discovered {} companies ({} scheduled, {} skipped)",
        stats.discovered,
        requests.len(),
        stats.skipped
    );

    let pb = if settings.progress {
        let pb = ProgressBar::new(requests.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let (tx, mut rx) =
        mpsc::channel::<Result<OutputRecord, FetchError>>(settings.concurrency.max(1) * 2);

    for req in requests {
        let pipeline = Arc::clone(&pipeline);
        let fetcher = fetcher.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let delay = settings.delay;

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let outcome = fetcher
                .fetch(&req.url)
                .await
                .map(|page| pipeline.on_detail_page(&page, &req.company));
            let _ = tx.send(outcome).await;
        });
    }

    // rx closes once every task has finished
    drop(tx);

    while let Some(outcome) = rx.recv().await {
        match outcome {
            Ok(record) => {
                stats.records += 1;
                emit(record)?;
            }
            Err(e) => {
                stats.errors += 1;
                warn!("Skipping company: {}", e);
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Crawl finished: {} records, {} errors, {} skipped",
        stats.records, stats.errors, stats.skipped
    );
    Ok(stats)
}

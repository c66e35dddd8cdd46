use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tracing::{debug, info};
use url::Url;

use crate::cli::config::CrawlerSettings;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::task::{CrawlOutcome, CrawlTask};
use crate::error::PipelineError;
use crate::utils::metrics::{CrawlStats, RequestTimer};

/// Budgets for one crawl run
#[derive(Debug, Clone)]
pub struct CrawlLimits {
    pub max_depth: u32,
    pub max_pages: usize,
    pub politeness_delay: Duration,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 500,
            politeness_delay: Duration::ZERO,
        }
    }
}

impl From<&CrawlerSettings> for CrawlLimits {
    fn from(settings: &CrawlerSettings) -> Self {
        Self {
            max_depth: settings.max_depth,
            max_pages: settings.max_pages as usize,
            politeness_delay: Duration::from_millis(settings.politeness_delay_ms),
        }
    }
}

/// FIFO frontier plus the visited set of a single crawl
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<CrawlTask>,
    queued: HashSet<String>,
    visited: HashSet<String>,
}

impl Frontier {
    pub fn seeded(seed: &str) -> Self {
        let mut frontier = Self::default();
        frontier.enqueue(seed, 0);
        frontier
    }

    /// Queue a URL unless it was already visited or is waiting in the queue
    pub fn enqueue(&mut self, url: &str, depth: u32) -> bool {
        let url = normalize_url(url);
        if self.visited.contains(&url) || self.queued.contains(&url) {
            return false;
        }

        self.queued.insert(url.clone());
        self.queue.push_back(CrawlTask { url, depth });
        true
    }

    /// Dequeue the earliest-inserted task
    pub fn next(&mut self) -> Option<CrawlTask> {
        let task = self.queue.pop_front()?;
        self.queued.remove(&task.url);
        Some(task)
    }

    /// Check and mark in one step; returns false when already visited
    pub fn mark_visited(&mut self, url: &str) -> bool {
        self.visited.insert(normalize_url(url))
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

/// Breadth-first crawl driver
pub struct Scheduler {
    limits: CrawlLimits,
}

impl Scheduler {
    pub fn new(limits: CrawlLimits) -> Self {
        Self { limits }
    }

    /// Validate a seed URL before any page is attempted
    pub fn parse_seed(seed: &str) -> Result<Url, PipelineError> {
        let url = Url::parse(seed.trim())
            .map_err(|e| PipelineError::Validation(format!("{}: {}", seed, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(PipelineError::Validation(format!(
                "{}: only http and https URLs can be crawled",
                seed
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(PipelineError::Validation(format!("{}: missing host", seed)));
        }

        Ok(url)
    }

    /// Crawl from `seed` until the frontier drains or the page budget is spent.
    ///
    /// Per-page failures are recorded and the crawl moves on; only an
    /// invalid seed aborts the run.
    pub async fn run<F>(&self, seed: &str, fetcher: &F) -> Result<CrawlOutcome, PipelineError>
    where
        F: PageFetcher + ?Sized,
    {
        let origin = Self::parse_seed(seed)?;
        let mut frontier = Frontier::seeded(origin.as_str());
        let mut pages = Vec::new();
        let mut stats = CrawlStats::new();

        info!(
            seed = %origin,
            max_depth = self.limits.max_depth,
            max_pages = self.limits.max_pages,
            "Starting crawl"
        );

        // The page cap is enforced when dequeuing; overflow entries are dropped lazily
        while frontier.visited_count() < self.limits.max_pages {
            let Some(task) = frontier.next() else {
                break;
            };

            if task.depth > self.limits.max_depth {
                debug!("Skipping {} beyond max depth ({})", task.url, task.depth);
                continue;
            }
            if !frontier.mark_visited(&task.url) {
                continue;
            }

            if !self.limits.politeness_delay.is_zero() && stats.pages_attempted > 0 {
                tokio::time::sleep(self.limits.politeness_delay).await;
            }

            debug!(url = %task.url, depth = task.depth, "Fetching page");
            let timer = RequestTimer::start();
            let page = fetcher.fetch(&task.url, task.depth).await;
            stats.record(&page, timer.end());

            if page.is_success() && task.depth < self.limits.max_depth {
                let mut discovered = 0;
                for link in &page.links {
                    let same_origin = Url::parse(link)
                        .map(|url| is_same_origin(&url, &origin))
                        .unwrap_or(false);
                    if same_origin && frontier.enqueue(link, task.depth + 1) {
                        discovered += 1;
                    }
                }
                debug!("Queued {} new links from {}", discovered, task.url);
            } else if let Some(error) = &page.error {
                debug!(url = %task.url, error = %error, "Page failed, continuing");
            }

            pages.push(page);
        }

        let total_visited = frontier.visited_count();
        info!(
            visited = total_visited,
            succeeded = stats.pages_succeeded,
            failed = stats.pages_failed,
            avg_fetch_ms = stats.average_fetch_ms(),
            "Crawl finished"
        );

        Ok(CrawlOutcome {
            pages,
            total_visited,
            stats,
        })
    }
}

/// Same scheme, host and effective port
pub fn is_same_origin(url: &Url, origin: &Url) -> bool {
    url.scheme() == origin.scheme()
        && url.host_str().map(str::to_lowercase) == origin.host_str().map(str::to_lowercase)
        && url.port_or_known_default() == origin.port_or_known_default()
}

/// Normalize a URL so trivially different spellings share one visited entry
pub fn normalize_url(url: &str) -> String {
    let mut parsed = match Url::parse(url) {
        Ok(url) => url,
        Err(_) => return url.to_string(),
    };

    // The url crate already lowercases the host and drops default ports
    parsed.set_fragment(None);

    if let Some(query) = parsed.query() {
        if query.is_empty() {
            parsed.set_query(None);
        } else {
            let mut params: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            params.sort_by(|a, b| a.0.cmp(&b.0));
            parsed.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    let mut normalized = parsed.to_string();
    if parsed.path() == "/" && parsed.query().is_none() && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

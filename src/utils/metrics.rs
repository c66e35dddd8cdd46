use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::crawler::task::PageResult;

/// Per-crawl navigation statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStats {
    /// Pages the scheduler handed to the fetcher
    pub pages_attempted: usize,

    /// Pages fetched and extracted without error
    pub pages_succeeded: usize,

    /// Pages whose navigation failed
    pub pages_failed: usize,

    /// Failure counts keyed by error type
    pub errors_by_kind: BTreeMap<String, usize>,

    /// Characters of retained content across successful pages
    pub content_chars: usize,

    /// Total time spent fetching, in milliseconds
    pub total_fetch_ms: u64,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one fetched page
    pub fn record(&mut self, page: &PageResult, duration_ms: u64) {
        self.pages_attempted += 1;
        self.total_fetch_ms += duration_ms;

        if page.is_success() {
            self.pages_succeeded += 1;
            self.content_chars += page.content_length;
        } else {
            self.pages_failed += 1;
            let kind = page
                .error_type
                .map(|kind| kind.as_str())
                .unwrap_or("unknown");
            *self.errors_by_kind.entry(kind.to_string()).or_default() += 1;
        }
    }

    pub fn average_fetch_ms(&self) -> u64 {
        if self.pages_attempted == 0 {
            0
        } else {
            self.total_fetch_ms / self.pages_attempted as u64
        }
    }
}

/// Request timer for measuring fetch durations
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// End timing and get the duration in milliseconds
    pub fn end(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

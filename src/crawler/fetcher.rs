use anyhow::Result;
use async_trait::async_trait;
use url::Url;

use crate::crawler::task::PageResult;

/// Fetches and extracts a single page.
///
/// Implementations never fail: navigation problems are reported through
/// `PageResult::error` so the crawl can continue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, depth: u32) -> PageResult;
}

/// A fetcher bound to a scoped resource that must be released
#[async_trait]
pub trait FetchSession: PageFetcher {
    async fn close(&mut self) -> Result<()>;
}

/// Opens one session per crawl invocation
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// `origin` is the seed URL; links are filtered against it
    async fn open(&self, origin: &Url) -> Result<Box<dyn FetchSession>>;
}

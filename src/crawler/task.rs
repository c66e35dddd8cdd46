use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::browser::extract::ExtractedPage;
use crate::error::NetworkErrorKind;
use crate::keywords::KeywordCount;
use crate::utils::metrics::CrawlStats;

/// A URL waiting in the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    /// URL to crawl, already normalized
    pub url: String,

    /// Current depth in the crawl tree (0 for the seed URL)
    pub depth: u32,
}

/// Everything recorded about one visited URL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub url: String,
    pub depth: u32,
    pub title: String,

    /// Retained text snippets from headings, paragraphs and list items
    pub content: Vec<String>,

    /// Same-origin links discovered on the page
    pub links: Vec<String>,

    pub keywords: Vec<KeywordCount>,
    pub content_length: usize,
    pub word_count: usize,
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<NetworkErrorKind>,
}

impl PageResult {
    /// Record a successfully rendered page
    pub fn loaded(url: &str, depth: u32, page: ExtractedPage) -> Self {
        Self {
            url: url.to_string(),
            depth,
            title: page.title,
            content: page.content,
            links: page.links,
            keywords: page.keywords,
            content_length: page.content_length,
            word_count: page.word_count,
            timestamp: Utc::now(),
            error: None,
            error_type: None,
        }
    }

    /// Record a page whose navigation failed
    pub fn failed(url: &str, depth: u32, kind: NetworkErrorKind) -> Self {
        Self {
            url: url.to_string(),
            depth,
            title: String::new(),
            content: Vec::new(),
            links: Vec::new(),
            keywords: Vec::new(),
            content_length: 0,
            word_count: 0,
            timestamp: Utc::now(),
            error: Some(kind.user_message().to_string()),
            error_type: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// A page worth sending to the analysis service
    pub fn has_content(&self) -> bool {
        self.is_success() && self.content_length > 0
    }
}

/// Result of a full crawl run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlOutcome {
    pub pages: Vec<PageResult>,
    pub total_visited: usize,
    pub stats: CrawlStats,
}

impl CrawlOutcome {
    pub fn successful_pages(&self) -> impl Iterator<Item = &PageResult> {
        self.pages.iter().filter(|page| page.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.successful_pages().count()
    }

    pub fn fail_count(&self) -> usize {
        self.pages.len() - self.success_count()
    }
}

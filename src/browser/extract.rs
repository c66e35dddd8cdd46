use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

use crate::cli::config::CrawlerSettings;
use crate::crawler::scheduler::{is_same_origin, normalize_url};
use crate::keywords::{self, KeywordCount};

const TEXT_SELECTOR: &str = "h1, h2, h3, h4, h5, h6, p, li, span";

/// Bounds applied while pulling text out of a page
#[derive(Debug, Clone)]
pub struct ExtractionLimits {
    /// Shortest snippet kept, in characters (inclusive)
    pub min_snippet_len: usize,

    /// Longest snippet kept, in characters (exclusive)
    pub max_snippet_len: usize,

    /// Snippets collected from the document before retention
    pub raw_cap: usize,

    /// Snippets retained on the page result
    pub retained_cap: usize,

    /// Local keywords computed per page
    pub max_keywords: usize,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            min_snippet_len: 15,
            max_snippet_len: 800,
            raw_cap: 25,
            retained_cap: 15,
            max_keywords: keywords::local::DEFAULT_MAX_KEYWORDS,
        }
    }
}

impl From<&CrawlerSettings> for ExtractionLimits {
    fn from(settings: &CrawlerSettings) -> Self {
        Self {
            min_snippet_len: settings.snippet_min_len,
            max_snippet_len: settings.snippet_max_len,
            raw_cap: settings.raw_snippet_cap,
            retained_cap: settings.retained_snippet_cap,
            max_keywords: settings.local_keywords_per_page,
        }
    }
}

/// Content pulled from one rendered document
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub title: String,
    pub content: Vec<String>,
    pub links: Vec<String>,
    pub content_length: usize,
    pub word_count: usize,
    pub keywords: Vec<KeywordCount>,
}

/// Extract title, text snippets, same-origin links and local keywords.
///
/// Links are resolved against `page_url` but filtered against `origin`, the
/// origin of the crawl's seed, so a redirect to another host does not widen
/// the crawl.
pub fn extract_page(html: &str, page_url: &Url, origin: &Url, limits: &ExtractionLimits) -> ExtractedPage {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let content = extract_snippets(&document, limits);
    let links = extract_links(&document, page_url, origin);

    let joined = content.join(" ");
    let content_length = joined.chars().count();
    let word_count = joined.split_whitespace().count();
    let keywords = keywords::extract(&joined, limits.max_keywords);

    ExtractedPage {
        title,
        content,
        links,
        content_length,
        word_count,
        keywords,
    }
}

fn extract_title(document: &Html) -> String {
    let selector = Selector::parse("title").expect("static selector is valid");
    document
        .select(&selector)
        .next()
        .map(|title| collapse_whitespace(&title.text().collect::<String>()))
        .unwrap_or_default()
}

fn extract_snippets(document: &Html, limits: &ExtractionLimits) -> Vec<String> {
    let selector = Selector::parse(TEXT_SELECTOR).expect("static selector is valid");
    let mut seen = HashSet::new();

    // The raw cap counts matched elements, including ones rejected below
    document
        .select(&selector)
        .take(limits.raw_cap)
        .map(|element| collapse_whitespace(&element.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| {
            let len = text.chars().count();
            len >= limits.min_snippet_len && len < limits.max_snippet_len
        })
        .filter(|text| seen.insert(text.clone()))
        .take(limits.retained_cap)
        .collect()
}

fn extract_links(document: &Html, page_url: &Url, origin: &Url) -> Vec<String> {
    let selector = Selector::parse("a[href]").expect("static selector is valid");
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();

        // Fragment-only anchors point back at the same document
        if href.is_empty() || href.starts_with('#') {
            continue;
        }

        let Ok(resolved) = page_url.join(href) else {
            continue;
        };

        if !matches!(resolved.scheme(), "http" | "https") || !is_same_origin(&resolved, origin) {
            continue;
        }

        let normalized = normalize_url(resolved.as_str());
        if seen.insert(normalized.clone()) {
            links.push(normalized);
        }
    }

    links
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

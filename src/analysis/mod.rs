//! Submission of crawl output to the external keyword analysis service and
//! normalization of whatever it sends back.
//!
//! [`KeywordAnalyzer::submit_and_normalize`] never fails: transport errors,
//! unparsable replies and empty results all end in a report built from the
//! local keyword counts, with `error` describing what went wrong.

pub mod client;
pub mod normalize;
pub mod recommendations;
pub mod recovery;
pub mod report;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::config::AnalyzerSettings;
use crate::crawler::task::PageResult;
use crate::error::AnalysisError;
use crate::keywords::local;

pub use client::{AnalysisPayload, AnalyzerClient, AnalyzerTransport};
pub use report::{KeywordEntry, KeywordReport, PageInsight};

/// Keywords kept when building a report from local counts
pub const FALLBACK_KEYWORDS: usize = 50;

/// Keywords attributed to each page
pub const PAGE_TOP_KEYWORDS: usize = 5;

/// Content length that earns a full content score
pub const FULL_SCORE_CONTENT_CHARS: usize = 500;

/// Outcome of one analysis attempt
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub report: KeywordReport,

    /// A payload was posted to the external service
    pub sent_to_external: bool,

    /// Page snippets were trimmed to fit the payload bounds
    pub data_optimized: bool,

    /// The report was built from local keyword counts
    pub fallback_used: bool,

    pub external_error: Option<String>,
}

pub struct KeywordAnalyzer {
    transport: Option<Arc<dyn AnalyzerTransport>>,
    settings: AnalyzerSettings,
}

impl KeywordAnalyzer {
    pub fn new(transport: Arc<dyn AnalyzerTransport>, settings: AnalyzerSettings) -> Self {
        Self {
            transport: Some(transport),
            settings,
        }
    }

    /// An analyzer that always uses the local fallback
    pub fn local_only(settings: AnalyzerSettings) -> Self {
        Self {
            transport: None,
            settings,
        }
    }

    /// Build the HTTP-backed analyzer, or a local-only one when disabled
    pub fn from_settings(settings: &AnalyzerSettings) -> Result<Self> {
        if !settings.enabled {
            info!("External keyword analysis disabled, using local extraction only");
            return Ok(Self::local_only(settings.clone()));
        }

        let client = AnalyzerClient::new(settings)?;
        Ok(Self::new(Arc::new(client), settings.clone()))
    }

    /// Turn crawled pages into a canonical keyword report
    pub async fn submit_and_normalize(&self, pages: &[PageResult]) -> AnalysisResult {
        let successful: Vec<&PageResult> = pages.iter().filter(|page| page.is_success()).collect();
        let valid: Vec<&PageResult> = successful
            .iter()
            .copied()
            .filter(|page| page.has_content())
            .collect();

        let data_optimized = valid
            .iter()
            .any(|page| page.content.len() > self.settings.snippet_items);

        let mut sent_to_external = false;
        let attempt = self
            .analyze_external(&valid, &successful, &mut sent_to_external)
            .await;

        let mut result = match attempt {
            Ok(report) => {
                info!(
                    keywords = report.keywords.len(),
                    "External analysis produced keyword report"
                );
                AnalysisResult {
                    report,
                    sent_to_external,
                    data_optimized: sent_to_external && data_optimized,
                    fallback_used: false,
                    external_error: None,
                }
            }
            Err(err) => {
                warn!("Keyword analysis falling back to local extraction: {}", err);
                AnalysisResult {
                    report: fallback_report(&successful, &err),
                    sent_to_external,
                    data_optimized: sent_to_external && data_optimized,
                    fallback_used: true,
                    external_error: Some(err.to_string()),
                }
            }
        };

        result.report.pages = attribute_pages(&result.report.keywords, &successful);
        result
    }

    /// Only `valid` pages are submitted; recommendations weigh every
    /// successful page
    async fn analyze_external(
        &self,
        valid: &[&PageResult],
        successful: &[&PageResult],
        sent: &mut bool,
    ) -> Result<KeywordReport, AnalysisError> {
        if valid.is_empty() {
            return Err(AnalysisError::NoValidContent);
        }
        let transport = self.transport.as_ref().ok_or(AnalysisError::Disabled)?;

        let payload = AnalysisPayload::build(
            valid,
            &self.settings.analysis_type,
            self.settings.snippet_items,
        );

        *sent = true;
        let body = transport.submit(&payload).await?;
        normalize_reply(&body, successful)
    }
}

/// Recover, normalize and deduplicate a raw analysis reply
pub fn normalize_reply(body: &str, pages: &[&PageResult]) -> Result<KeywordReport, AnalysisError> {
    let value = recovery::recover(body)?;
    let normalized = normalize::normalize_response(&value);

    let keywords = normalize::dedup_keywords(normalized.keywords);
    if keywords.is_empty() {
        return Err(AnalysisError::NoKeywords);
    }
    debug!("Normalized {} unique keywords", keywords.len());

    let summary = normalize::build_summary(&keywords, &normalized.explicit);
    let recommendations = if normalized.recommendations.is_empty() {
        recommendations::synthesize(&summary, pages)
    } else {
        normalized.recommendations
    };

    Ok(KeywordReport {
        keywords,
        summary,
        recommendations,
        pages: BTreeMap::new(),
        error: None,
    })
}

/// Report built only from the per-page local keyword counts
pub fn fallback_report(pages: &[&PageResult], cause: &AnalysisError) -> KeywordReport {
    let aggregated = local::aggregate(
        pages.iter().map(|page| page.keywords.as_slice()),
        FALLBACK_KEYWORDS,
    );
    let top_count = aggregated.first().map_or(1, |keyword| keyword.count.max(1));

    let keywords: Vec<KeywordEntry> = aggregated
        .iter()
        .map(|keyword| {
            let mut entry = KeywordEntry::new(keyword.word.clone());
            entry.relevance_score = (keyword.count as f64 * 100.0 / top_count as f64).round();
            entry
        })
        .collect();

    let summary = normalize::build_summary(&keywords, &normalize::ExplicitGroups::default());
    let recommendations = recommendations::synthesize(&summary, pages);

    KeywordReport {
        keywords,
        summary,
        recommendations,
        pages: BTreeMap::new(),
        error: Some(format!(
            "External keyword analysis unavailable ({}); results derived from local keyword extraction",
            cause
        )),
    }
}

/// Attach the normalized keywords found in each page's retained content
pub fn attribute_pages(keywords: &[KeywordEntry], pages: &[&PageResult]) -> BTreeMap<String, PageInsight> {
    pages
        .iter()
        .map(|page| {
            let text = page.content.join(" ").to_lowercase();
            let found: Vec<String> = keywords
                .iter()
                .filter(|entry| {
                    let key = entry.key();
                    !key.is_empty() && text.contains(&key)
                })
                .map(|entry| entry.keyword.clone())
                .collect();

            let insight = PageInsight {
                title: page.title.clone(),
                keyword_count: found.len(),
                top_keywords: found.into_iter().take(PAGE_TOP_KEYWORDS).collect(),
                content_score: content_score(page.content_length),
            };
            (page.url.clone(), insight)
        })
        .collect()
}

pub fn content_score(content_length: usize) -> u32 {
    (content_length * 100 / FULL_SCORE_CONTENT_CHARS).min(100) as u32
}

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::analysis::report::KeywordReport;
use crate::analysis::{AnalysisResult, KeywordAnalyzer};
use crate::browser::BrowserSessionProvider;
use crate::cli::config::CrawlerConfig;
use crate::crawler::fetcher::SessionProvider;
use crate::crawler::scheduler::{CrawlLimits, Scheduler};
use crate::crawler::task::CrawlOutcome;
use crate::error::PipelineError;
use crate::storage::{
    AnalysisMeta, Report, ReportStatus, ReportStore, ReportStoreFactory, UsageDecision, UsageGate,
    UsageGateFactory, UsageSnapshot,
};

/// Identity and timing of one crawl request, threaded through the pipeline
#[derive(Debug, Clone)]
pub struct CrawlContext {
    pub report_id: String,
    pub owner_id: String,
    pub main_url: String,
    started: Instant,
}

impl CrawlContext {
    /// Mint a report id for a new crawl
    pub fn new(owner_id: &str, main_url: &str) -> Self {
        Self {
            report_id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            main_url: main_url.to_string(),
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Owns the processing -> completed | failed state machine of a report
#[derive(Clone)]
pub struct ReportLifecycle {
    store: Arc<dyn ReportStore>,
}

impl ReportLifecycle {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    /// Persist the `processing` record before any page is fetched
    pub async fn create(&self, ctx: &CrawlContext) -> Result<Report> {
        let report = Report::processing(&ctx.report_id, &ctx.owner_id, &ctx.main_url);
        self.store
            .upsert(&report)
            .await
            .context(format!("Failed to create report {}", ctx.report_id))?;

        info!(report_id = %ctx.report_id, url = %ctx.main_url, "Created report");
        Ok(report)
    }

    /// Store the finished report; calling again overwrites the same row
    pub async fn finalize(
        &self,
        ctx: &CrawlContext,
        analysis: &AnalysisResult,
        outcome: &CrawlOutcome,
    ) -> Result<Report> {
        let mut report = self.current(ctx).await?;
        let data = &analysis.report;

        report.status = ReportStatus::Completed;
        report.total_scraped = outcome.success_count();
        report.keywords = data.keywords.clone();
        report.summary = data.summary.clone();
        report.recommendations = data.recommendations.clone();
        report.pages = data.pages.clone();
        report.analysis = AnalysisMeta {
            sent_to_external: analysis.sent_to_external,
            data_optimized: analysis.data_optimized,
            fallback_used: analysis.fallback_used,
            external_error: analysis.external_error.clone(),
            success_count: outcome.success_count(),
            fail_count: outcome.fail_count(),
        };
        report.error = None;
        report.processing_time_ms = ctx.elapsed_ms();
        report.updated_at = Utc::now();

        self.store
            .upsert(&report)
            .await
            .context(format!("Failed to finalize report {}", ctx.report_id))?;

        info!(
            report_id = %ctx.report_id,
            keywords = report.keywords.len(),
            pages = report.total_scraped,
            "Report completed"
        );
        Ok(report)
    }

    /// Mark the report failed with a reason
    pub async fn fail(&self, ctx: &CrawlContext, reason: &str) -> Result<Report> {
        let mut report = self.current(ctx).await?;

        report.status = ReportStatus::Failed;
        report.error = Some(reason.to_string());
        report.processing_time_ms = ctx.elapsed_ms();
        report.updated_at = Utc::now();

        self.store
            .upsert(&report)
            .await
            .context(format!("Failed to mark report {} as failed", ctx.report_id))?;

        warn!(report_id = %ctx.report_id, reason = reason, "Report failed");
        Ok(report)
    }

    async fn current(&self, ctx: &CrawlContext) -> Result<Report> {
        let existing = self.store.get(&ctx.report_id, &ctx.owner_id).await?;
        Ok(existing
            .unwrap_or_else(|| Report::processing(&ctx.report_id, &ctx.owner_id, &ctx.main_url)))
    }
}

/// Successful crawl response returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResponse {
    pub success: bool,
    pub data: KeywordReport,
    pub main_url: String,
    pub total_scraped: usize,
    pub total_pages_attempted: usize,
    pub report_id: String,
    pub usage: UsageSnapshot,
    pub analysis: AnalysisMeta,
}

/// Coordinates usage, report lifecycle, crawl and analysis for one request
pub struct CrawlerController {
    scheduler: Scheduler,
    sessions: Arc<dyn SessionProvider>,
    analyzer: Arc<KeywordAnalyzer>,
    lifecycle: ReportLifecycle,
    reports: Arc<dyn ReportStore>,
    usage: Arc<dyn UsageGate>,
}

impl CrawlerController {
    pub fn new(
        limits: CrawlLimits,
        sessions: Arc<dyn SessionProvider>,
        analyzer: Arc<KeywordAnalyzer>,
        reports: Arc<dyn ReportStore>,
        usage: Arc<dyn UsageGate>,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(limits),
            sessions,
            analyzer,
            lifecycle: ReportLifecycle::new(reports.clone()),
            reports,
            usage,
        }
    }

    /// Build the controller and connect its collaborators from configuration
    pub async fn from_config(config: &CrawlerConfig) -> Result<Self> {
        let sessions = Arc::new(BrowserSessionProvider::new(
            config.browser.clone(),
            &config.crawler,
        ));
        let analyzer = Arc::new(KeywordAnalyzer::from_settings(&config.analyzer)?);
        let reports = ReportStoreFactory::create(&config.storage.reports).await?;
        let usage = UsageGateFactory::create(&config.storage.usage).await?;

        Ok(Self::new(
            CrawlLimits::from(&config.crawler),
            sessions,
            analyzer,
            reports,
            usage,
        ))
    }

    pub fn reports(&self) -> Arc<dyn ReportStore> {
        self.reports.clone()
    }

    /// Crawl `url` for `owner_id` and produce a persisted keyword report.
    ///
    /// An unusable external analysis never fails the request; only an invalid
    /// seed, an exhausted quota, a crawl with no successful page or an
    /// unexpected error do. Every failure after the report was created leaves
    /// it `failed` and gives the usage reservation back.
    pub async fn crawl(&self, owner_id: &str, url: &str) -> Result<CrawlResponse, PipelineError> {
        let origin = Scheduler::parse_seed(url)?;

        let usage = match self
            .usage
            .reserve(owner_id)
            .await
            .map_err(|e| PipelineError::unhandled(None, e))?
        {
            UsageDecision::Granted(snapshot) => snapshot,
            UsageDecision::Denied(snapshot) => {
                info!("Usage limit reached for owner {}", owner_id);
                return Err(PipelineError::LimitExceeded { usage: snapshot });
            }
        };

        let ctx = CrawlContext::new(owner_id, origin.as_str());

        let result = match self.lifecycle.create(&ctx).await {
            Ok(_) => self.crawl_and_report(&ctx, &origin, usage).await,
            Err(e) => Err(PipelineError::unhandled(Some(ctx.report_id.clone()), e)),
        };

        if let Err(err) = &result {
            error!(report_id = %ctx.report_id, "Crawl failed: {}", err);

            if let Err(e) = self.lifecycle.fail(&ctx, &err.to_string()).await {
                error!(report_id = %ctx.report_id, "Failed to record report failure: {:#}", e);
            }
            if let Err(e) = self.usage.release(owner_id).await {
                error!("Failed to release usage reservation for {}: {:#}", owner_id, e);
            }
        }

        result
    }

    async fn crawl_and_report(
        &self,
        ctx: &CrawlContext,
        origin: &Url,
        usage: UsageSnapshot,
    ) -> Result<CrawlResponse, PipelineError> {
        let unhandled = |e: anyhow::Error| PipelineError::unhandled(Some(ctx.report_id.clone()), e);

        let mut session = self.sessions.open(origin).await.map_err(unhandled)?;

        let crawl = self.scheduler.run(origin.as_str(), &*session).await;

        // The session is released on every path, before the crawl result is inspected
        if let Err(e) = session.close().await {
            warn!(report_id = %ctx.report_id, "Failed to close browser session: {:#}", e);
        }

        let outcome = crawl?;
        if outcome.success_count() == 0 {
            return Err(PipelineError::ZeroPages {
                report_id: ctx.report_id.clone(),
            });
        }

        let analysis = self.analyzer.submit_and_normalize(&outcome.pages).await;
        let report = self
            .lifecycle
            .finalize(ctx, &analysis, &outcome)
            .await
            .map_err(unhandled)?;

        Ok(CrawlResponse {
            success: true,
            data: analysis.report,
            main_url: report.main_url,
            total_scraped: report.total_scraped,
            total_pages_attempted: outcome.total_visited,
            report_id: report.report_id,
            usage,
            analysis: report.analysis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::client::MockAnalyzerTransport;
    use crate::browser::extract::ExtractedPage;
    use crate::cli::config::AnalyzerSettings;
    use crate::crawler::fetcher::{FetchSession, PageFetcher};
    use crate::crawler::task::PageResult;
    use crate::error::{AnalysisError, NetworkErrorKind};
    use crate::keywords;
    use crate::storage::usage::MemoryUsageGate;
    use crate::storage::MemoryReportStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    type Site = HashMap<String, (Vec<String>, String)>;

    struct FakeSession {
        site: Arc<Site>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl PageFetcher for FakeSession {
        async fn fetch(&self, url: &str, depth: u32) -> PageResult {
            match self.site.get(url) {
                Some((links, text)) => PageResult::loaded(
                    url,
                    depth,
                    ExtractedPage {
                        title: format!("Title {}", url),
                        content: vec![text.clone()],
                        links: links.clone(),
                        content_length: text.chars().count(),
                        word_count: text.split_whitespace().count(),
                        keywords: keywords::extract(text, 10),
                    },
                ),
                None => PageResult::failed(url, depth, NetworkErrorKind::ConnectionRefused),
            }
        }
    }

    #[async_trait]
    impl FetchSession for FakeSession {
        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeProvider {
        site: Arc<Site>,
        closed: Arc<AtomicBool>,
        opened: AtomicUsize,
        fail_open: bool,
    }

    impl FakeProvider {
        fn new(pages: &[(&str, &[&str], &str)]) -> Self {
            let site = pages
                .iter()
                .map(|(url, links, text)| {
                    (
                        url.to_string(),
                        (links.iter().map(|l| l.to_string()).collect(), text.to_string()),
                    )
                })
                .collect();
            Self {
                site: Arc::new(site),
                closed: Arc::new(AtomicBool::new(false)),
                opened: AtomicUsize::new(0),
                fail_open: false,
            }
        }

        fn closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionProvider for FakeProvider {
        async fn open(&self, _origin: &Url) -> Result<Box<dyn FetchSession>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                anyhow::bail!("webdriver unavailable");
            }
            Ok(Box::new(FakeSession {
                site: self.site.clone(),
                closed: self.closed.clone(),
            }))
        }
    }

    fn example_site() -> FakeProvider {
        FakeProvider::new(&[
            (
                "https://example.com",
                &["https://example.com/about", "https://example.com/contact"],
                "Keyword research tools for keyword tracking and keyword audits",
            ),
            (
                "https://example.com/about",
                &["https://example.com"],
                "About our keyword research team and research methods",
            ),
        ])
    }

    struct Harness {
        controller: CrawlerController,
        reports: Arc<MemoryReportStore>,
        usage: Arc<MemoryUsageGate>,
    }

    fn harness(provider: Arc<FakeProvider>, analyzer: KeywordAnalyzer, limit: u64) -> Harness {
        let reports = Arc::new(MemoryReportStore::new());
        let usage = Arc::new(MemoryUsageGate::new(limit));
        let limits = CrawlLimits {
            max_depth: 3,
            max_pages: 50,
            politeness_delay: Duration::ZERO,
        };

        Harness {
            controller: CrawlerController::new(
                limits,
                provider,
                Arc::new(analyzer),
                reports.clone(),
                usage.clone(),
            ),
            reports,
            usage,
        }
    }

    fn local_analyzer() -> KeywordAnalyzer {
        KeywordAnalyzer::local_only(AnalyzerSettings::default())
    }

    #[tokio::test]
    async fn test_successful_crawl_completes_report() {
        let provider = Arc::new(example_site());
        let h = harness(provider.clone(), local_analyzer(), 5);

        let response = h.controller.crawl("alice", "https://example.com").await.unwrap();

        assert!(response.success);
        assert_eq!(response.total_scraped, 2);
        assert_eq!(response.total_pages_attempted, 3);
        assert_eq!(response.usage.used, 1);
        assert_eq!(response.analysis.success_count, 2);
        assert_eq!(response.analysis.fail_count, 1);
        assert!(response.analysis.fallback_used);
        assert_eq!(response.data.keywords[0].keyword, "keyword");
        assert!(provider.closed());

        let stored = h.reports.get(&response.report_id, "alice").await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Completed);
        assert_eq!(stored.total_scraped, 2);
        assert_eq!(stored.keywords, response.data.keywords);
        assert!(stored.pages.contains_key("https://example.com"));
    }

    #[tokio::test]
    async fn test_zero_pages_fails_report_and_releases_usage() {
        let provider = Arc::new(FakeProvider::new(&[]));
        let h = harness(provider.clone(), local_analyzer(), 5);

        let err = h.controller.crawl("alice", "https://example.com").await.unwrap_err();

        let report_id = match &err {
            PipelineError::ZeroPages { report_id } => report_id.clone(),
            other => panic!("unexpected error: {:?}", other),
        };
        let stored = h.reports.get(&report_id, "alice").await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Failed);
        assert!(stored.error.is_some());
        assert_eq!(h.usage.current("alice").await.unwrap().used, 0);
        assert!(provider.closed());
    }

    #[tokio::test]
    async fn test_invalid_seed_creates_nothing() {
        let provider = Arc::new(example_site());
        let h = harness(provider.clone(), local_analyzer(), 5);

        let err = h.controller.crawl("alice", "not a url").await.unwrap_err();

        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(h.reports.len().await, 0);
        assert_eq!(h.usage.current("alice").await.unwrap().used, 0);
        assert_eq!(provider.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_usage_limit_denies_before_crawling() {
        let provider = Arc::new(example_site());
        let h = harness(provider.clone(), local_analyzer(), 0);

        let err = h.controller.crawl("alice", "https://example.com").await.unwrap_err();

        match err {
            PipelineError::LimitExceeded { usage } => {
                assert_eq!(usage.limit, 0);
                assert_eq!(usage.remaining, 0);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(h.reports.len().await, 0);
        assert_eq!(provider.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_session_failure_is_unhandled_with_report_id() {
        let mut provider = example_site();
        provider.fail_open = true;
        let h = harness(Arc::new(provider), local_analyzer(), 5);

        let err = h.controller.crawl("alice", "https://example.com").await.unwrap_err();

        assert!(matches!(err, PipelineError::Unhandled { .. }));
        let report_id = err.report_id().unwrap().to_string();
        let stored = h.reports.get(&report_id, "alice").await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Failed);
        assert_eq!(h.usage.current("alice").await.unwrap().used, 0);
    }

    #[tokio::test]
    async fn test_analysis_outage_still_returns_keywords() {
        let mut transport = MockAnalyzerTransport::new();
        transport
            .expect_submit()
            .times(1)
            .returning(|_| Err(AnalysisError::Transport("operation timed out".to_string())));
        let analyzer = KeywordAnalyzer::new(Arc::new(transport), AnalyzerSettings::default());
        let h = harness(Arc::new(example_site()), analyzer, 5);

        let response = h.controller.crawl("alice", "https://example.com").await.unwrap();

        assert!(response.analysis.sent_to_external);
        assert!(response.analysis.fallback_used);
        assert!(!response.data.keywords.is_empty());
        assert!(response.data.error.is_some());
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let store = Arc::new(MemoryReportStore::new());
        let lifecycle = ReportLifecycle::new(store.clone());
        let ctx = CrawlContext::new("alice", "https://example.com/");
        lifecycle.create(&ctx).await.unwrap();

        let outcome = CrawlOutcome {
            pages: vec![PageResult::loaded(
                "https://example.com",
                0,
                ExtractedPage::default(),
            )],
            total_visited: 1,
            stats: Default::default(),
        };
        let mut analysis = local_analyzer().submit_and_normalize(&outcome.pages).await;
        lifecycle.finalize(&ctx, &analysis, &outcome).await.unwrap();

        analysis.report.recommendations = vec!["second".to_string()];
        lifecycle.finalize(&ctx, &analysis, &outcome).await.unwrap();

        assert_eq!(store.len().await, 1);
        let stored = store.get(&ctx.report_id, "alice").await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Completed);
        assert_eq!(stored.recommendations, vec!["second"]);

        // A completed report cannot be failed afterwards
        assert!(lifecycle.fail(&ctx, "late failure").await.is_err());
    }
}

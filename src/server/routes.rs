use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, AppState};

/// Create the API router with all routes
pub fn create_router(app_state: AppState) -> Router {
    let api_v1 = Router::new()
        .route("/health", get(handlers::health))
        .route("/crawl", post(handlers::crawl))
        .route("/reports", get(handlers::list_reports))
        .route(
            "/reports/:report_id",
            get(handlers::get_report).delete(handlers::delete_report),
        )
        .with_state(app_state);

    Router::new().nest("/api/v1", api_v1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::KeywordAnalyzer;
    use crate::browser::extract::ExtractedPage;
    use crate::cli::config::AnalyzerSettings;
    use crate::crawler::fetcher::{FetchSession, PageFetcher, SessionProvider};
    use crate::crawler::scheduler::CrawlLimits;
    use crate::crawler::task::PageResult;
    use crate::crawler::CrawlerController;
    use crate::error::NetworkErrorKind;
    use crate::keywords;
    use crate::server::handlers::OWNER_HEADER;
    use crate::storage::usage::MemoryUsageGate;
    use crate::storage::{MemoryReportStore, Report, ReportStore};
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use url::Url;

    const HOME_TEXT: &str = "Keyword research platform with keyword tracking and keyword reports";

    /// Serves a single home page; every other URL is unreachable
    struct OnePageSession;

    #[async_trait]
    impl PageFetcher for OnePageSession {
        async fn fetch(&self, url: &str, depth: u32) -> PageResult {
            if url.starts_with("https://example.com") && depth == 0 {
                PageResult::loaded(
                    url,
                    depth,
                    ExtractedPage {
                        title: "Home".to_string(),
                        content: vec![HOME_TEXT.to_string()],
                        links: Vec::new(),
                        content_length: HOME_TEXT.len(),
                        word_count: HOME_TEXT.split_whitespace().count(),
                        keywords: keywords::extract(HOME_TEXT, 10),
                    },
                )
            } else {
                PageResult::failed(url, depth, NetworkErrorKind::DnsError)
            }
        }
    }

    #[async_trait]
    impl FetchSession for OnePageSession {
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct OnePageProvider;

    #[async_trait]
    impl SessionProvider for OnePageProvider {
        async fn open(&self, _origin: &Url) -> Result<Box<dyn FetchSession>> {
            Ok(Box::new(OnePageSession))
        }
    }

    fn app(limit: u64) -> (Router, Arc<MemoryReportStore>) {
        let reports = Arc::new(MemoryReportStore::new());
        let controller = CrawlerController::new(
            CrawlLimits {
                max_depth: 1,
                max_pages: 10,
                politeness_delay: Duration::ZERO,
            },
            Arc::new(OnePageProvider),
            Arc::new(KeywordAnalyzer::local_only(AnalyzerSettings::default())),
            reports.clone(),
            Arc::new(MemoryUsageGate::new(limit)),
        );

        let router = create_router(AppState {
            controller: Arc::new(controller),
        });
        (router, reports)
    }

    fn crawl_request(owner: Option<&str>, url: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/crawl")
            .header("content-type", "application/json");
        if let Some(owner) = owner {
            builder = builder.header(OWNER_HEADER, owner);
        }
        builder
            .body(Body::from(serde_json::json!({ "url": url }).to_string()))
            .unwrap()
    }

    fn get_request(owner: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(OWNER_HEADER, owner)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = app(5);
        let response = router
            .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_crawl_returns_report() {
        let (router, reports) = app(5);
        let response = router
            .oneshot(crawl_request(Some("alice"), "https://example.com"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["totalScraped"], 1);
        assert_eq!(body["totalPagesAttempted"], 1);
        assert_eq!(body["usage"]["used"], 1);
        assert_eq!(body["data"]["keywords"][0]["keyword"], "keyword");
        assert_eq!(body["analysis"]["fallbackUsed"], true);

        let report_id = body["reportId"].as_str().unwrap();
        assert!(reports.get(report_id, "alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_crawl_status_codes() {
        let (router, _) = app(5);

        let missing_owner = router
            .clone()
            .oneshot(crawl_request(None, "https://example.com"))
            .await
            .unwrap();
        assert_eq!(missing_owner.status(), StatusCode::UNAUTHORIZED);

        let invalid = router
            .clone()
            .oneshot(crawl_request(Some("alice"), "ftp://example.com"))
            .await
            .unwrap();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let unreachable = router
            .clone()
            .oneshot(crawl_request(Some("alice"), "https://unreachable.test"))
            .await
            .unwrap();
        assert_eq!(unreachable.status(), StatusCode::NOT_FOUND);
        let body = json_body(unreachable).await;
        assert_eq!(body["success"], false);
        assert!(body["reportId"].is_string());
    }

    #[tokio::test]
    async fn test_usage_limit_is_forbidden() {
        let (router, _) = app(0);
        let response = router
            .oneshot(crawl_request(Some("alice"), "https://example.com"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["usage"]["limit"], 0);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_report_queries_are_owner_scoped() {
        let (router, reports) = app(5);
        reports
            .upsert(&Report::processing("r1", "alice", "https://example.com/"))
            .await
            .unwrap();

        let found = router
            .clone()
            .oneshot(get_request("alice", "/api/v1/reports/r1"))
            .await
            .unwrap();
        assert_eq!(found.status(), StatusCode::OK);
        assert_eq!(json_body(found).await["status"], "processing");

        let hidden = router
            .clone()
            .oneshot(get_request("bob", "/api/v1/reports/r1"))
            .await
            .unwrap();
        assert_eq!(hidden.status(), StatusCode::NOT_FOUND);

        let listing = router
            .clone()
            .oneshot(get_request("alice", "/api/v1/reports?status=processing&limit=5"))
            .await
            .unwrap();
        assert_eq!(listing.status(), StatusCode::OK);
        let body = json_body(listing).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["limit"], 5);

        let bad_filter = router
            .clone()
            .oneshot(get_request("alice", "/api/v1/reports?status=archived"))
            .await
            .unwrap();
        assert_eq!(bad_filter.status(), StatusCode::BAD_REQUEST);

        let deleted = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/reports/r1")
                    .header(OWNER_HEADER, "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);
        assert!(reports.get("r1", "alice").await.unwrap().is_none());
    }
}

//! HTTP API request handlers

use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::crawler::CrawlerController;
use crate::error::PipelineError;
use crate::storage::{ReportQuery, ReportStatus, UsageSnapshot};

/// Header carrying the authenticated owner id, set by the auth layer in front of us
pub const OWNER_HEADER: &str = "x-owner-id";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<CrawlerController>,
}

/// Owner of the request, taken from [`OWNER_HEADER`]
pub struct Owner(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|owner| !owner.is_empty())
            .map(|owner| Owner(owner.to_string()))
            .ok_or_else(|| {
                ErrorBody::error("Missing owner identity").into_response_with(StatusCode::UNAUTHORIZED)
            })
    }
}

/// Failure body shared by every endpoint
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSnapshot>,
}

impl ErrorBody {
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            message: None,
            report_id: None,
            usage: None,
        }
    }

    fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

fn internal_error(err: anyhow::Error) -> Response {
    error!("Request failed: {:#}", err);
    ErrorBody::error("Internal server error").into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        match self {
            PipelineError::Validation(message) => {
                ErrorBody::error(message).into_response_with(StatusCode::BAD_REQUEST)
            }
            PipelineError::LimitExceeded { usage } => ErrorBody {
                success: false,
                error: None,
                message: Some(format!(
                    "Crawl limit reached: {} of {} crawls used",
                    usage.used, usage.limit
                )),
                report_id: None,
                usage: Some(usage),
            }
            .into_response_with(StatusCode::FORBIDDEN),
            PipelineError::ZeroPages { report_id } => ErrorBody {
                report_id: Some(report_id),
                ..ErrorBody::error("No pages could be crawled from this URL")
            }
            .into_response_with(StatusCode::NOT_FOUND),
            PipelineError::Unhandled { report_id, source } => {
                error!("Crawl failed unexpectedly: {:#}", source);
                ErrorBody {
                    report_id,
                    ..ErrorBody::error("Crawl failed due to an internal error")
                }
                .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CrawlRequest {
    pub url: String,
}

/// Crawl a site and return its keyword report
pub async fn crawl(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Json(request): Json<CrawlRequest>,
) -> Response {
    debug!("HTTP crawl request from {} for {}", owner, request.url);

    match state.controller.crawl(&owner, &request.url).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

/// List the owner's reports, newest first
pub async fn list_reports(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Query(params): Query<ListParams>,
) -> Response {
    let status = match params.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => match raw.parse::<ReportStatus>() {
            Ok(status) => Some(status),
            Err(e) => return ErrorBody::error(e.to_string()).into_response_with(StatusCode::BAD_REQUEST),
        },
        None => None,
    };

    let defaults = ReportQuery::default();
    let query = ReportQuery {
        page: params.page.unwrap_or(defaults.page),
        limit: params.limit.unwrap_or(defaults.limit),
        status,
    };

    match state.controller.reports().list(&owner, &query).await {
        Ok(listing) => (StatusCode::OK, Json(listing)).into_response(),
        Err(e) => internal_error(e),
    }
}

/// Fetch one report
pub async fn get_report(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(report_id): Path<String>,
) -> Response {
    match state.controller.reports().get(&report_id, &owner).await {
        Ok(Some(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(None) => ErrorBody::error("Report not found").into_response_with(StatusCode::NOT_FOUND),
        Err(e) => internal_error(e),
    }
}

/// Delete one report
pub async fn delete_report(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(report_id): Path<String>,
) -> Response {
    match state.controller.reports().delete(&report_id, &owner).await {
        Ok(true) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "reportId": report_id })),
        )
            .into_response(),
        Ok(false) => ErrorBody::error("Report not found").into_response_with(StatusCode::NOT_FOUND),
        Err(e) => internal_error(e),
    }
}

/// Liveness probe
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

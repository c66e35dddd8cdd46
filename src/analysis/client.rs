use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cli::config::AnalyzerSettings;
use crate::crawler::task::PageResult;
use crate::error::AnalysisError;
use crate::keywords::KeywordCount;

pub const CLIENT_ID_HEADER: &str = "X-Client-Id";
pub const ANALYSIS_TYPE_HEADER: &str = "X-Analysis-Type";

/// One page as the analysis service sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePayload {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub word_count: usize,
    pub content_length: usize,
    pub keywords: Vec<KeywordCount>,
}

/// Bounded request body posted to the analysis service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    pub analysis_type: String,
    pub timestamp: DateTime<Utc>,
    pub total_pages: usize,
    pub pages: Vec<PagePayload>,
}

impl AnalysisPayload {
    /// Shape pages into a payload, joining at most `snippet_items` snippets per page
    pub fn build(pages: &[&PageResult], analysis_type: &str, snippet_items: usize) -> Self {
        let pages: Vec<PagePayload> = pages
            .iter()
            .map(|page| PagePayload {
                url: page.url.clone(),
                title: page.title.clone(),
                snippet: page
                    .content
                    .iter()
                    .take(snippet_items)
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(" "),
                word_count: page.word_count,
                content_length: page.content_length,
                keywords: page.keywords.clone(),
            })
            .collect();

        Self {
            analysis_type: analysis_type.to_string(),
            timestamp: Utc::now(),
            total_pages: pages.len(),
            pages,
        }
    }
}

/// Delivery of an analysis payload; returns the raw reply body
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalyzerTransport: Send + Sync {
    async fn submit(&self, payload: &AnalysisPayload) -> Result<String, AnalysisError>;
}

/// HTTP client for the external keyword analysis service
pub struct AnalyzerClient {
    client: Client,
    endpoint: String,
    client_id: String,
    analysis_type: String,
}

impl AnalyzerClient {
    pub fn new(settings: &AnalyzerSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to create analysis HTTP client")?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            client_id: settings.client_id.clone(),
            analysis_type: settings.analysis_type.clone(),
        })
    }
}

#[async_trait]
impl AnalyzerTransport for AnalyzerClient {
    async fn submit(&self, payload: &AnalysisPayload) -> Result<String, AnalysisError> {
        debug!(
            "Sending {} pages to analysis service at {}",
            payload.total_pages, self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(CLIENT_ID_HEADER, &self.client_id)
            .header(ANALYSIS_TYPE_HEADER, &self.analysis_type)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                warn!("Analysis request failed: {}", e);
                AnalysisError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Analysis service returned status: {}", status);
            return Err(AnalysisError::Status {
                code: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        debug!("Received {} bytes from analysis service", body.len());
        Ok(body)
    }
}

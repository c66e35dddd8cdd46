pub mod memory;
pub mod mongo;
pub mod postgres;
pub mod usage;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::report::{KeywordEntry, KeywordSummary, PageInsight};
use crate::cli::config::ReportStoreSettings;

// Re-export common types
pub use memory::MemoryReportStore;
pub use mongo::MongoReportStore;
pub use postgres::PostgresReportStore;
pub use usage::{UsageDecision, UsageGate, UsageGateFactory, UsageSnapshot};

/// Lifecycle state of a persisted report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Transitions only move forward out of `processing`; rewriting a
    /// terminal state with itself is allowed so finalizing is idempotent.
    pub fn can_become(&self, next: ReportStatus) -> bool {
        *self == Self::Processing || *self == next
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => anyhow::bail!("Unknown report status: {}", other),
        }
    }
}

/// How the keyword data of a report was produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMeta {
    pub sent_to_external: bool,
    pub data_optimized: bool,
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_error: Option<String>,
    pub success_count: usize,
    pub fail_count: usize,
}

/// A persisted crawl report, unique per (report_id, owner_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub report_id: String,
    pub owner_id: String,
    pub main_url: String,
    pub total_scraped: usize,
    pub status: ReportStatus,
    pub keywords: Vec<KeywordEntry>,
    pub summary: KeywordSummary,
    pub recommendations: Vec<String>,
    pub pages: BTreeMap<String, PageInsight>,
    pub analysis: AnalysisMeta,

    /// Failure reason for `failed` reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub processing_time_ms: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    /// A fresh report in the `processing` state
    pub fn processing(report_id: &str, owner_id: &str, main_url: &str) -> Self {
        let now = Utc::now();
        Self {
            report_id: report_id.to_string(),
            owner_id: owner_id.to_string(),
            main_url: main_url.to_string(),
            total_scraped: 0,
            status: ReportStatus::Processing,
            keywords: Vec::new(),
            summary: KeywordSummary::default(),
            recommendations: Vec::new(),
            pages: BTreeMap::new(),
            analysis: AnalysisMeta::default(),
            error: None,
            processing_time_ms: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Paging and filtering for report listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportQuery {
    /// 1-based page number
    pub page: u32,
    pub limit: u32,
    pub status: Option<ReportStatus>,
}

impl Default for ReportQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            status: None,
        }
    }
}

impl ReportQuery {
    pub const MAX_LIMIT: u32 = 100;

    /// Clamp page and limit into usable bounds
    pub fn normalized(&self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
            status: self.status,
        }
    }

    pub fn offset(&self) -> u64 {
        let query = self.normalized();
        (query.page as u64 - 1) * query.limit as u64
    }
}

/// One page of a report listing, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportListing {
    pub reports: Vec<Report>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// Persistence for crawl reports
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Insert or overwrite the report keyed by (report_id, owner_id).
    /// Fails when the stored status cannot become the new one.
    async fn upsert(&self, report: &Report) -> Result<()>;

    async fn get(&self, report_id: &str, owner_id: &str) -> Result<Option<Report>>;

    async fn list(&self, owner_id: &str, query: &ReportQuery) -> Result<ReportListing>;

    /// Returns false when no such report exists
    async fn delete(&self, report_id: &str, owner_id: &str) -> Result<bool>;
}

/// Factory for creating a ReportStore implementation
pub struct ReportStoreFactory;

impl ReportStoreFactory {
    /// Create a new ReportStore instance based on the settings
    pub async fn create(settings: &ReportStoreSettings) -> Result<Arc<dyn ReportStore>> {
        match settings.storage_type.as_str() {
            "postgresql" => {
                let store = PostgresReportStore::new(settings).await?;
                Ok(Arc::new(store))
            }
            "mongodb" => {
                let store = MongoReportStore::new(settings).await?;
                Ok(Arc::new(store))
            }
            "memory" => Ok(Arc::new(MemoryReportStore::new())),
            _ => {
                anyhow::bail!("Unsupported report storage type: {}", settings.storage_type);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_are_monotonic() {
        use ReportStatus::*;

        assert!(Processing.can_become(Completed));
        assert!(Processing.can_become(Failed));
        assert!(Completed.can_become(Completed));
        assert!(Failed.can_become(Failed));
        assert!(!Completed.can_become(Processing));
        assert!(!Completed.can_become(Failed));
        assert!(!Failed.can_become(Completed));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Completed".parse::<ReportStatus>().unwrap(), ReportStatus::Completed);
        assert!("archived".parse::<ReportStatus>().is_err());
        assert_eq!(serde_json::to_value(ReportStatus::Failed).unwrap(), "failed");
    }

    #[test]
    fn test_query_bounds() {
        let query = ReportQuery {
            page: 0,
            limit: 1000,
            status: None,
        };

        assert_eq!(query.normalized().page, 1);
        assert_eq!(query.normalized().limit, ReportQuery::MAX_LIMIT);
        assert_eq!(query.offset(), 0);

        let third = ReportQuery {
            page: 3,
            limit: 10,
            status: None,
        };
        assert_eq!(third.offset(), 20);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = Report::processing("r1", "owner", "https://example.com");
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["reportId"], "r1");
        assert_eq!(json["status"], "processing");
        assert_eq!(json["totalScraped"], 0);
        assert!(json.get("error").is_none());
    }
}

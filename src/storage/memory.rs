use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::storage::{Report, ReportListing, ReportQuery, ReportStore};

/// In-process report store used for tests and the `memory` storage type
#[derive(Default)]
pub struct MemoryReportStore {
    reports: RwLock<HashMap<(String, String), Report>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.reports.read().await.len()
    }
}

fn key(report_id: &str, owner_id: &str) -> (String, String) {
    (report_id.to_string(), owner_id.to_string())
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn upsert(&self, report: &Report) -> Result<()> {
        let mut reports = self.reports.write().await;
        let key = key(&report.report_id, &report.owner_id);

        if let Some(existing) = reports.get(&key) {
            if !existing.status.can_become(report.status) {
                anyhow::bail!(
                    "Report {} is already {} and cannot become {}",
                    report.report_id,
                    existing.status,
                    report.status
                );
            }
        }

        reports.insert(key, report.clone());
        debug!("Stored report {} ({})", report.report_id, report.status);
        Ok(())
    }

    async fn get(&self, report_id: &str, owner_id: &str) -> Result<Option<Report>> {
        Ok(self.reports.read().await.get(&key(report_id, owner_id)).cloned())
    }

    async fn list(&self, owner_id: &str, query: &ReportQuery) -> Result<ReportListing> {
        let query = query.normalized();
        let reports = self.reports.read().await;

        let mut matching: Vec<&Report> = reports
            .values()
            .filter(|report| report.owner_id == owner_id)
            .filter(|report| query.status.map_or(true, |status| report.status == status))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();

        Ok(ReportListing {
            reports: page,
            total,
            page: query.page,
            limit: query.limit,
        })
    }

    async fn delete(&self, report_id: &str, owner_id: &str) -> Result<bool> {
        Ok(self.reports.write().await.remove(&key(report_id, owner_id)).is_some())
    }
}

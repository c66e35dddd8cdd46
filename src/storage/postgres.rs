use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use crate::cli::config::ReportStoreSettings;
use crate::storage::{Report, ReportListing, ReportQuery, ReportStore};

/// PostgreSQL implementation of ReportStore.
///
/// The full report lives in a JSONB column; the columns beside it exist for
/// lookups, filtering and ordering.
pub struct PostgresReportStore {
    /// PostgreSQL connection pool
    pool: Pool<Postgres>,

    table: String,
}

impl PostgresReportStore {
    pub async fn new(settings: &ReportStoreSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&settings.connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let store = Self {
            pool,
            table: sanitize_identifier(&settings.table_name),
        };
        store.ensure_table().await?;

        debug!("Connected to PostgreSQL report store ({})", store.table);
        Ok(store)
    }

    async fn ensure_table(&self) -> Result<()> {
        let query = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                report_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                main_url TEXT NOT NULL,
                status TEXT NOT NULL,
                total_scraped BIGINT NOT NULL DEFAULT 0,
                processing_time_ms BIGINT NOT NULL DEFAULT 0,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (report_id, owner_id)
            )",
            self.table
        );

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .context(format!("Failed to create reports table: {}", self.table))?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS {table}_owner_created_idx ON {table} (owner_id, created_at DESC)",
            table = self.table
        );
        sqlx::query(&index)
            .execute(&self.pool)
            .await
            .context("Failed to create reports index")?;

        debug!("Ensured reports table exists: {}", self.table);
        Ok(())
    }
}

/// Keep table names to identifier characters; they are interpolated into SQL
fn sanitize_identifier(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if cleaned.is_empty() {
        "keyword_reports".to_string()
    } else {
        cleaned.to_lowercase()
    }
}

#[async_trait]
impl ReportStore for PostgresReportStore {
    async fn upsert(&self, report: &Report) -> Result<()> {
        // A terminal row only accepts a rewrite with the same status
        let query = format!(
            "INSERT INTO {table} (report_id, owner_id, main_url, status, total_scraped, processing_time_ms, data, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (report_id, owner_id) DO UPDATE
             SET main_url = EXCLUDED.main_url,
                 status = EXCLUDED.status,
                 total_scraped = EXCLUDED.total_scraped,
                 processing_time_ms = EXCLUDED.processing_time_ms,
                 data = EXCLUDED.data,
                 updated_at = EXCLUDED.updated_at
             WHERE {table}.status = 'processing' OR {table}.status = EXCLUDED.status",
            table = self.table
        );

        let result = sqlx::query(&query)
            .bind(&report.report_id)
            .bind(&report.owner_id)
            .bind(&report.main_url)
            .bind(report.status.as_str())
            .bind(report.total_scraped as i64)
            .bind(report.processing_time_ms as i64)
            .bind(Json(report))
            .bind(report.created_at)
            .bind(report.updated_at)
            .execute(&self.pool)
            .await
            .context("Failed to store report in PostgreSQL")?;

        if result.rows_affected() == 0 {
            anyhow::bail!(
                "Report {} is already in a terminal state and cannot become {}",
                report.report_id,
                report.status
            );
        }

        debug!("Stored report {} ({})", report.report_id, report.status);
        Ok(())
    }

    async fn get(&self, report_id: &str, owner_id: &str) -> Result<Option<Report>> {
        let query = format!(
            "SELECT data FROM {} WHERE report_id = $1 AND owner_id = $2",
            self.table
        );

        let row = sqlx::query(&query)
            .bind(report_id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get report from PostgreSQL")?;

        match row {
            Some(row) => {
                let data: Json<Report> = row.try_get("data").context("Failed to decode report")?;
                Ok(Some(data.0))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, owner_id: &str, query: &ReportQuery) -> Result<ReportListing> {
        let query = query.normalized();
        let status = query.status.map(|status| status.as_str());

        let count_query = format!(
            "SELECT COUNT(*) FROM {} WHERE owner_id = $1 AND ($2::TEXT IS NULL OR status = $2)",
            self.table
        );
        let total: i64 = sqlx::query_scalar(&count_query)
            .bind(owner_id)
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count reports in PostgreSQL")?;

        let list_query = format!(
            "SELECT data FROM {} WHERE owner_id = $1 AND ($2::TEXT IS NULL OR status = $2)
             ORDER BY created_at DESC LIMIT $3 OFFSET $4",
            self.table
        );
        let rows = sqlx::query(&list_query)
            .bind(owner_id)
            .bind(status)
            .bind(query.limit as i64)
            .bind(query.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list reports from PostgreSQL")?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in rows {
            let data: Json<Report> = row.try_get("data").context("Failed to decode report")?;
            reports.push(data.0);
        }

        Ok(ReportListing {
            reports,
            total: total.max(0) as u64,
            page: query.page,
            limit: query.limit,
        })
    }

    async fn delete(&self, report_id: &str, owner_id: &str) -> Result<bool> {
        let query = format!(
            "DELETE FROM {} WHERE report_id = $1 AND owner_id = $2",
            self.table
        );

        let result = sqlx::query(&query)
            .bind(report_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete report from PostgreSQL")?;

        debug!("Deleted report {} for owner {}", report_id, owner_id);
        Ok(result.rows_affected() > 0)
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, FindOptions, IndexOptions, ReplaceOptions};
use mongodb::{Client, Collection, IndexModel};
use tracing::debug;

use crate::cli::config::ReportStoreSettings;
use crate::storage::{Report, ReportListing, ReportQuery, ReportStatus, ReportStore};

/// MongoDB implementation of ReportStore
pub struct MongoReportStore {
    collection: Collection<Report>,
}

impl MongoReportStore {
    pub async fn new(settings: &ReportStoreSettings) -> Result<Self> {
        let client_options = ClientOptions::parse(&settings.connection_string)
            .await
            .context("Failed to parse MongoDB connection string")?;

        let client = Client::with_options(client_options)
            .context("Failed to create MongoDB client")?;

        let database = client.database(&settings.database_name);
        database
            .list_collection_names(None)
            .await
            .context("Failed to connect to MongoDB")?;

        let collection = database.collection::<Report>(&settings.table_name);

        // The unique key turns a forbidden status change into a duplicate key error
        let index = IndexModel::builder()
            .keys(doc! { "reportId": 1, "ownerId": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        collection
            .create_index(index, None)
            .await
            .context("Failed to create report index")?;

        debug!(
            "Connected to MongoDB report store: {}.{}",
            settings.database_name, settings.table_name
        );

        Ok(Self { collection })
    }
}

fn key_filter(report_id: &str, owner_id: &str) -> Document {
    doc! { "reportId": report_id, "ownerId": owner_id }
}

/// Statuses a stored report may have for `next` to overwrite it
fn replaceable_statuses(next: ReportStatus) -> Vec<&'static str> {
    let mut statuses = vec![ReportStatus::Processing.as_str()];
    if next != ReportStatus::Processing {
        statuses.push(next.as_str());
    }
    statuses
}

fn owner_filter(owner_id: &str, status: Option<ReportStatus>) -> Document {
    let mut filter = doc! { "ownerId": owner_id };
    if let Some(status) = status {
        filter.insert("status", status.as_str());
    }
    filter
}

#[async_trait]
impl ReportStore for MongoReportStore {
    async fn upsert(&self, report: &Report) -> Result<()> {
        let mut filter = key_filter(&report.report_id, &report.owner_id);
        filter.insert("status", doc! { "$in": replaceable_statuses(report.status) });

        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection
            .replace_one(filter, report, options)
            .await
            .context(format!(
                "Failed to store report {} as {} in MongoDB",
                report.report_id, report.status
            ))?;

        debug!("Stored report {} ({})", report.report_id, report.status);
        Ok(())
    }

    async fn get(&self, report_id: &str, owner_id: &str) -> Result<Option<Report>> {
        self.collection
            .find_one(key_filter(report_id, owner_id), None)
            .await
            .context("Failed to get report from MongoDB")
    }

    async fn list(&self, owner_id: &str, query: &ReportQuery) -> Result<ReportListing> {
        let query = query.normalized();
        let filter = owner_filter(owner_id, query.status);

        let total = self
            .collection
            .count_documents(filter.clone(), None)
            .await
            .context("Failed to count reports in MongoDB")?;

        let options = FindOptions::builder()
            .sort(doc! { "createdAt": -1 })
            .skip(query.offset())
            .limit(query.limit as i64)
            .build();

        let reports: Vec<Report> = self
            .collection
            .find(filter, options)
            .await
            .context("Failed to list reports from MongoDB")?
            .try_collect()
            .await
            .context("Failed to read reports from MongoDB")?;

        Ok(ReportListing {
            reports,
            total,
            page: query.page,
            limit: query.limit,
        })
    }

    async fn delete(&self, report_id: &str, owner_id: &str) -> Result<bool> {
        let result = self
            .collection
            .delete_one(key_filter(report_id, owner_id), None)
            .await
            .context("Failed to delete report from MongoDB")?;

        debug!("Deleted report {} for owner {}", report_id, owner_id);
        Ok(result.deleted_count > 0)
    }
}

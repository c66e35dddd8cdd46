use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::config::CrawlerConfig;
use crate::crawler::controller::CrawlerController;
use crate::server::HttpServer;
use crate::storage::{ReportQuery, ReportStatus, ReportStore, ReportStoreFactory};

async fn report_store() -> Result<Arc<dyn ReportStore>> {
    let config = CrawlerConfig::load_default()?;
    ReportStoreFactory::create(&config.storage.reports).await
}

/// Crawl a site and print its keyword report
pub async fn crawl(
    url: String,
    owner: String,
    profile: String,
    depth: Option<u32>,
    limit: Option<u32>,
    json: bool,
) -> Result<()> {
    // Load the specified profile configuration
    let mut config = CrawlerConfig::load_profile(&profile)
        .context(format!("Failed to load profile: {}", profile))?;

    // Override configuration with command line parameters if provided
    if let Some(d) = depth {
        config.crawler.max_depth = d;
    }

    if let Some(l) = limit {
        config.crawler.max_pages = l;
    }

    let controller = CrawlerController::from_config(&config).await?;
    let response = match controller.crawl(&owner, &url).await {
        Ok(response) => response,
        Err(err) => {
            if let Some(report_id) = err.report_id() {
                println!("Report ID: {} (failed)", report_id);
            }
            return Err(err.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("Report ID: {}", response.report_id);
    println!("Site: {}", response.main_url);
    println!(
        "Pages: {} crawled of {} attempted",
        response.total_scraped, response.total_pages_attempted
    );
    println!(
        "Usage: {}/{} ({} remaining)",
        response.usage.used, response.usage.limit, response.usage.remaining
    );
    if response.analysis.fallback_used {
        println!("Keywords derived locally; external analysis was unavailable");
    }

    println!("Top keywords:");
    for entry in response.data.keywords.iter().take(10) {
        println!("  - {} ({:.0})", entry.keyword, entry.relevance_score);
    }

    if !response.data.recommendations.is_empty() {
        println!("Recommendations:");
        for recommendation in &response.data.recommendations {
            println!("  - {}", recommendation);
        }
    }

    Ok(())
}

/// Show the status of a report
pub async fn status(report_id: String, owner: String) -> Result<()> {
    let store = report_store().await?;
    let report = store
        .get(&report_id, &owner)
        .await?
        .context(format!("Report not found: {}", report_id))?;

    println!("Report ID: {}", report.report_id);
    println!("Status: {}", report.status);
    println!("Site: {}", report.main_url);
    println!("Pages Crawled: {}", report.total_scraped);
    println!("Keywords: {}", report.keywords.len());
    println!("Created: {}", report.created_at);
    println!("Last Updated: {}", report.updated_at);

    if let Some(error) = &report.error {
        println!("Error: {}", error);
    }

    Ok(())
}

/// List an owner's reports
pub async fn list(owner: String, page: u32, limit: u32, status: Option<String>) -> Result<()> {
    let status = status
        .map(|raw| raw.parse::<ReportStatus>())
        .transpose()?;

    let store = report_store().await?;
    let listing = store.list(&owner, &ReportQuery { page, limit, status }).await?;

    println!(
        "Reports {} of page {} ({} total):",
        listing.reports.len(),
        listing.page,
        listing.total
    );
    for report in &listing.reports {
        println!(
            "  {}  {:<10}  {}  {}",
            report.report_id, report.status, report.created_at, report.main_url
        );
    }

    Ok(())
}

/// Delete a report
pub async fn delete(report_id: String, owner: String) -> Result<()> {
    let store = report_store().await?;

    if store.delete(&report_id, &owner).await? {
        println!("Deleted report: {}", report_id);
    } else {
        anyhow::bail!("Report not found: {}", report_id);
    }

    Ok(())
}

/// Export a report as JSON
pub async fn export(report_id: String, owner: String, output: Option<PathBuf>) -> Result<()> {
    let store = report_store().await?;
    let report = store
        .get(&report_id, &owner)
        .await?
        .context(format!("Report not found: {}", report_id))?;

    if report.status != ReportStatus::Completed {
        warn!("Report is {}, data may be incomplete", report.status);
    }

    let output_path = output.unwrap_or_else(|| PathBuf::from(format!("{}.json", report_id)));

    let contents = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    tokio::fs::write(&output_path, contents)
        .await
        .context(format!("Failed to write {}", output_path.display()))?;

    info!("Report exported to: {}", output_path.display());

    Ok(())
}

/// Run the HTTP API until interrupted
pub async fn serve(addr: Option<String>) -> Result<()> {
    let mut config = CrawlerConfig::load_default()?;
    if let Some(addr) = addr {
        config.server.listen_addr = addr;
    }

    let controller = Arc::new(CrawlerController::from_config(&config).await?);
    HttpServer::new(config.server.clone(), controller).run().await
}

/// List all available configuration profiles
pub async fn list_profiles() -> Result<()> {
    let profiles = CrawlerConfig::list_profiles().await?;

    println!("Available configuration profiles:");
    for profile in profiles {
        println!("  - {}", profile);
    }

    Ok(())
}

/// Manage a specific configuration profile
pub async fn manage_profile(profile_name: String) -> Result<()> {
    match CrawlerConfig::load_profile(&profile_name) {
        Ok(config) => {
            println!("Profile: {}", profile_name);
            println!("{}", serde_yaml::to_string(&config)?);
        }
        Err(_) => {
            // Profile doesn't exist, create a new one
            warn!("Profile '{}' does not exist. Creating a default profile.", profile_name);
            let config = CrawlerConfig::default();
            config.save_as_profile(&profile_name).await?;
            println!("Created default profile: {}", profile_name);
        }
    }

    Ok(())
}

/// Show the current configuration
pub async fn show_config() -> Result<()> {
    let config = CrawlerConfig::load_default()?;
    println!("Current configuration:");
    println!("{}", serde_yaml::to_string(&config)?);

    Ok(())
}

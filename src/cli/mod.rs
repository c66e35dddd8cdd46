pub mod commands;
pub mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to a file; without a path the platform data dir is used
    #[arg(long, global = true, num_args = 0..=1, value_name = "PATH")]
    pub log_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a site and build its keyword report
    Crawl {
        /// Seed URL to start crawling from
        #[arg(required = true)]
        url: String,

        /// Owner the report and usage are charged to
        #[arg(short, long, default_value = "local")]
        owner: String,

        /// Configuration profile to use
        #[arg(short, long, default_value = "default")]
        profile: String,

        /// Maximum crawling depth
        #[arg(short, long)]
        depth: Option<u32>,

        /// Maximum number of pages to crawl
        #[arg(short, long)]
        limit: Option<u32>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the status of a report
    Status {
        #[arg(required = true)]
        report_id: String,

        #[arg(short, long, default_value = "local")]
        owner: String,
    },

    /// List reports, newest first
    List {
        #[arg(short, long, default_value = "local")]
        owner: String,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(short, long, default_value_t = 20)]
        limit: u32,

        /// Only reports in this status (processing, completed, failed)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Delete a report
    Delete {
        #[arg(required = true)]
        report_id: String,

        #[arg(short, long, default_value = "local")]
        owner: String,
    },

    /// Export a report as JSON
    Export {
        #[arg(required = true)]
        report_id: String,

        #[arg(short, long, default_value = "local")]
        owner: String,

        /// Output file path
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run the HTTP API
    Serve {
        /// Listen address, overrides the configured one
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Manage configuration profiles
    Config {
        /// Profile name to manage
        #[arg(required = false)]
        profile: Option<String>,

        /// List all available profiles
        #[arg(short, long)]
        list: bool,
    },
}

impl Cli {
    /// Resolved log file, if file logging was requested
    pub fn log_file(&self) -> Option<PathBuf> {
        self.log_file
            .clone()
            .map(|path| path.unwrap_or_else(crate::utils::default_log_file))
    }
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Crawl {
            url,
            owner,
            profile,
            depth,
            limit,
            json,
        } => {
            info!("Starting crawl on {} with profile {}", url, profile);
            commands::crawl(url, owner, profile, depth, limit, json).await
        }
        Commands::Status { report_id, owner } => {
            info!("Checking status for report {}", report_id);
            commands::status(report_id, owner).await
        }
        Commands::List {
            owner,
            page,
            limit,
            status,
        } => commands::list(owner, page, limit, status).await,
        Commands::Delete { report_id, owner } => {
            info!("Deleting report {}", report_id);
            commands::delete(report_id, owner).await
        }
        Commands::Export {
            report_id,
            owner,
            output,
        } => {
            info!("Exporting report {}", report_id);
            commands::export(report_id, owner, output).await
        }
        Commands::Serve { addr } => commands::serve(addr).await,
        Commands::Config { profile, list } => {
            if list {
                info!("Listing all configuration profiles");
                commands::list_profiles().await
            } else if let Some(profile_name) = profile {
                info!("Managing configuration profile: {}", profile_name);
                commands::manage_profile(profile_name).await
            } else {
                info!("Showing current configuration");
                commands::show_config().await
            }
        }
    }
}

use anyhow::Result;
use tracing::{error, info};

mod analysis;
mod browser;
mod cli;
mod crawler;
mod error;
mod keywords;
mod server;
mod storage;
mod utils;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = cli::parse_args();

    utils::init_logging(args.verbose, args.log_file())?;

    info!("Starting Keyword Crawler v{}", env!("CARGO_PKG_VERSION"));

    // Process commands
    match cli::process_command(args).await {
        Ok(_) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            Err(e)
        }
    }
}

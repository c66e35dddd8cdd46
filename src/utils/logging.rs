use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the filter: our crate at info (debug when verbose), dependencies at warn.
/// `RUST_LOG` directives are applied first.
pub fn env_filter(verbose: bool) -> Result<EnvFilter> {
    let level = if verbose { "debug" } else { "info" };

    Ok(EnvFilter::from_default_env()
        .add_directive(format!("keyword_crawler={}", level).parse()?)
        .add_directive("warn".parse()?))
}

/// Initialize the logging system
pub fn init_logging(verbose: bool, log_file: Option<PathBuf>) -> Result<()> {
    let env_filter = env_filter(verbose)?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    if let Some(log_file) = log_file {
        if let Some(parent) = log_file.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create log directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context(format!("Failed to open log file: {}", log_file.display()))?;

        let file_layer = fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(Mutex::new(file));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize logging")?;
    }

    Ok(())
}

/// Create a default log file path
pub fn default_log_file() -> PathBuf {
    let mut path = if let Some(proj_dirs) =
        directories::ProjectDirs::from("com", "keyword-crawler", "keyword-crawler")
    {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from("./logs")
    };

    path.push("keyword-crawler.log");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_builds_for_both_levels() {
        assert!(env_filter(false).is_ok());
        assert!(env_filter(true).is_ok());
    }

    #[test]
    fn test_default_log_file_name() {
        assert!(default_log_file().ends_with("keyword-crawler.log"));
    }
}

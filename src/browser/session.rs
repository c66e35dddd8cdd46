use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::prelude::*;
use thirtyfour::ChromiumLikeCapabilities;
use tracing::{debug, error, warn};
use url::Url;

use crate::browser::extract::{extract_page, ExtractionLimits};
use crate::browser::fingerprint::{primary_language, FingerprintManager};
use crate::cli::config::{BrowserFingerprint, BrowserSettings, CrawlerSettings};
use crate::crawler::fetcher::{FetchSession, PageFetcher, SessionProvider};
use crate::crawler::task::PageResult;
use crate::error::NetworkErrorKind;

/// One WebDriver session, shared by every page of a single crawl
pub struct BrowserSession {
    /// WebDriver instance
    driver: Option<WebDriver>,

    /// Seed URL; links are kept only when they share its origin
    origin: Url,

    limits: ExtractionLimits,
}

impl BrowserSession {
    /// Start a browser configured for crawling: desktop identity, bounded
    /// navigation time and non-document resources blocked.
    pub async fn start(
        settings: &BrowserSettings,
        fingerprint: &BrowserFingerprint,
        origin: Url,
        limits: ExtractionLimits,
        navigation_timeout: Duration,
    ) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();

        caps.add_arg(&format!("--user-agent={}", fingerprint.user_agent))?;
        caps.add_arg(&format!("--lang={}", primary_language(&fingerprint.accept_language)))?;
        caps.add_arg(&format!(
            "--window-size={},{}",
            settings.viewport.width, settings.viewport.height
        ))?;
        caps.add_arg("--disable-dev-shm-usage")?;
        caps.add_arg("--no-sandbox")?;

        if settings.headless {
            caps.set_headless()?;
        }

        let driver = WebDriver::new(&settings.webdriver_url, caps)
            .await
            .context(format!("Failed to connect to WebDriver at {}", settings.webdriver_url))?;

        driver
            .set_page_load_timeout(navigation_timeout)
            .await
            .context("Failed to set page load timeout")?;

        let session = Self {
            driver: Some(driver),
            origin,
            limits,
        };

        if let Err(e) = session.configure_network(settings, fingerprint).await {
            // Crawling still works without request blocking, only slower
            warn!("Failed to configure browser network rules: {:#}", e);
        }

        debug!("Browser session started with fingerprint: {}", fingerprint.name);
        Ok(session)
    }

    async fn configure_network(
        &self,
        settings: &BrowserSettings,
        fingerprint: &BrowserFingerprint,
    ) -> Result<()> {
        let driver = self.driver()?;
        let dev_tools = ChromeDevTools::new(driver.handle.clone());

        dev_tools
            .execute_cdp("Network.enable")
            .await
            .context("Failed to enable network domain")?;

        dev_tools
            .execute_cdp_with_params(
                "Network.setUserAgentOverride",
                json!({
                    "userAgent": fingerprint.user_agent,
                    "acceptLanguage": fingerprint.accept_language,
                    "platform": fingerprint.platform,
                }),
            )
            .await
            .context("Failed to override user agent")?;

        if !settings.blocked_resource_patterns.is_empty() {
            dev_tools
                .execute_cdp_with_params(
                    "Network.setBlockedURLs",
                    json!({ "urls": settings.blocked_resource_patterns }),
                )
                .await
                .context("Failed to block resource patterns")?;
        }

        Ok(())
    }

    fn driver(&self) -> Result<&WebDriver> {
        self.driver.as_ref().context("Browser session is closed")
    }

    /// Navigate and return the final URL with the rendered document
    async fn load(&self, url: &str) -> Result<(Url, String)> {
        let driver = self.driver()?;

        debug!("Navigating to: {}", url);
        driver
            .goto(url)
            .await
            .context(format!("Failed to navigate to URL: {}", url))?;

        let page_url = match driver.current_url().await {
            Ok(current) => current,
            Err(_) => Url::parse(url).context("Invalid page URL")?,
        };

        let source = driver.source().await.context("Failed to get page source")?;
        Ok((page_url, source))
    }
}

#[async_trait]
impl PageFetcher for BrowserSession {
    async fn fetch(&self, url: &str, depth: u32) -> PageResult {
        match self.load(url).await {
            Ok((page_url, html)) => {
                let page = extract_page(&html, &page_url, &self.origin, &self.limits);
                debug!(
                    url = url,
                    snippets = page.content.len(),
                    links = page.links.len(),
                    "Extracted page"
                );
                PageResult::loaded(url, depth, page)
            }
            Err(e) => {
                let kind = NetworkErrorKind::classify(&format!("{:#}", e));
                warn!(url = url, error_type = %kind, "Navigation failed: {:#}", e);
                PageResult::failed(url, depth, kind)
            }
        }
    }
}

#[async_trait]
impl FetchSession for BrowserSession {
    async fn close(&mut self) -> Result<()> {
        if let Some(driver) = self.driver.take() {
            driver.quit().await.context("Failed to quit browser session")?;
            debug!("Browser session closed");
        }
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    if let Err(e) = driver.quit().await {
                        error!("Error closing browser session during drop: {}", e);
                    }
                });
            }
        }
    }
}

/// Opens a fresh browser session per crawl
pub struct BrowserSessionProvider {
    settings: BrowserSettings,
    fingerprints: FingerprintManager,
    limits: ExtractionLimits,
    navigation_timeout: Duration,
}

impl BrowserSessionProvider {
    pub fn new(settings: BrowserSettings, crawler: &CrawlerSettings) -> Self {
        let fingerprints = FingerprintManager::new(settings.fingerprints.clone());
        if fingerprints.len() < settings.fingerprints.len() {
            warn!(
                "Ignoring {} mobile fingerprints",
                settings.fingerprints.len() - fingerprints.len()
            );
        }

        Self {
            fingerprints,
            settings,
            limits: ExtractionLimits::from(crawler),
            navigation_timeout: Duration::from_secs(crawler.navigation_timeout_secs),
        }
    }
}

#[async_trait]
impl SessionProvider for BrowserSessionProvider {
    async fn open(&self, origin: &Url) -> Result<Box<dyn FetchSession>> {
        let fingerprint = self.fingerprints.random_fingerprint()?;
        let session = BrowserSession::start(
            &self.settings,
            fingerprint,
            origin.clone(),
            self.limits.clone(),
            self.navigation_timeout,
        )
        .await?;

        Ok(Box::new(session))
    }
}

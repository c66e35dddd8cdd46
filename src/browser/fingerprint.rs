use anyhow::Result;
use rand::{thread_rng, Rng};
use tracing::debug;

use crate::cli::config::BrowserFingerprint;

/// Picks the browser identity a crawl session presents
pub struct FingerprintManager {
    /// Available fingerprints to use
    fingerprints: Vec<BrowserFingerprint>,
}

impl FingerprintManager {
    /// Mobile identities are dropped; sessions always present a desktop browser
    pub fn new(fingerprints: Vec<BrowserFingerprint>) -> Self {
        let fingerprints = fingerprints
            .into_iter()
            .filter(|fingerprint| is_desktop(&fingerprint.user_agent))
            .collect();
        Self { fingerprints }
    }

    /// Select a random fingerprint
    pub fn random_fingerprint(&self) -> Result<&BrowserFingerprint> {
        if self.fingerprints.is_empty() {
            anyhow::bail!("No desktop fingerprints configured");
        }

        let fingerprint = &self.fingerprints[thread_rng().gen_range(0..self.fingerprints.len())];
        debug!("Selected fingerprint: {}", fingerprint.name);
        Ok(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }
}

fn is_desktop(user_agent: &str) -> bool {
    !["Mobile", "Android", "iPhone", "iPad"]
        .iter()
        .any(|marker| user_agent.contains(marker))
}

/// Primary language tag of an Accept-Language value ("en-US,en;q=0.9" -> "en-US")
pub fn primary_language(accept_language: &str) -> &str {
    accept_language
        .split(',')
        .next()
        .map(|tag| tag.split(';').next().unwrap_or(tag).trim())
        .filter(|tag| !tag.is_empty())
        .unwrap_or("en-US")
}

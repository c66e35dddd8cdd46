//! Per-owner crawl quotas.
//!
//! Reservation is a single compare-and-increment at the gate, so two
//! simultaneous requests from one owner cannot both take the last slot.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, Client, Script};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cli::config::UsageSettings;

/// Usage counters reported back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
}

impl UsageSnapshot {
    pub fn new(used: u64, limit: u64) -> Self {
        Self {
            used,
            limit,
            remaining: limit.saturating_sub(used),
        }
    }
}

/// Result of trying to reserve one crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageDecision {
    Granted(UsageSnapshot),
    Denied(UsageSnapshot),
}

impl UsageDecision {
    pub fn snapshot(&self) -> UsageSnapshot {
        match self {
            Self::Granted(snapshot) | Self::Denied(snapshot) => *snapshot,
        }
    }
}

/// Gate consulted before a crawl starts
#[async_trait]
pub trait UsageGate: Send + Sync {
    /// Take one unit of the owner's quota if any is left
    async fn reserve(&self, owner_id: &str) -> Result<UsageDecision>;

    /// Give back a reservation for a crawl that produced nothing
    async fn release(&self, owner_id: &str) -> Result<UsageSnapshot>;

    async fn current(&self, owner_id: &str) -> Result<UsageSnapshot>;
}

/// Factory for creating a UsageGate implementation
pub struct UsageGateFactory;

impl UsageGateFactory {
    pub async fn create(settings: &UsageSettings) -> Result<Arc<dyn UsageGate>> {
        match settings.backend.as_str() {
            "redis" => Ok(Arc::new(RedisUsageGate::new(settings).await?)),
            "memory" => Ok(Arc::new(MemoryUsageGate::new(settings.default_limit))),
            _ => anyhow::bail!("Unsupported usage backend: {}", settings.backend),
        }
    }
}

/// Decrement without going below zero
const RELEASE_SCRIPT: &str = r"
local value = redis.call('DECR', KEYS[1])
if value < 0 then
    redis.call('SET', KEYS[1], 0)
    value = 0
end
return value
";

/// Redis-backed usage counters with a rolling expiry window
pub struct RedisUsageGate {
    conn: Arc<Mutex<MultiplexedConnection>>,
    key_prefix: String,
    limit: u64,
    window_secs: u64,
}

impl RedisUsageGate {
    pub async fn new(settings: &UsageSettings) -> Result<Self> {
        let client = Client::open(settings.redis_url.clone())
            .context(format!("Failed to connect to Redis at {}", settings.redis_url))?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to get Redis connection")?;

        info!("Connected to Redis usage gate");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            key_prefix: settings.key_prefix.clone(),
            limit: settings.default_limit,
            window_secs: settings.window_secs,
        })
    }

    fn key(&self, owner_id: &str) -> String {
        format!("{}:{}", self.key_prefix, owner_id)
    }
}

#[async_trait]
impl UsageGate for RedisUsageGate {
    async fn reserve(&self, owner_id: &str) -> Result<UsageDecision> {
        let key = self.key(owner_id);
        let mut conn = self.conn.lock().await;

        let used: u64 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut *conn)
            .await
            .context("Failed to increment usage counter")?;

        if used == 1 && self.window_secs > 0 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(self.window_secs)
                .query_async::<_, ()>(&mut *conn)
                .await
                .context("Failed to set usage window")?;
        }

        if used > self.limit {
            // Roll back the over-limit increment
            let rolled_back: u64 = redis::cmd("DECR")
                .arg(&key)
                .query_async(&mut *conn)
                .await
                .context("Failed to roll back usage counter")?;

            debug!("Usage limit reached for {}", owner_id);
            return Ok(UsageDecision::Denied(UsageSnapshot::new(rolled_back, self.limit)));
        }

        Ok(UsageDecision::Granted(UsageSnapshot::new(used, self.limit)))
    }

    async fn release(&self, owner_id: &str) -> Result<UsageSnapshot> {
        let key = self.key(owner_id);
        let mut conn = self.conn.lock().await;

        let used: u64 = Script::new(RELEASE_SCRIPT)
            .key(&key)
            .invoke_async(&mut *conn)
            .await
            .context("Failed to release usage reservation")?;

        debug!("Released usage reservation for {}", owner_id);
        Ok(UsageSnapshot::new(used, self.limit))
    }

    async fn current(&self, owner_id: &str) -> Result<UsageSnapshot> {
        let key = self.key(owner_id);
        let mut conn = self.conn.lock().await;

        let used: Option<u64> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut *conn)
            .await
            .context("Failed to read usage counter")?;

        Ok(UsageSnapshot::new(used.unwrap_or(0), self.limit))
    }
}

/// In-process usage counters
pub struct MemoryUsageGate {
    limit: u64,
    counters: Mutex<HashMap<String, u64>>,
}

impl MemoryUsageGate {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            counters: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl UsageGate for MemoryUsageGate {
    async fn reserve(&self, owner_id: &str) -> Result<UsageDecision> {
        let mut counters = self.counters.lock().await;
        let used = counters.entry(owner_id.to_string()).or_insert(0);

        if *used >= self.limit {
            return Ok(UsageDecision::Denied(UsageSnapshot::new(*used, self.limit)));
        }

        *used += 1;
        Ok(UsageDecision::Granted(UsageSnapshot::new(*used, self.limit)))
    }

    async fn release(&self, owner_id: &str) -> Result<UsageSnapshot> {
        let mut counters = self.counters.lock().await;
        let used = counters.entry(owner_id.to_string()).or_insert(0);
        *used = used.saturating_sub(1);
        Ok(UsageSnapshot::new(*used, self.limit))
    }

    async fn current(&self, owner_id: &str) -> Result<UsageSnapshot> {
        let counters = self.counters.lock().await;
        let used = counters.get(owner_id).copied().unwrap_or(0);
        Ok(UsageSnapshot::new(used, self.limit))
    }
}

//! Per-instance mutual exclusion.
//!
//! A token is a key plus a caller-generated value. Acquisition is
//! set-if-absent with a TTL so a crashed holder cannot block an instance
//! forever; release deletes the key only if it still holds our value, so a
//! slow caller whose TTL lapsed cannot remove someone else's token.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use market_types::InstanceId;
use redis::aio::ConnectionManager;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::metrics::METRICS;
use crate::MarketError;

/// Deletes KEYS[1] only when it still holds ARGV[1].
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub fn instance_lock_key(instance_id: InstanceId) -> String {
    format!("trade:lock:{instance_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub ttl: Duration,
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            attempts: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Proof of holding a lock. Hand it back to [`LockCoordinator::release`].
#[derive(Debug, PartialEq, Eq)]
pub struct LockToken {
    key: String,
    value: String,
}

impl LockToken {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// In-process lock table for single-node deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryLocks {
    held: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryLocks {
    fn try_acquire(&self, token: &LockToken, ttl: Duration) -> bool {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match held.get(&token.key) {
            Some((_, expires_at)) if *expires_at > now => false,
            _ => {
                held.insert(token.key.clone(), (token.value.clone(), now + ttl));
                true
            }
        }
    }

    fn release(&self, token: &LockToken) -> bool {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        match held.get(&token.key) {
            Some((value, _)) if *value == token.value => {
                held.remove(&token.key);
                true
            }
            _ => false,
        }
    }
}

/// Locks shared between engine processes through Redis.
#[derive(Clone)]
pub struct RedisLocks {
    conn: ConnectionManager,
    release: redis::Script,
}

impl RedisLocks {
    pub async fn connect(url: &str) -> Result<Self, MarketError> {
        let client = redis::Client::open(url)
            .map_err(|e| MarketError::Config(format!("Invalid redis_url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| MarketError::Lock(format!("Redis connection failed: {e}")))?;
        Ok(Self {
            conn,
            release: redis::Script::new(RELEASE_SCRIPT),
        })
    }

    async fn try_acquire(&self, token: &LockToken, ttl: Duration) -> Result<bool, MarketError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(&token.key)
            .arg(&token.value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| MarketError::Lock(format!("Lock acquire failed: {e}")))?;
        Ok(reply.is_some())
    }

    async fn release(&self, token: &LockToken) -> Result<bool, MarketError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release
            .key(&token.key)
            .arg(&token.value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| MarketError::Lock(format!("Lock release failed: {e}")))?;
        Ok(deleted == 1)
    }
}

enum LockBackend {
    Memory(MemoryLocks),
    Redis(RedisLocks),
}

/// Try-acquire / release coordinator with bounded retry.
pub struct LockCoordinator {
    backend: LockBackend,
    policy: LockPolicy,
}

impl LockCoordinator {
    pub fn in_memory(policy: LockPolicy) -> Self {
        Self {
            backend: LockBackend::Memory(MemoryLocks::default()),
            policy,
        }
    }

    pub async fn redis(url: &str, policy: LockPolicy) -> Result<Self, MarketError> {
        Ok(Self {
            backend: LockBackend::Redis(RedisLocks::connect(url).await?),
            policy,
        })
    }

    /// Redis when `redis_url` is configured, otherwise in-process.
    pub async fn from_config(config: &Config) -> Result<Self, MarketError> {
        let policy = config.lock_policy();
        match config.redis_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => {
                let coordinator = Self::redis(url, policy).await?;
                info!("Instance locks backed by Redis");
                Ok(coordinator)
            }
            None => {
                info!("Instance locks held in process memory");
                Ok(Self::in_memory(policy))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            LockBackend::Memory(_) => "memory",
            LockBackend::Redis(_) => "redis",
        }
    }

    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    /// Single attempt. `Ok(None)` means someone else holds the key.
    pub async fn try_acquire(&self, key: &str) -> Result<Option<LockToken>, MarketError> {
        let token = LockToken::new(key);
        let acquired = match &self.backend {
            LockBackend::Memory(locks) => locks.try_acquire(&token, self.policy.ttl),
            LockBackend::Redis(locks) => locks.try_acquire(&token, self.policy.ttl).await?,
        };
        Ok(acquired.then_some(token))
    }

    /// Retries up to `policy.attempts` times, sleeping `policy.retry_delay` between tries.
    pub async fn acquire(&self, key: &str) -> Result<LockToken, MarketError> {
        for attempt in 1..=self.policy.attempts {
            if let Some(token) = self.try_acquire(key).await? {
                METRICS.locks_acquired.fetch_add(1, Ordering::Relaxed);
                debug!(key, attempt, "Lock acquired");
                return Ok(token);
            }
            if attempt < self.policy.attempts {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
        }
        METRICS.locks_busy.fetch_add(1, Ordering::Relaxed);
        warn!(key, attempts = self.policy.attempts, "Lock busy");
        Err(MarketError::ResourceBusy(
            "Another purchase of this item is in progress, please retry shortly".into(),
        ))
    }

    /// Never fails the caller: a release that errors or finds a foreign value
    /// is logged and the TTL reclaims the key.
    pub async fn release(&self, token: LockToken) {
        let released = match &self.backend {
            LockBackend::Memory(locks) => Ok(locks.release(&token)),
            LockBackend::Redis(locks) => locks.release(&token).await,
        };
        match released {
            Ok(true) => debug!(key = %token.key, "Lock released"),
            Ok(false) => {
                METRICS.lock_release_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %token.key, "Lock expired or taken over before release");
            }
            Err(e) => {
                METRICS.lock_release_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %token.key, error = %e, "Lock release failed");
            }
        }
    }
}

//! Persistence that survives the out-of-band email step.
//!
//! Two things need to outlive a single request here: the single-slot
//! deferred redirect written at registration and consumed at the
//! confirmation callback, and the consumed-once markers for recovery
//! credentials. Both are keyed blobs with a TTL, so they share one store
//! abstraction with a Redis implementation for deployment and an in-memory
//! implementation for tests.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};

/// Well-known key for the pending cross-origin redirect. One slot, not
/// per-user: it exists only between "registration submitted" and "the
/// confirmation link was opened somewhere".
const DEFERRED_REDIRECT_KEY: &str = "sso:redirect_after_confirm";

const CONSUMED_CREDENTIAL_PREFIX: &str = "sso:recovery_used";

#[async_trait]
pub trait DeferredStore: Send + Sync {
    /// Park a redirect target until the confirmation callback runs.
    async fn save_redirect(&self, url: &str, ttl_seconds: i64) -> Result<(), anyhow::Error>;

    /// Read-then-delete the parked redirect. A second call observes `None`.
    async fn take_redirect(&self) -> Result<Option<String>, anyhow::Error>;

    /// Record a one-time credential digest. Returns true on first use,
    /// false when the digest was already recorded (a replay).
    async fn consume_once(&self, digest: &str, ttl_seconds: i64) -> Result<bool, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisDeferredStore {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisDeferredStore {
    pub async fn new(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %url, "Connecting to Redis");
        let client = Client::open(url.to_string())?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl DeferredStore for RedisDeferredStore {
    async fn save_redirect(&self, url: &str, ttl_seconds: i64) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(DEFERRED_REDIRECT_KEY)
            .arg(url)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to save deferred redirect: {}", e))
    }

    async fn take_redirect(&self) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        // GETDEL keeps consumption atomic across portal instances
        redis::cmd("GETDEL")
            .arg(DEFERRED_REDIRECT_KEY)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to take deferred redirect: {}", e))
    }

    async fn consume_once(&self, digest: &str, ttl_seconds: i64) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let key = format!("{}:{}", CONSUMED_CREDENTIAL_PREFIX, digest);
        let set: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to record consumed credential: {}", e))?;
        Ok(set.is_some())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// In-memory store for tests and single-process development.
pub struct InMemoryDeferredStore {
    redirect: std::sync::Mutex<Option<String>>,
    consumed: std::sync::Mutex<std::collections::HashSet<String>>,
}

impl Default for InMemoryDeferredStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDeferredStore {
    pub fn new() -> Self {
        Self {
            redirect: std::sync::Mutex::new(None),
            consumed: std::sync::Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// Test observability: what is currently parked, without consuming it.
    pub fn peek_redirect(&self) -> Option<String> {
        self.redirect.lock().ok().and_then(|slot| slot.clone())
    }
}

#[async_trait]
impl DeferredStore for InMemoryDeferredStore {
    async fn save_redirect(&self, url: &str, _ttl_seconds: i64) -> Result<(), anyhow::Error> {
        *self
            .redirect
            .lock()
            .map_err(|e| anyhow::anyhow!("Deferred slot mutex poisoned: {}", e))? =
            Some(url.to_string());
        Ok(())
    }

    async fn take_redirect(&self) -> Result<Option<String>, anyhow::Error> {
        let taken = self
            .redirect
            .lock()
            .map_err(|e| anyhow::anyhow!("Deferred slot mutex poisoned: {}", e))?
            .take();
        Ok(taken)
    }

    async fn consume_once(&self, digest: &str, _ttl_seconds: i64) -> Result<bool, anyhow::Error> {
        let first_use = self
            .consumed
            .lock()
            .map_err(|e| anyhow::anyhow!("Consumed-set mutex poisoned: {}", e))?
            .insert(digest.to_string());
        Ok(first_use)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

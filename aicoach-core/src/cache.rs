//! Time-bounded key/value storage for orchestrated results.
//!
//! [`MemoryCache`] is the process-local store: entries carry an absolute
//! expiry, are evicted lazily on read and swept periodically by
//! [`spawn_sweeper`]. [`LayeredCache`] puts a shared remote store in front
//! of a local one and falls back to the local store whenever the remote
//! reports [`CoachError::CacheUnavailable`]. [`RedisCache`] is the shared
//! remote store; [`store_from_config`] picks the layout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::CacheCfg;
use crate::error::{CoachError, CoreResult};

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Value for `key` if present and not expired.
    async fn get(&self, key: &str) -> CoreResult<Option<Value>>;

    /// Store `value` with absolute expiry `now + ttl`.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CoreResult<()>;

    /// Drop every expired entry, returning how many were removed.
    async fn remove_expired(&self) -> CoreResult<usize>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until evicted.
    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> CoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| CoachError::CacheUnavailable("memory cache lock poisoned".into()))
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> CoreResult<Option<Value>> {
        let mut map = self.lock()?;
        let now = Instant::now();
        let expired = match map.get(key) {
            Some(e) if e.expires_at > now => return Ok(Some(e.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            map.remove(key);
            tracing::debug!(cache.key = key, "cache entry expired on read");
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CoreResult<()> {
        let expires_at = Instant::now() + ttl;
        self.lock()?
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn remove_expired(&self) -> CoreResult<usize> {
        let mut map = self.lock()?;
        let now = Instant::now();
        let before = map.len();
        map.retain(|_, e| e.expires_at > now);
        Ok(before - map.len())
    }
}

/// Periodically sweep `cache` every `every`. The first sweep happens one
/// full interval after spawning. Abort the handle to stop it.
pub fn spawn_sweeper(cache: Arc<dyn CacheStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval_at(Instant::now() + every, every);
        loop {
            tick.tick().await;
            match cache.remove_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "cache sweep removed expired entries"),
                Err(e) => tracing::warn!(error = %e, "cache sweep failed"),
            }
        }
    })
}

/// Shared remote store with a transparent local fallback.
///
/// Remote failures are logged and served from the local [`MemoryCache`];
/// no method of this type returns an error.
#[derive(Debug)]
pub struct LayeredCache<R> {
    remote: R,
    local: MemoryCache,
}

impl<R: CacheStore> LayeredCache<R> {
    pub fn new(remote: R) -> Self {
        Self {
            remote,
            local: MemoryCache::new(),
        }
    }

    pub fn local(&self) -> &MemoryCache {
        &self.local
    }
}

#[async_trait]
impl<R: CacheStore> CacheStore for LayeredCache<R> {
    async fn get(&self, key: &str) -> CoreResult<Option<Value>> {
        match self.remote.get(key).await {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::warn!(error = %e, cache.key = key, "remote cache get failed; using local");
                self.local.get(key).await
            }
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CoreResult<()> {
        match self.remote.set(key, value.clone(), ttl).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, cache.key = key, "remote cache set failed; using local");
                self.local.set(key, value, ttl).await
            }
        }
    }

    async fn remove_expired(&self) -> CoreResult<usize> {
        let remote = match self.remote.remove_expired().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "remote cache sweep failed");
                0
            }
        };
        Ok(remote + self.local.remove_expired().await?)
    }
}

/// Redis-backed shared store. Values are JSON strings written with
/// `SET key value PX ttl`, so expiry is enforced by the server and every
/// orchestrator pointed at the same instance sees the same entries.
pub struct RedisCache {
    client: redis::Client,
    conn: tokio::sync::Mutex<Option<MultiplexedConnection>>,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("addr", &self.client.get_connection_info().addr.to_string())
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Parse `url` without connecting. The connection opens on first use
    /// and is reopened after an I/O failure.
    pub fn open(url: &str) -> CoreResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CoachError::Config(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            conn: tokio::sync::Mutex::new(None),
        })
    }

    async fn connection(&self) -> CoreResult<MultiplexedConnection> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        tracing::info!("redis cache connected");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn failed(&self, e: redis::RedisError) -> CoachError {
        if e.is_io_error() || e.is_connection_dropped() {
            *self.conn.lock().await = None;
        }
        unavailable(e)
    }
}

fn unavailable(e: redis::RedisError) -> CoachError {
    CoachError::CacheUnavailable(format!("redis: {e}"))
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CoreResult<Option<Value>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = match redis::cmd("GET").arg(key).query_async(&mut conn).await {
            Ok(raw) => raw,
            Err(e) => return Err(self.failed(e).await),
        };
        raw.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| CoachError::CacheUnavailable(format!("undecodable cached value: {e}")))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CoreResult<()> {
        let body = value.to_string();
        // PX 0 is rejected by the server
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        let mut conn = self.connection().await?;
        let stored: redis::RedisResult<()> = redis::cmd("SET")
            .arg(key)
            .arg(body)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await;
        match stored {
            Ok(()) => Ok(()),
            Err(e) => Err(self.failed(e).await),
        }
    }

    /// The server expires entries itself.
    async fn remove_expired(&self) -> CoreResult<usize> {
        Ok(0)
    }
}

/// Build the cache an orchestrator should use: a [`LayeredCache`] over
/// [`RedisCache`] when a Redis URL is configured (directly or through the
/// configured environment variable), a plain [`MemoryCache`] otherwise.
/// An unparsable URL is logged and the memory store is used.
pub fn store_from_config<F>(cfg: &CacheCfg, lookup: F) -> Arc<dyn CacheStore>
where
    F: Fn(&str) -> Option<String>,
{
    let url = cfg
        .redis_url
        .clone()
        .or_else(|| lookup(cfg.redis_url_env.as_str()))
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());
    let Some(url) = url else {
        return Arc::new(MemoryCache::new());
    };
    match RedisCache::open(&url) {
        Ok(redis) => {
            tracing::info!(?redis, "using redis cache with local fallback");
            Arc::new(LayeredCache::new(redis))
        }
        Err(e) => {
            tracing::warn!(error = %e, "redis cache disabled; using memory cache");
            Arc::new(MemoryCache::new())
        }
    }
}

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;

use crate::error::{CoachError, CoreResult};

/// Pending result handed to every caller of one key.
pub type SharedResult = Shared<BoxFuture<'static, CoreResult<Value>>>;

/// Whether the caller started the work or joined work already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

/// Maps cache keys to their pending result so identical concurrent
/// requests share one underlying call.
///
/// The work runs on its own task, so it settles even when every caller
/// stops polling. A settled entry stays joinable for the grace window and
/// is then removed.
pub struct InFlightRegistry {
    entries: Mutex<HashMap<String, SharedResult>>,
    grace: Duration,
}

impl fmt::Debug for InFlightRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightRegistry")
            .field("pending", &self.len())
            .field("grace", &self.grace)
            .finish()
    }
}

impl InFlightRegistry {
    pub fn new(grace: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            grace,
        })
    }

    /// Join the pending call for `key`, or start `make()` as a new one.
    pub fn join_or_register<F>(self: &Arc<Self>, key: &str, make: F) -> (SharedResult, Role)
    where
        F: FnOnce() -> BoxFuture<'static, CoreResult<Value>>,
    {
        let mut map = self.lock();
        if let Some(pending) = map.get(key) {
            return (pending.clone(), Role::Follower);
        }

        let task = tokio::spawn(make());
        let shared = async move {
            task.await.unwrap_or_else(|e| {
                Err(CoachError::ProviderUnavailable {
                    provider: "orchestrator".into(),
                    reason: format!("call task failed: {e}"),
                })
            })
        }
        .boxed()
        .shared();
        map.insert(key.to_string(), shared.clone());
        drop(map);

        let registry = Arc::clone(self);
        let watched = shared.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let _ = watched.clone().await;
            tokio::time::sleep(registry.grace).await;
            registry.remove_if_same(&key, &watched);
        });

        (shared, Role::Leader)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_if_same(&self, key: &str, settled: &SharedResult) {
        let mut map = self.lock();
        if map.get(key).is_some_and(|cur| cur.ptr_eq(settled)) {
            map.remove(key);
            tracing::debug!(cache.key = key, "in-flight entry released");
        }
    }

    // A panic while holding the lock leaves the map itself consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, SharedResult>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

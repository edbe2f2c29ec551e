//! Single entry point for AI calls: cache lookup, in-flight coalescing,
//! provider/credential fallback, normalization, cache population and
//! metric emission.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use crate::cache::{CacheStore, spawn_sweeper, store_from_config};
use crate::config::Config;
use crate::error::{CoachError, CoreResult};
use crate::inflight::{InFlightRegistry, Role};
use crate::model::{ExpectedShape, MetricRecord, OrchestratedRequest};
use crate::normalizer::Normalizer;
use crate::provider_factory::ProviderRegistry;
use crate::router::KindRouter;
use crate::telemetry::{MetricsSink, SPAN_ORCHESTRATE, TracingMetricsSink};

/// Deterministic cache key for one request.
///
/// `ai:{kind}:{sha256}` where the digest covers the prompt, the resolved
/// model, the kind and the expected shape.
pub fn cache_key(prompt: &str, model: &str, kind: &str, shape: ExpectedShape) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(b"|model:");
    hasher.update(model.as_bytes());
    hasher.update(b"|type:");
    hasher.update(kind.as_bytes());
    hasher.update(b"|shape:");
    hasher.update(shape.as_str().as_bytes());
    format!("ai:{kind}:{}", hex::encode(hasher.finalize()))
}

/// Everything an [`Orchestrator`] owns. Build one with
/// [`OrchestratorParts::from_config`] and swap pieces before calling
/// [`Orchestrator::new`] (shared cache, custom metrics sink, test fakes).
pub struct OrchestratorParts {
    pub registry: ProviderRegistry,
    pub router: KindRouter,
    pub cache: Arc<dyn CacheStore>,
    pub metrics: Arc<dyn MetricsSink>,
    pub normalizer: Normalizer,
    pub coalesce_grace: Duration,
    pub attempt_timeout: Duration,
    /// Periodic cache sweep; `None` disables the background task.
    pub sweep_interval: Option<Duration>,
}

impl OrchestratorParts {
    /// Reads provider credentials and the Redis URL from the environment.
    pub fn from_config(cfg: &Config) -> CoreResult<Self> {
        Self::from_config_with(cfg, |name| std::env::var(name).ok())
    }

    /// Same as [`from_config`](Self::from_config) with an injectable
    /// variable lookup.
    pub fn from_config_with<F>(cfg: &Config, lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            registry: ProviderRegistry::from_config_with(cfg, &lookup)?,
            router: KindRouter::new(cfg)?,
            cache: store_from_config(&cfg.cache, &lookup),
            metrics: Arc::new(TracingMetricsSink),
            normalizer: Normalizer::from_cfg(&cfg.narration),
            coalesce_grace: Duration::from_millis(cfg.orchestrator.coalesce_grace_ms),
            attempt_timeout: Duration::from_millis(cfg.orchestrator.attempt_timeout_ms),
            sweep_interval: Some(Duration::from_millis(cfg.cache.sweep_interval_ms))
                .filter(|d| !d.is_zero()),
        })
    }
}

struct Inner {
    registry: ProviderRegistry,
    router: KindRouter,
    cache: Arc<dyn CacheStore>,
    metrics: Arc<dyn MetricsSink>,
    normalizer: Normalizer,
    attempt_timeout: Duration,
}

pub struct Orchestrator {
    inner: Arc<Inner>,
    inflight: Arc<InFlightRegistry>,
    sweeper: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("providers", &self.inner.registry.names())
            .field("inflight", &self.inflight)
            .finish()
    }
}

impl Orchestrator {
    /// Must be called inside a tokio runtime when a sweep interval is set.
    pub fn new(parts: OrchestratorParts) -> Self {
        let sweeper = parts
            .sweep_interval
            .map(|every| spawn_sweeper(parts.cache.clone(), every));
        Self {
            inner: Arc::new(Inner {
                registry: parts.registry,
                router: parts.router,
                cache: parts.cache,
                metrics: parts.metrics,
                normalizer: parts.normalizer,
                attempt_timeout: parts.attempt_timeout,
            }),
            inflight: InFlightRegistry::new(parts.coalesce_grace),
            sweeper,
        }
    }

    pub fn from_config(cfg: &Config) -> CoreResult<Self> {
        Ok(Self::new(OrchestratorParts::from_config(cfg)?))
    }

    pub fn providers(&self) -> Vec<&str> {
        self.inner.registry.names()
    }

    /// Run one request through cache, coalescing and the provider chain.
    ///
    /// Only [`CoachError::InvalidRequest`] and
    /// [`CoachError::AllProvidersExhausted`] reach the caller; cache
    /// failures degrade to a miss.
    pub async fn get_orchestrated_response(&self, req: OrchestratedRequest) -> CoreResult<Value> {
        if req.prompt.trim().is_empty() {
            return Err(CoachError::InvalidRequest("prompt must not be empty".into()));
        }

        let route = self.inner.router.resolve(&req.kind);
        let key = cache_key(&req.prompt, &route.model, &route.kind, req.expected_shape);
        let ttl = req
            .cache_ttl_ms
            .map(Duration::from_millis)
            .unwrap_or(route.ttl);

        let span = tracing::info_span!(
            SPAN_ORCHESTRATE,
            ai.kind = %route.kind,
            llm.model = %route.model,
            cache.key = %key
        );

        async move {
            if !req.force_refresh {
                match self.inner.cache.get(&key).await {
                    Ok(Some(v)) => {
                        tracing::info!("cache hit");
                        return Ok(v);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "cache read failed; treating as miss"),
                }
            }

            let inner = Arc::clone(&self.inner);
            let call = Call {
                prompt: req.prompt,
                shape: req.expected_shape,
                model: route.model,
                key: key.clone(),
                ttl,
            };
            let (pending, role) = self.inflight.join_or_register(&key, move || {
                async move { inner.execute(call).await }
                    .instrument(tracing::Span::current())
                    .boxed()
            });
            if role == Role::Follower {
                tracing::info!("joined in-flight call");
            }
            pending.await
        }
        .instrument(span)
        .await
    }

    /// Warm the cache for `entries`, one after another. Failures are logged
    /// and skipped; successful values are returned in input order.
    pub async fn precache(&self, entries: Vec<OrchestratedRequest>) -> Vec<Value> {
        let total = entries.len();
        let mut out = Vec::with_capacity(total);
        for (i, entry) in entries.into_iter().enumerate() {
            let kind = entry.kind.clone();
            match self.get_orchestrated_response(entry).await {
                Ok(v) => out.push(v),
                Err(e) => tracing::warn!(index = i, kind = %kind, error = %e, "precache entry failed"),
            }
        }
        tracing::info!(total, cached = out.len(), "precache finished");
        out
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(h) = self.sweeper.take() {
            h.abort();
        }
    }
}

struct Call {
    prompt: String,
    shape: ExpectedShape,
    model: String,
    key: String,
    ttl: Duration,
}

impl Inner {
    async fn execute(&self, call: Call) -> CoreResult<Value> {
        let start = Instant::now();
        let plan = self.router.provider_order(&self.registry, &call.model);
        let after_ms = self.attempt_timeout.as_millis() as u64;

        let mut attempts = 0usize;
        let mut last_err = None;
        let mut last_target: Option<(String, String, bool)> = None;

        for candidate in &plan {
            let provider = candidate.slot.name();
            for (cred_idx, credential) in candidate.slot.credentials.iter().enumerate() {
                attempts += 1;
                last_target = Some((
                    provider.to_string(),
                    candidate.model.clone(),
                    candidate.fallback,
                ));
                let attempt = candidate.slot.provider.call(
                    &call.prompt,
                    call.shape,
                    &candidate.model,
                    credential,
                );
                let result = match tokio::time::timeout(self.attempt_timeout, attempt).await {
                    Ok(r) => r,
                    Err(_) => Err(CoachError::Timeout {
                        provider: provider.to_string(),
                        after_ms,
                    }),
                };

                match result {
                    Ok(raw) => {
                        let value = self.normalizer.normalize(raw);
                        if let Err(e) = self.cache.set(&call.key, value.clone(), call.ttl).await {
                            tracing::warn!(error = %e, "cache write failed; result not cached");
                        } else {
                            tracing::debug!(ttl_ms = call.ttl.as_millis() as u64, "cached result");
                        }
                        self.metrics.record(MetricRecord {
                            provider: Some(provider.to_string()),
                            model: Some(candidate.model.clone()),
                            duration_ms: start.elapsed().as_millis() as u64,
                            success: true,
                            used_fallback: candidate.fallback,
                            cache_key: call.key.clone(),
                        });
                        tracing::info!(
                            provider,
                            model = %candidate.model,
                            attempts,
                            used_fallback = candidate.fallback,
                            "provider call succeeded"
                        );
                        return Ok(value);
                    }
                    Err(e) => {
                        tracing::warn!(
                            provider,
                            model = %candidate.model,
                            credential = cred_idx,
                            retryable = e.is_retryable(),
                            error.kind = e.kind(),
                            error = %e,
                            "provider attempt failed"
                        );
                        last_err = Some(e);
                    }
                }
            }
        }

        let (provider, model, used_fallback) = match last_target {
            Some((p, m, f)) => (Some(p), Some(m), f),
            None => (None, None, false),
        };
        self.metrics.record(MetricRecord {
            provider,
            model,
            duration_ms: start.elapsed().as_millis() as u64,
            success: false,
            used_fallback,
            cache_key: call.key.clone(),
        });

        let last = last_err.unwrap_or_else(|| CoachError::ProviderUnavailable {
            provider: "none".into(),
            reason: "no provider with credentials is registered".into(),
        });
        tracing::error!(attempts, error.kind = last.kind(), error = %last, "all providers exhausted");
        Err(CoachError::AllProvidersExhausted {
            attempts,
            last: Box::new(last),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::cache::tests::FlakyStore;
    use crate::provider::{ProviderSlot, StructuredProvider};
    use crate::telemetry::MemoryMetricsSink;
    use async_trait::async_trait;
    use secrecy::{ExposeSecret, SecretString};
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails for the listed credentials, answers `answer` otherwise; counts calls.
    struct Scripted {
        name: &'static str,
        default_model: &'static str,
        delay: Duration,
        fail_keys: HashSet<&'static str>,
        answer: Value,
        calls: AtomicUsize,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl Scripted {
        fn ok(name: &'static str, default_model: &'static str, answer: Value) -> Arc<Self> {
            Arc::new(Self {
                name,
                default_model,
                delay: Duration::from_millis(20),
                fail_keys: HashSet::new(),
                answer,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &'static str, default_model: &'static str, keys: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                name,
                default_model,
                delay: Duration::from_millis(5),
                fail_keys: keys.iter().copied().collect(),
                answer: Value::Null,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn slow(name: &'static str, delay: Duration, answer: Value) -> Arc<Self> {
            Arc::new(Self {
                name,
                default_model: "slow-model",
                delay,
                fail_keys: HashSet::new(),
                answer,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn seen(&self) -> Vec<(String, String)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StructuredProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }
        fn default_model(&self) -> &str {
            self.default_model
        }
        async fn call(
            &self,
            _prompt: &str,
            _shape: ExpectedShape,
            model: &str,
            credential: &SecretString,
        ) -> CoreResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = credential.expose_secret().to_string();
            self.seen.lock().unwrap().push((model.to_string(), key.clone()));
            tokio::time::sleep(self.delay).await;
            if self.fail_keys.contains(key.as_str()) {
                return Err(CoachError::ProviderHttp {
                    provider: self.name.to_string(),
                    status: 429,
                    body: "quota".into(),
                });
            }
            Ok(self.answer.clone())
        }
    }

    fn slot(p: &Arc<Scripted>, keys: &[&str]) -> ProviderSlot {
        ProviderSlot::new(
            p.clone(),
            keys.iter().map(|k| SecretString::from(k.to_string())).collect(),
        )
    }

    struct Harness {
        orch: Orchestrator,
        metrics: Arc<MemoryMetricsSink>,
    }

    fn harness(slots: Vec<ProviderSlot>) -> Harness {
        harness_with(slots, Arc::new(MemoryCache::new()))
    }

    fn harness_with(slots: Vec<ProviderSlot>, cache: Arc<dyn CacheStore>) -> Harness {
        let cfg = Config::default();
        let metrics = Arc::new(MemoryMetricsSink::new());
        let orch = Orchestrator::new(OrchestratorParts {
            registry: ProviderRegistry::from_slots(slots),
            router: KindRouter::new(&cfg).unwrap(),
            cache,
            metrics: metrics.clone(),
            normalizer: Normalizer::new(false),
            coalesce_grace: Duration::from_millis(120),
            attempt_timeout: Duration::from_secs(30),
            sweep_interval: None,
        });
        Harness { orch, metrics }
    }

    fn realtime(prompt: &str) -> OrchestratedRequest {
        OrchestratedRequest::new(prompt, "realtime")
    }

    #[test]
    fn cache_key_is_deterministic_and_distinct() {
        let a = cache_key("X", "gemini-2.0-flash", "realtime", ExpectedShape::Object);
        assert_eq!(a, cache_key("X", "gemini-2.0-flash", "realtime", ExpectedShape::Object));
        assert!(a.starts_with("ai:realtime:"));
        assert_eq!(a.len(), "ai:realtime:".len() + 64);

        let mut keys = HashSet::new();
        for prompt in ["X", "Y", "X "] {
            for model in ["gemini-2.0-flash", "gpt-4o-mini"] {
                for kind in ["realtime", "analysis"] {
                    for shape in [ExpectedShape::Object, ExpectedShape::Array] {
                        keys.insert(cache_key(prompt, model, kind, shape));
                    }
                }
            }
        }
        assert_eq!(keys.len(), 3 * 2 * 2 * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_identical_calls_coalesce_then_expire() {
        let gemini = Scripted::ok("gemini", "gemini-2.0-flash", json!({"title": "Farmea"}));
        let h = harness(vec![slot(&gemini, &["g1"])]);
        let req = || realtime("X").ttl(Duration::from_millis(1000));

        let (a, b) = tokio::join!(
            h.orch.get_orchestrated_response(req()),
            h.orch.get_orchestrated_response(req())
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(gemini.calls(), 1);

        tokio::time::sleep(Duration::from_millis(1001)).await;
        h.orch.get_orchestrated_response(req()).await.unwrap();
        assert_eq!(gemini.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hit_bypasses_provider() {
        let gemini = Scripted::ok("gemini", "gemini-2.0-flash", json!({"fullText": "Empuja"}));
        let h = harness(vec![slot(&gemini, &["g1"])]);

        let first = h.orch.get_orchestrated_response(realtime("X")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let second = h.orch.get_orchestrated_response(realtime("X")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(gemini.calls(), 1);
        assert_eq!(h.metrics.records().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_skips_cache() {
        let gemini = Scripted::ok("gemini", "gemini-2.0-flash", json!({"fullText": "Empuja"}));
        let h = harness(vec![slot(&gemini, &["g1"])]);

        h.orch.get_orchestrated_response(realtime("X")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.orch
            .get_orchestrated_response(realtime("X").force_refresh(true))
            .await
            .unwrap();
        assert_eq!(gemini.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn result_is_normalized_before_caching() {
        let gemini = Scripted::ok(
            "gemini",
            "gemini-2.0-flash",
            json!({"realtimeAdvice": {"title": "Dragón", "mantra": "Calma", "focus": "Visión"}}),
        );
        let h = harness(vec![slot(&gemini, &["g1"])]);
        let v = h.orch.get_orchestrated_response(realtime("X")).await.unwrap();
        assert_eq!(v["realtimeAdvice"]["fullText"], "Dragón. Calma. Visión.");
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_secondary_provider() {
        let gemini = Scripted::failing("gemini", "gemini-2.0-flash", &["g1", "g2"]);
        let openai = Scripted::ok("openai", "gpt-4o-mini", json!({"fullText": "Retrocede"}));
        let h = harness(vec![slot(&gemini, &["g1", "g2"]), slot(&openai, &["o1"])]);

        let v = h.orch.get_orchestrated_response(realtime("X")).await.unwrap();
        assert_eq!(v["fullText"], "Retrocede");
        assert_eq!(gemini.calls(), 2);
        assert_eq!(openai.calls(), 1);
        // fallback provider runs its own default model
        assert_eq!(openai.seen()[0].0, "gpt-4o-mini");

        let records = h.metrics.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert!(records[0].used_fallback);
        assert_eq!(records[0].provider.as_deref(), Some("openai"));
    }

    #[tokio::test(start_paused = true)]
    async fn rotates_credentials_in_order() {
        let gemini = Scripted::failing("gemini", "gemini-2.0-flash", &["g1"]);
        let h = harness(vec![slot(&gemini, &["g1", "g2", "g3"])]);

        h.orch.get_orchestrated_response(realtime("X")).await.unwrap();
        let keys: Vec<String> = gemini.seen().into_iter().map(|(_, k)| k).collect();
        assert_eq!(keys, vec!["g1", "g2"]);
        assert!(!h.metrics.records()[0].used_fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn total_failure_is_all_providers_exhausted() {
        let gemini = Scripted::failing("gemini", "gemini-2.0-flash", &["g1"]);
        let openai = Scripted::failing("openai", "gpt-4o-mini", &["o1", "o2"]);
        let h = harness(vec![slot(&gemini, &["g1"]), slot(&openai, &["o1", "o2"])]);

        let err = h
            .orch
            .get_orchestrated_response(realtime("X"))
            .await
            .unwrap_err();
        match err {
            CoachError::AllProvidersExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, CoachError::ProviderHttp { ref provider, .. } if provider == "openai"));
            }
            other => panic!("expected AllProvidersExhausted, got {other:?}"),
        }
        let records = h.metrics.records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert!(records[0].used_fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_not_cached() {
        let gemini = Scripted::failing("gemini", "gemini-2.0-flash", &["g1"]);
        let h = harness(vec![slot(&gemini, &["g1"])]);
        assert!(h.orch.get_orchestrated_response(realtime("X")).await.is_err());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(h.orch.get_orchestrated_response(realtime("X")).await.is_err());
        assert_eq!(gemini.calls(), 2);
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_without_provider_calls() {
        let gemini = Scripted::ok("gemini", "gemini-2.0-flash", json!({}));
        let h = harness(vec![slot(&gemini, &["g1"])]);
        let err = h
            .orch
            .get_orchestrated_response(realtime("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::InvalidRequest(_)));
        assert_eq!(gemini.calls(), 0);
        assert!(h.metrics.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_attempt_advances_to_next_provider() {
        let gemini = Scripted::slow("gemini", Duration::from_secs(120), json!({"a": 1}));
        let openai = Scripted::ok("openai", "gpt-4o-mini", json!({"b": 2}));
        let h = harness(vec![slot(&gemini, &["g1"]), slot(&openai, &["o1"])]);

        let started = Instant::now();
        let v = h.orch.get_orchestrated_response(realtime("X")).await.unwrap();
        assert_eq!(v, json!({"b": 2}));
        assert!(started.elapsed() < Duration::from_secs(31));
        assert!(h.metrics.records()[0].used_fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_cache_degrades_to_always_miss() {
        let store = Arc::new(FlakyStore::default());
        store.down.store(true, Ordering::SeqCst);
        let gemini = Scripted::ok("gemini", "gemini-2.0-flash", json!({"fullText": "Ok"}));
        let h = harness_with(vec![slot(&gemini, &["g1"])], store.clone());

        let v = h.orch.get_orchestrated_response(realtime("X")).await.unwrap();
        assert_eq!(v["fullText"], "Ok");
        tokio::time::sleep(Duration::from_millis(200)).await;
        h.orch.get_orchestrated_response(realtime("X")).await.unwrap();
        assert_eq!(gemini.calls(), 2);
        assert!(store.calls.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn kinds_route_to_their_models() {
        let gemini = Scripted::ok("gemini", "gemini-2.0-flash", json!({"g": true}));
        let openai = Scripted::ok("openai", "gpt-4o-mini", json!({"o": true}));
        let h = harness(vec![slot(&gemini, &["g1"]), slot(&openai, &["o1"])]);

        let v = h
            .orch
            .get_orchestrated_response(OrchestratedRequest::new("X", "analysis"))
            .await
            .unwrap();
        assert_eq!(v, json!({"o": true}));
        assert_eq!(openai.seen()[0].0, "gpt-4o-mini");
        assert_eq!(gemini.calls(), 0);

        let records = h.metrics.records();
        assert!(!records[0].used_fallback);
        assert!(records[0].cache_key.starts_with("ai:analysis:"));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_kind_keeps_its_name_in_the_key() {
        let gemini = Scripted::ok("gemini", "gemini-2.0-flash", json!({"fullText": "Ok"}));
        let h = harness(vec![slot(&gemini, &["g1"])]);

        h.orch
            .get_orchestrated_response(OrchestratedRequest::new("X", "postgame-essay"))
            .await
            .unwrap();
        assert_eq!(gemini.seen()[0].0, "gemini-2.0-flash");
        let records = h.metrics.records();
        assert_eq!(
            records[0].cache_key,
            cache_key("X", "gemini-2.0-flash", "postgame-essay", ExpectedShape::Object)
        );
    }

    #[tokio::test]
    async fn from_config_with_unreachable_redis_still_serves() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("redis://127.0.0.1:{port}/0");
        let parts = OrchestratorParts::from_config_with(&Config::default(), |name| {
            (name == "REDIS_URL").then(|| url.clone())
        })
        .unwrap();
        let orch = Orchestrator::new(parts);
        assert_eq!(orch.providers(), vec!["null"]);

        for _ in 0..2 {
            let v = orch.get_orchestrated_response(realtime("X")).await.unwrap();
            assert_eq!(v, json!({}));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn precache_skips_failures_and_keeps_order() {
        let gemini = Scripted::ok("gemini", "gemini-2.0-flash", json!({"fullText": "Listo"}));
        let h = harness(vec![slot(&gemini, &["g1"])]);

        let out = h
            .orch
            .precache(vec![
                realtime("uno"),
                realtime(""),
                realtime("dos").shape(ExpectedShape::Object),
            ])
            .await;
        assert_eq!(out.len(), 2);
        assert_eq!(gemini.calls(), 2);

        h.orch.get_orchestrated_response(realtime("uno")).await.unwrap();
        assert_eq!(gemini.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_when_configured_and_stops_on_drop() {
        let cache = Arc::new(MemoryCache::new());
        let cfg = Config::default();
        let orch = Orchestrator::new(OrchestratorParts {
            registry: ProviderRegistry::from_slots(vec![]),
            router: KindRouter::new(&cfg).unwrap(),
            cache: cache.clone(),
            metrics: Arc::new(MemoryMetricsSink::new()),
            normalizer: Normalizer::default(),
            coalesce_grace: Duration::from_millis(120),
            attempt_timeout: Duration::from_secs(1),
            sweep_interval: Some(Duration::from_secs(60)),
        });
        cache.set("stale", json!(1), Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(cache.is_empty());
        drop(orch);
    }

    #[tokio::test]
    async fn no_registered_provider_fails_cleanly() {
        let h = harness(vec![]);
        let err = h
            .orch
            .get_orchestrated_response(realtime("X"))
            .await
            .unwrap_err();
        match err {
            CoachError::AllProvidersExhausted { attempts, .. } => assert_eq!(attempts, 0),
            other => panic!("expected AllProvidersExhausted, got {other:?}"),
        }
    }
}

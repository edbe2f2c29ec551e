//! Metric records for orchestrated calls.
//! Emission is best-effort: sinks must not fail the call that produced the record.

pub mod keys;

pub use keys::*;

use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::model::MetricRecord;

/// Log target used by [`TracingMetricsSink`].
pub const METRICS_TARGET: &str = "aicoach::metrics";

/// Implement this to receive one record per orchestrated provider call.
///
/// Requirements:
/// - Implementations must be thread-safe (`Send + Sync`) and `'static`.
/// - `record` may be called from any task; implementations should avoid
///   panicking and swallow their own persistence errors.
pub trait MetricsSink: Send + Sync + 'static {
    fn record(&self, record: MetricRecord);
}

/// Flatten a record into the stable attribute keys.
pub fn metric_fields(record: &MetricRecord) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert(
        KEY_PROVIDER.into(),
        record.provider.clone().map_or(Value::Null, Value::String),
    );
    m.insert(
        KEY_MODEL.into(),
        record.model.clone().map_or(Value::Null, Value::String),
    );
    m.insert(KEY_DURATION_MS.into(), record.duration_ms.into());
    m.insert(KEY_SUCCESS.into(), record.success.into());
    m.insert(KEY_USED_FALLBACK.into(), record.used_fallback.into());
    m.insert(KEY_CACHE_KEY.into(), record.cache_key.clone().into());
    m
}

/// Default sink: one `info` event per record on [`METRICS_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record(&self, record: MetricRecord) {
        let fields = Value::Object(metric_fields(&record));
        tracing::info!(target: METRICS_TARGET, metric = %fields, "ai call metric");
    }
}

/// Keeps records in memory; handy for embedding callers and tests.
#[derive(Debug, Default)]
pub struct MemoryMetricsSink {
    records: Mutex<Vec<MetricRecord>>,
}

impl MemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl MetricsSink for MemoryMetricsSink {
    fn record(&self, record: MetricRecord) {
        if let Ok(mut r) = self.records.lock() {
            r.push(record);
        }
    }
}

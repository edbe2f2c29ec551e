/// Span/Log attribute keys for orchestrated calls.
/// Keep these stable; changing them is a breaking change for dashboards.
pub const KEY_PROVIDER: &str = "llm.provider";
pub const KEY_MODEL: &str = "llm.model";
pub const KEY_CACHE_KEY: &str = "cache.key";

pub const KEY_DURATION_MS: &str = "duration.ms";
pub const KEY_SUCCESS: &str = "outcome.success";
pub const KEY_USED_FALLBACK: &str = "outcome.used_fallback";

/// Name of the span wrapping one orchestrated call.
pub const SPAN_ORCHESTRATE: &str = "orchestrate";

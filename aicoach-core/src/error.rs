use std::sync::Arc;

use thiserror::Error;

/// Core error type for the coaching AI layer.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
///
/// The type is `Clone` because one settled provider call is handed to every
/// caller that joined it while it was in flight.
#[derive(Debug, Clone, Error)]
pub enum CoachError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("provider {provider} returned http {status}: {body}")]
    ProviderHttp {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("provider unavailable: {provider} ({reason})")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("provider {provider} returned an empty response")]
    EmptyResponse { provider: String },

    #[error("malformed structure from {provider}: {reason}")]
    MalformedStructure {
        provider: String,
        reason: String,
        /// Raw model output, kept for diagnosis.
        raw: String,
    },

    #[error("provider {provider} timed out after {after_ms}ms")]
    Timeout { provider: String, after_ms: u64 },

    #[error("all providers exhausted after {attempts} attempts; last error: {last}")]
    AllProvidersExhausted {
        attempts: usize,
        last: Box<CoachError>,
    },

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for CoachError {
    fn from(e: std::io::Error) -> Self {
        CoachError::Io(Arc::new(e))
    }
}

impl CoachError {
    /// Whether the orchestrator should move on to the next credential or
    /// provider after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoachError::ProviderHttp { .. }
                | CoachError::ProviderUnavailable { .. }
                | CoachError::EmptyResponse { .. }
                | CoachError::MalformedStructure { .. }
                | CoachError::Timeout { .. }
        )
    }

    /// Short stable label used in logs and metric records.
    pub fn kind(&self) -> &'static str {
        match self {
            CoachError::InvalidRequest(_) => "invalid_request",
            CoachError::ProviderHttp { .. } => "provider_http",
            CoachError::ProviderUnavailable { .. } => "provider_unavailable",
            CoachError::EmptyResponse { .. } => "empty_response",
            CoachError::MalformedStructure { .. } => "malformed_structure",
            CoachError::Timeout { .. } => "timeout",
            CoachError::AllProvidersExhausted { .. } => "all_providers_exhausted",
            CoachError::CacheUnavailable(_) => "cache_unavailable",
            CoachError::Config(_) => "config",
            CoachError::Io(_) => "io",
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoachError>;

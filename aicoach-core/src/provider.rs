use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;

use crate::error::CoreResult;
use crate::model::ExpectedShape;

/// Uniform call contract over one external LLM API.
///
/// Implementations send `prompt` to the provider, pull the raw text out of
/// the provider envelope and return the parsed `shape` payload. They hold no
/// mutable shared state; credential rotation happens in the orchestrator.
#[async_trait]
pub trait StructuredProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Model used when this provider is called as a fallback.
    fn default_model(&self) -> &str;

    async fn call(
        &self,
        prompt: &str,
        shape: ExpectedShape,
        model: &str,
        credential: &SecretString,
    ) -> CoreResult<Value>;
}

/// A provider together with its ordered, equivalent credentials.
#[derive(Clone)]
pub struct ProviderSlot {
    pub provider: Arc<dyn StructuredProvider>,
    pub credentials: Vec<SecretString>,
}

impl ProviderSlot {
    pub fn new(provider: Arc<dyn StructuredProvider>, credentials: Vec<SecretString>) -> Self {
        Self {
            provider,
            credentials,
        }
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }
}

impl fmt::Debug for ProviderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSlot")
            .field("provider", &self.provider.name())
            .field("credentials", &self.credentials.len())
            .finish()
    }
}

/// A placeholder provider that returns an empty payload of the requested
/// shape. Registered when no real credentials are configured so the stack
/// still runs offline.
pub struct NullProvider;

#[async_trait]
impl StructuredProvider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }

    fn default_model(&self) -> &str {
        "null"
    }

    async fn call(
        &self,
        _prompt: &str,
        shape: ExpectedShape,
        _model: &str,
        _credential: &SecretString,
    ) -> CoreResult<Value> {
        Ok(match shape {
            ExpectedShape::Object => Value::Object(Default::default()),
            ExpectedShape::Array => Value::Array(Vec::new()),
        })
    }
}

use std::sync::Arc;

use secrecy::SecretString;

use crate::config::{Config, ProviderCfg};
use crate::error::CoreResult;
use crate::http_client::HttpClient;
use crate::provider::{NullProvider, ProviderSlot, StructuredProvider};
use crate::providers::{gemini, openai};

/// Registry of provider slots in registration order.
/// Names correspond to config keys ("gemini", "openai", or "null").
#[derive(Debug, Default, Clone)]
pub struct ProviderRegistry {
    slots: Vec<ProviderSlot>,
}

impl ProviderRegistry {
    /// Build a registry from configuration, reading credentials from the
    /// environment variables each provider section names.
    ///
    /// A provider with no credential present is skipped. When nothing
    /// real is left, the `null` provider is registered instead.
    pub fn from_config(cfg: &Config) -> CoreResult<Self> {
        Self::from_config_with(cfg, |name| std::env::var(name).ok())
    }

    /// Same as [`from_config`](Self::from_config) with an injectable
    /// variable lookup.
    pub fn from_config_with<F>(cfg: &Config, lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let http = HttpClient::from_cfg(&cfg.http)?;
        let mut reg = Self::default();

        if let Some(pcfg) = &cfg.providers.gemini {
            let creds = credentials(pcfg, &lookup);
            if creds.is_empty() {
                tracing::warn!(provider = "gemini", "no credentials present; provider skipped");
            } else {
                let provider = gemini::Gemini::new(
                    http.clone(),
                    base_or(pcfg, gemini::DEFAULT_BASE),
                    model_or(pcfg, gemini::DEFAULT_MODEL),
                );
                reg.register(ProviderSlot::new(Arc::new(provider), creds));
            }
        }

        if let Some(pcfg) = &cfg.providers.openai {
            let creds = credentials(pcfg, &lookup);
            if creds.is_empty() {
                tracing::warn!(provider = "openai", "no credentials present; provider skipped");
            } else {
                let provider = openai::OpenAI::new(
                    http.clone(),
                    base_or(pcfg, openai::DEFAULT_BASE),
                    model_or(pcfg, openai::DEFAULT_MODEL),
                );
                reg.register(ProviderSlot::new(Arc::new(provider), creds));
            }
        }

        if reg.is_empty() {
            tracing::warn!("no provider credentials found; using the null provider");
            reg.register(ProviderSlot::new(
                Arc::new(NullProvider),
                vec![SecretString::from("null")],
            ));
        }

        Ok(reg)
    }

    /// Build a registry from ready-made slots (tests, embedding callers).
    pub fn from_slots(slots: Vec<ProviderSlot>) -> Self {
        Self { slots }
    }

    pub fn register(&mut self, slot: ProviderSlot) {
        self.slots.retain(|s| s.name() != slot.name());
        self.slots.push(slot);
    }

    /// Get a provider slot by name (e.g., "gemini", "openai", "null").
    pub fn get(&self, name: &str) -> Option<&ProviderSlot> {
        self.slots.iter().find(|s| s.name() == name)
    }

    /// Get the provider itself by name.
    pub fn provider(&self, name: &str) -> Option<Arc<dyn StructuredProvider>> {
        self.get(name).map(|s| s.provider.clone())
    }

    pub fn slots(&self) -> &[ProviderSlot] {
        &self.slots
    }

    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn credentials<F>(pcfg: &ProviderCfg, lookup: &F) -> Vec<SecretString>
where
    F: Fn(&str) -> Option<String>,
{
    pcfg.api_key_envs
        .iter()
        .filter_map(|name| lookup(name.as_str()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
        .collect()
}

fn base_or(pcfg: &ProviderCfg, default: &str) -> String {
    pcfg.base_url
        .clone()
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

fn model_or(pcfg: &ProviderCfg, default: &str) -> String {
    pcfg.default_model
        .clone()
        .unwrap_or_else(|| default.to_string())
}

use std::collections::BTreeMap;
use std::time::Duration;

use regex::Regex;

use crate::config::{Config, KindRoute, RoutingRule};
use crate::error::{CoachError, CoreResult};
use crate::provider::ProviderSlot;
use crate::provider_factory::ProviderRegistry;

/// Compiled routing rule
#[derive(Debug)]
struct CompiledRule {
    regex: Regex,
    provider: String,
}

/// Outcome of resolving a request kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub kind: String,
    pub model: String,
    pub ttl: Duration,
}

/// One step of a call plan.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub slot: ProviderSlot,
    pub model: String,
    /// False only for the provider the model routed to.
    pub fallback: bool,
}

/// Static routing table: kind -> model/TTL, then model -> provider order.
#[derive(Debug)]
pub struct KindRouter {
    kinds: BTreeMap<String, KindRoute>,
    default_kind: String,
    default_ttl: Duration,
    rules: Vec<CompiledRule>,
    default_provider: String,
}

impl KindRouter {
    /// Build a router by compiling regexes from config.
    pub fn new(cfg: &Config) -> CoreResult<Self> {
        let mut rules = Vec::new();
        for RoutingRule { model, provider } in &cfg.routing.rules {
            let regex = Regex::new(model).map_err(|e| {
                CoachError::Config(format!("invalid routing regex '{model}': {e}"))
            })?;
            rules.push(CompiledRule {
                regex,
                provider: provider.clone(),
            });
        }
        if !cfg.routing.kinds.contains_key(&cfg.routing.default_kind) {
            return Err(CoachError::Config(format!(
                "default kind '{}' has no routing entry",
                cfg.routing.default_kind
            )));
        }
        Ok(Self {
            kinds: cfg.routing.kinds.clone(),
            default_kind: cfg.routing.default_kind.clone(),
            default_ttl: Duration::from_millis(cfg.cache.default_ttl_ms),
            rules,
            default_provider: cfg.routing.default_provider.clone(),
        })
    }

    /// Resolve the model and default cache lifetime for `kind`.
    /// Unknown kinds use the default kind's entry but keep their own name.
    pub fn resolve(&self, kind: &str) -> Route {
        let entry = self
            .kinds
            .get(kind)
            .or_else(|| self.kinds.get(&self.default_kind));
        let (model, ttl) = match entry {
            Some(r) => (
                r.model.clone(),
                r.ttl_ms.map(Duration::from_millis).unwrap_or(self.default_ttl),
            ),
            // unreachable after `new` validated the default kind
            None => (String::new(), self.default_ttl),
        };
        Route {
            kind: kind.to_string(),
            model,
            ttl,
        }
    }

    fn pick_provider_name<'a>(&'a self, model: &str) -> &'a str {
        for r in &self.rules {
            if r.regex.is_match(model) {
                return &r.provider;
            }
        }
        &self.default_provider
    }

    /// Ordered call plan for `model`: the routed provider first with
    /// `model`, then every other registered provider with its own default
    /// model. A routed provider that is not registered is skipped.
    pub fn provider_order(&self, reg: &ProviderRegistry, model: &str) -> Vec<Candidate> {
        let primary = self.pick_provider_name(model);
        let mut order = Vec::with_capacity(reg.slots().len());
        match reg.get(primary) {
            Some(slot) => order.push(Candidate {
                slot: slot.clone(),
                model: model.to_string(),
                fallback: false,
            }),
            None => tracing::warn!(provider = primary, model, "routed provider not registered"),
        }
        for slot in reg.slots() {
            if slot.name() != primary {
                order.push(Candidate {
                    slot: slot.clone(),
                    model: slot.provider.default_model().to_string(),
                    fallback: true,
                });
            }
        }
        order
    }
}

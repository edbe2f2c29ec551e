use std::collections::BTreeMap;
use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{CoachError, CoreResult};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Providers {
    pub gemini: Option<ProviderCfg>,
    pub openai: Option<ProviderCfg>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProviderCfg {
    /// Names of the environment variables holding API keys, tried in order.
    pub api_key_envs: Vec<String>,
    /// Override for the provider's API origin (tests, proxies).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model used when this provider serves as a fallback.
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct KindRoute {
    pub model: String,
    /// Default cache lifetime for this kind; `cache.default_ttl_ms` when absent.
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    /// Regex applied to the model name, e.g. ^gemini-.*
    pub model: String,
    /// Provider to route to when this rule matches
    pub provider: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoutingCfg {
    #[serde(default = "default_kind_name")]
    pub default_kind: String,
    #[serde(default = "default_kinds")]
    pub kinds: BTreeMap<String, KindRoute>,
    #[serde(default = "default_rules")]
    pub rules: Vec<RoutingRule>,
    #[serde(default = "default_provider_name")]
    pub default_provider: String,
}

impl Default for RoutingCfg {
    fn default() -> Self {
        Self {
            default_kind: default_kind_name(),
            kinds: default_kinds(),
            rules: default_rules(),
            default_provider: default_provider_name(),
        }
    }
}

fn default_kind_name() -> String {
    "default".to_string()
}
fn default_provider_name() -> String {
    "gemini".to_string()
}

fn default_kinds() -> BTreeMap<String, KindRoute> {
    let route = |model: &str| KindRoute {
        model: model.to_string(),
        ttl_ms: None,
    };
    BTreeMap::from([
        ("realtime".to_string(), route("gemini-2.0-flash")),
        ("analysis".to_string(), route("gpt-4o-mini")),
        ("default".to_string(), route("gemini-2.0-flash")),
    ])
}

fn default_rules() -> Vec<RoutingRule> {
    vec![
        RoutingRule {
            model: "^gemini-".into(),
            provider: "gemini".into(),
        },
        RoutingRule {
            model: "^gpt-".into(),
            provider: "openai".into(),
        },
    ]
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CacheCfg {
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Shared Redis store, e.g. redis://localhost:6379/0. When absent the
    /// variable named by `redis_url_env` is consulted.
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_redis_url_env")]
    pub redis_url_env: String,
}

impl Default for CacheCfg {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_ttl_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            redis_url: None,
            redis_url_env: default_redis_url_env(),
        }
    }
}

fn default_ttl_ms() -> u64 {
    10 * 60 * 1_000
}
fn default_sweep_interval_ms() -> u64 {
    60 * 1_000
}
fn default_redis_url_env() -> String {
    "REDIS_URL".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OrchestratorCfg {
    /// How long a settled in-flight entry stays joinable.
    #[serde(default = "default_coalesce_grace_ms")]
    pub coalesce_grace_ms: u64,
    /// Deadline for a single provider attempt.
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

impl Default for OrchestratorCfg {
    fn default() -> Self {
        Self {
            coalesce_grace_ms: default_coalesce_grace_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

fn default_coalesce_grace_ms() -> u64 {
    120
}
fn default_attempt_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct NarrationCfg {
    /// Whether the speech consumer renders markup (SSML) itself.
    #[serde(default)]
    pub markup_supported: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total request timeout in milliseconds (default 60000ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pool_max_idle_per_host: None,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    60_000
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub providers: Providers,
    #[serde(default)]
    pub routing: RoutingCfg,
    #[serde(default)]
    pub cache: CacheCfg,
    #[serde(default)]
    pub orchestrator: OrchestratorCfg,
    #[serde(default)]
    pub narration: NarrationCfg,
    #[serde(default)]
    pub http: HttpCfg,
}

impl Config {
    /// Load a Config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let ext = path.extension().and_then(|e| e.to_str());
        parse(&bytes, ext).map_err(|e| CoachError::Config(format!("{}: {e:#}", path.display())))
    }
}

fn parse(bytes: &[u8], ext: Option<&str>) -> anyhow::Result<Config> {
    let s = std::str::from_utf8(bytes)?;
    let cfg = match ext {
        Some("json") => serde_json::from_str(s)?,
        Some("toml") => toml::from_str(s)?,
        _ => match serde_json::from_str(s) {
            Ok(cfg) => cfg,
            Err(_) => toml::from_str(s)?,
        },
    };
    Ok(cfg)
}

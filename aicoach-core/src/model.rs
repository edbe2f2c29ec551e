use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shape of the structured payload a prompt asks the model for.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedShape {
    #[default]
    Object,
    Array,
}

impl ExpectedShape {
    /// Opening and closing bracket delimiting the payload in raw model text.
    pub fn brackets(self) -> (char, char) {
        match self {
            ExpectedShape::Object => ('{', '}'),
            ExpectedShape::Array => ('[', ']'),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExpectedShape::Object => "object",
            ExpectedShape::Array => "array",
        }
    }
}

impl fmt::Display for ExpectedShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call into the orchestrator. Immutable once built.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrchestratedRequest {
    pub prompt: String,
    #[serde(default)]
    pub expected_shape: ExpectedShape,
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Cache lifetime override; falls back to the kind's (or global) default.
    #[serde(default)]
    pub cache_ttl_ms: Option<u64>,
    #[serde(default)]
    pub force_refresh: bool,
}

fn default_kind() -> String {
    "realtime".to_string()
}

impl OrchestratedRequest {
    pub fn new(prompt: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            expected_shape: ExpectedShape::Object,
            kind: kind.into(),
            cache_ttl_ms: None,
            force_refresh: false,
        }
    }

    pub fn shape(mut self, shape: ExpectedShape) -> Self {
        self.expected_shape = shape;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_ms = Some(ttl.as_millis() as u64);
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }
}

/// Outcome of one orchestrated provider call. Fire-and-forget.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct MetricRecord {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub duration_ms: u64,
    pub success: bool,
    pub used_fallback: bool,
    pub cache_key: String,
}

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoachError, CoreResult};
use crate::extract::extract_structured;
use crate::http_client::HttpClient;
use crate::model::ExpectedShape;
use crate::provider::StructuredProvider;

pub const DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Harm categories relaxed for coaching copy (trash talk, "kill", "execute").
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Clone)]
pub struct Gemini {
    http: HttpClient,
    base: String,
    default_model: String,
    name: String,
}

impl Gemini {
    pub fn new(http: HttpClient, base: String, default_model: String) -> Self {
        Self {
            http,
            base,
            default_model,
            name: "gemini".into(),
        }
    }

    #[cfg(test)]
    pub fn new_for_tests(server_base: &str) -> Self {
        Gemini::new(
            HttpClient::new_default().unwrap(),
            server_base.to_string(),
            DEFAULT_MODEL.to_string(),
        )
    }
}

// ===== Gemini wire types (generateContent) =====

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GReq<'a> {
    contents: [GContent<'a>; 1],
    safety_settings: Vec<GSafety>,
    generation_config: GGenerationConfig,
}

#[derive(Serialize)]
struct GContent<'a> {
    parts: [GPart<'a>; 1],
}

#[derive(Serialize)]
struct GPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GSafety {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Serialize)]
struct GGenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GResp {
    #[serde(default)]
    candidates: Vec<GCandidate>,
}

#[derive(Deserialize)]
struct GCandidate {
    #[serde(default)]
    content: Option<GRespContent>,
}

#[derive(Deserialize)]
struct GRespContent {
    #[serde(default)]
    parts: Vec<GRespPart>,
}

#[derive(Deserialize)]
struct GRespPart {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl StructuredProvider for Gemini {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn call(
        &self,
        prompt: &str,
        shape: ExpectedShape,
        model: &str,
        credential: &SecretString,
    ) -> CoreResult<Value> {
        if prompt.trim().is_empty() {
            return Err(CoachError::InvalidRequest("prompt must not be empty".into()));
        }
        let payload = GReq {
            contents: [GContent {
                parts: [GPart { text: prompt }],
            }],
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| GSafety {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
            generation_config: GGenerationConfig { temperature: 0.0 },
        };

        // Never put the key in the URL.
        let headers = [
            ("x-goog-api-key", credential.expose_secret()),
            ("Content-Type", "application/json"),
        ];
        let url = format!("{}/v1/models/{}:generateContent", self.base, model);
        let (resp, latency_ms) = self
            .http
            .post_json::<_, GResp>(&self.name, &url, &payload, &headers)
            .await?;

        let raw = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CoachError::EmptyResponse {
                provider: self.name.clone(),
            })?;

        tracing::debug!(provider = %self.name, model, latency_ms, "gemini completion received");
        extract_structured(&self.name, &raw, shape)
    }
}

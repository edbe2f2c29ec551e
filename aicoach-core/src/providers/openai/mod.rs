use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoachError, CoreResult};
use crate::extract::extract_structured;
use crate::http_client::HttpClient;
use crate::model::ExpectedShape;
use crate::provider::StructuredProvider;

pub const DEFAULT_BASE: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAI {
    http: HttpClient,
    base: String,
    default_model: String,
    name: String, // usually "openai"
}

impl OpenAI {
    pub fn new(http: HttpClient, base: String, default_model: String) -> Self {
        Self {
            http,
            base,
            default_model,
            name: "openai".into(),
        }
    }

    #[cfg(test)]
    pub fn new_for_tests(server_base: &str) -> Self {
        OpenAI::new(
            HttpClient::new_default().unwrap(),
            server_base.to_string(),
            DEFAULT_MODEL.to_string(),
        )
    }
}

// ---- Wire structs (minimal) ----
#[derive(Serialize)]
struct OAChatReq<'a> {
    model: &'a str,
    temperature: f32,
    messages: [OAMessage<'a>; 1],
}

#[derive(Serialize)]
struct OAMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OAChatResp {
    #[serde(default)]
    choices: Vec<OAChoice>,
}

#[derive(Deserialize)]
struct OAChoice {
    message: OARespMessage,
}

#[derive(Deserialize)]
struct OARespMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl StructuredProvider for OpenAI {
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
        let payload = OAChatReq {
            model,
            temperature: 0.0,
            messages: [OAMessage {
                role: "user",
                content: prompt,
            }],
        };
        let auth = format!("Bearer {}", credential.expose_secret());
        let headers = [
            ("Authorization", auth.as_str()),
            ("Content-Type", "application/json"),
        ];
        let url = format!("{}/v1/chat/completions", self.base);
        let (resp, latency_ms) = self
            .http
            .post_json::<_, OAChatResp>(&self.name, &url, &payload, &headers)
            .await?;

        let raw = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CoachError::EmptyResponse {
                provider: self.name.clone(),
            })?;

        tracing::debug!(provider = %self.name, model, latency_ms, "openai completion received");
        extract_structured(&self.name, &raw, shape)
    }
}

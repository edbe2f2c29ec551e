use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

use crate::config::HttpCfg;
use crate::error::{CoachError, CoreResult};

/// Maximum number of provider error-body characters kept in errors.
const ERROR_BODY_MAX: usize = 300;

/// Thin wrapper around reqwest::Client with defaults and helpers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new_default() -> CoreResult<Self> {
        Self::from_cfg(&HttpCfg::default())
    }

    pub fn from_cfg(cfg: &HttpCfg) -> CoreResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(Duration::from_millis(cfg.request_timeout_ms));
        if let Some(n) = cfg.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(n);
        }
        let inner = builder
            .build()
            .map_err(|e| CoachError::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: "aicoach/0.1".to_string(),
        })
    }

    /// POST `body` as JSON and decode the JSON reply.
    ///
    /// `provider` labels errors. Returns the decoded body and the round-trip
    /// latency in milliseconds.
    pub async fn post_json<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        provider: &str,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> CoreResult<(R, u32)> {
        let start = Instant::now();
        let mut req = self
            .inner
            .post(url)
            .json(body)
            .header("User-Agent", &self.user_agent);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| CoachError::ProviderUnavailable {
                provider: provider.to_string(),
                reason: e.without_url().to_string(),
            })?;

        let latency = start.elapsed().as_millis() as u32;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_error(provider, status, &text));
        }

        let parsed = resp
            .json::<R>()
            .await
            .map_err(|e| CoachError::ProviderHttp {
                provider: provider.to_string(),
                status: status.as_u16(),
                body: format!("json decode error: {e}"),
            })?;
        Ok((parsed, latency))
    }
}

fn map_http_error(provider: &str, status: StatusCode, body: &str) -> CoachError {
    CoachError::ProviderHttp {
        provider: provider.to_string(),
        status: status.as_u16(),
        body: provider_error_body(body),
    }
}

/// Prefer the provider's JSON `error` member; fall back to the raw body.
fn provider_error_body(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body)
        && let Some(err) = v.get("error")
    {
        return truncate(&err.to_string(), ERROR_BODY_MAX);
    }
    truncate(body, ERROR_BODY_MAX)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let mut t: String = s.chars().take(max).collect();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}

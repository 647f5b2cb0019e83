use super::BackendAdapter;
use crate::errors::{FailureDetail, RunErrorKind, TargetError};
use crate::model::AttemptOutcome;
use crate::prompt::PreparedPrompt;
use crate::targets::{AnthropicSettings, AzureSettings};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You are a careful software engineer. Read every guideline before \
answering and answer the task directly.";

/// Longest provider error body kept in diagnostics.
const MAX_ERROR_BODY: usize = 2048;

#[derive(Debug, Clone)]
enum HostedApi {
    Azure(AzureSettings),
    Anthropic(AnthropicSettings),
}

/// Synchronous chat-completion backend over HTTP.
pub struct HostedAdapter {
    api: HostedApi,
    client: reqwest::Client,
}

enum HostedFailure {
    Timeout,
    Failed(FailureDetail),
}

impl HostedAdapter {
    pub fn azure(target: &str, settings: AzureSettings) -> Result<Self, TargetError> {
        Self::build(target, HostedApi::Azure(settings))
    }

    pub fn anthropic(target: &str, settings: AnthropicSettings) -> Result<Self, TargetError> {
        Self::build(target, HostedApi::Anthropic(settings))
    }

    fn build(target: &str, api: HostedApi) -> Result<Self, TargetError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|source| TargetError::Client {
                target: target.to_string(),
                source,
            })?;
        Ok(Self { api, client })
    }

    fn request(&self, prompt: &PreparedPrompt) -> reqwest::RequestBuilder {
        let user = prompt.render();
        match &self.api {
            HostedApi::Azure(s) => {
                let mut body = json!({
                    "messages": [
                        { "role": "system", "content": SYSTEM_PROMPT },
                        { "role": "user", "content": user },
                    ],
                });
                if let Some(t) = s.temperature {
                    body["temperature"] = json!(t);
                }
                if let Some(m) = s.max_tokens {
                    body["max_tokens"] = json!(m);
                }
                self.client
                    .post(azure_url(s))
                    .header("api-key", &s.api_key)
                    .json(&body)
            }
            HostedApi::Anthropic(s) => {
                let mut body = json!({
                    "model": s.model,
                    "max_tokens": s.max_tokens,
                    "system": SYSTEM_PROMPT,
                    "messages": [{ "role": "user", "content": user }],
                });
                if let Some(t) = s.temperature {
                    body["temperature"] = json!(t);
                }
                self.client
                    .post(ANTHROPIC_URL)
                    .header("x-api-key", &s.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
            }
        }
    }

    async fn complete(
        &self,
        prompt: &PreparedPrompt,
        deadline: Duration,
    ) -> Result<String, HostedFailure> {
        let provider = self.provider_name().to_string();
        let resp = self
            .request(prompt)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| transport_failure(&provider, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let mut detail = FailureDetail::new(
                RunErrorKind::Provider,
                format!("{} API returned HTTP {}", provider, status.as_u16()),
            )
            .with_provider(provider.clone())
            .with_status(status.as_u16());
            if !body.trim().is_empty() {
                detail = detail.with_cause(truncate(body.trim(), MAX_ERROR_BODY));
            }
            return Err(HostedFailure::Failed(detail));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| body_failure(&provider, e))?;

        let text = match &self.api {
            HostedApi::Azure(_) => azure_content(&json),
            HostedApi::Anthropic(_) => anthropic_content(&json),
        };
        text.ok_or_else(|| {
            HostedFailure::Failed(
                FailureDetail::new(
                    RunErrorKind::Provider,
                    format!("{} API response missing content", provider),
                )
                .with_provider(provider),
            )
        })
    }
}

fn transport_failure(provider: &str, e: reqwest::Error) -> HostedFailure {
    if e.is_timeout() {
        return HostedFailure::Timeout;
    }
    let err = anyhow::Error::new(e).context(format!("request to {} failed", provider));
    HostedFailure::Failed(
        FailureDetail::from_anyhow(RunErrorKind::Network, &err).with_provider(provider),
    )
}

/// A 2xx body that is not JSON is the provider's fault, not the network's.
fn body_failure(provider: &str, e: reqwest::Error) -> HostedFailure {
    if !e.is_decode() {
        return transport_failure(provider, e);
    }
    let err = anyhow::Error::new(e).context(format!("{} API returned an unreadable body", provider));
    HostedFailure::Failed(
        FailureDetail::from_anyhow(RunErrorKind::Provider, &err).with_provider(provider),
    )
}

pub fn azure_url(s: &AzureSettings) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        s.endpoint.trim_end_matches('/'),
        s.deployment,
        s.api_version
    )
}

/// `choices[0].message.content`
pub fn azure_content(json: &serde_json::Value) -> Option<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Concatenated `text` blocks of a messages response.
pub fn anthropic_content(json: &serde_json::Value) -> Option<String> {
    let blocks = json.get("content")?.as_array()?;
    let parts: Vec<&str> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(""))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[async_trait]
impl BackendAdapter for HostedAdapter {
    async fn dispatch(&self, prompt: &PreparedPrompt, deadline: Duration) -> AttemptOutcome {
        match self.complete(prompt, deadline).await {
            Ok(text) => AttemptOutcome::Success(text),
            Err(HostedFailure::Timeout) => {
                tracing::warn!(
                    provider = self.provider_name(),
                    test_id = %prompt.test_id,
                    deadline_ms = deadline.as_millis() as u64,
                    "hosted request timed out"
                );
                AttemptOutcome::Timeout
            }
            Err(HostedFailure::Failed(detail)) => AttemptOutcome::Error(detail),
        }
    }

    fn provider_name(&self) -> &str {
        match self.api {
            HostedApi::Azure(_) => "azure",
            HostedApi::Anthropic(_) => "anthropic",
        }
    }

    fn model_name(&self) -> &str {
        match &self.api {
            HostedApi::Azure(s) => &s.deployment,
            HostedApi::Anthropic(s) => &s.model,
        }
    }
}

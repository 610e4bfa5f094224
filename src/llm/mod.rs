#[cfg(test)]
mod tests;

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::config::Config;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Request timeout. Generation is slow, so this is looser than the other
/// provider clients.
const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

/// Thin wrapper over the hosted messages API: prompt in, text out.
#[derive(Debug, Clone)]
pub struct LlmClient {
    base_url: Url,
    api_key: String,
    model: String,
    max_tokens: u32,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: ResponseContent,
}

/// The API has returned both shapes over time; normalize either into text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

impl LlmClient {
    #[inline]
    pub fn new(config: &Config) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is a valid URL"),
            api_key: config.anthropic_api_key.clone(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            agent,
        }
    }

    #[inline]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Send a prompt and return the generated text.
    ///
    /// Provider failures carry full detail for the server-side log; callers
    /// at the HTTP boundary are expected to replace them with a generic
    /// internal error before responding.
    #[inline]
    pub fn complete(&self, prompt: &str) -> Result<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let url = self
            .base_url
            .join("/v1/messages")
            .context("Failed to build messages URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize messages request")?;

        debug!(
            "Requesting completion from {} (prompt length {})",
            self.model,
            prompt.len()
        );

        let response_text = self
            .agent
            .post(url.as_str())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| {
                error!("LLM request failed: {e}");
                anyhow::anyhow!("LLM request failed: {e}")
            })?;

        let response: MessagesResponse = serde_json::from_str(&response_text)
            .context("Failed to parse messages response")?;

        Ok(normalize_content(response.content))
    }
}

fn normalize_content(content: ResponseContent) -> String {
    match content {
        ResponseContent::Text(text) => text,
        ResponseContent::Blocks(blocks) => blocks
            .into_iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join(""),
    }
}

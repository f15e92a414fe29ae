//! Chat-completions client for any OpenAI-compatible endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::providers::error::clip;
use crate::providers::ProviderError;
use crate::traits::{ModelProvider, ProviderResponse, TokenUsage, ToolCall};

pub struct OpenAiCompatibleProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

/// The API key travels in a header, so plain HTTP is only acceptable when
/// it never leaves the machine (local inference servers).
fn check_base_url(base_url: &str) -> Result<(), String> {
    let parsed = reqwest::Url::parse(base_url)
        .map_err(|e| format!("invalid base_url '{}': {}", base_url, e))?;
    let host = parsed.host_str().unwrap_or("");
    let local = matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1");

    match parsed.scheme() {
        "https" => Ok(()),
        "http" if local => {
            warn!(base_url, "Plain HTTP to a local LLM server; the API key is sent in cleartext");
            Ok(())
        }
        "http" => Err(format!(
            "refusing plain HTTP to remote host '{}'; use https so the API key is protected in transit",
            host
        )),
        scheme => Err(format!("base_url scheme must be http or https, got '{}'", scheme)),
    }
}

/// Interpret a chat-completions response body. Split out so the parsing
/// rules are testable without a live endpoint.
fn decode_chat_body(model: &str, body: &str) -> Result<ProviderResponse, ProviderError> {
    let data: Value = serde_json::from_str(body)
        .map_err(|e| ProviderError::protocol(format!("response is not JSON: {}", e)))?;

    let message = data["choices"]
        .get(0)
        .map(|choice| &choice["message"])
        .ok_or_else(|| ProviderError::protocol("response has no choices"))?;

    let content = message["content"].as_str().map(str::to_string);

    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .map(|call| ToolCall {
                    id: call["id"].as_str().unwrap_or("").to_string(),
                    name: call["function"]["name"].as_str().unwrap_or("").to_string(),
                    arguments: call["function"]["arguments"]
                        .as_str()
                        .unwrap_or("{}")
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let usage = data.get("usage").and_then(|u| {
        Some(TokenUsage {
            input_tokens: u.get("prompt_tokens")?.as_u64()? as u32,
            output_tokens: u.get("completion_tokens")?.as_u64()? as u32,
            model: model.to_string(),
        })
    });

    Ok(ProviderResponse {
        content,
        tool_calls,
        usage,
    })
}

impl OpenAiCompatibleProvider {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, String> {
        check_base_url(base_url)?;

        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatibleProvider {
    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        tools: &[Value],
    ) -> anyhow::Result<ProviderResponse> {
        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        let url = format!("{}/chat/completions", self.base_url);
        info!(model, url = %url, tools = tools.len(), "Calling LLM API");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("LLM request failed: {}", e);
                ProviderError::transport(&e)
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::transport(&e))?;

        if !status.is_success() {
            error!(status = %status, "LLM API returned an error: {}", clip(&text, 600));
            return Err(ProviderError::http(status.as_u16(), &text).into());
        }

        debug!("LLM response body: {}", clip(&text, 2000));
        Ok(decode_chat_body(model, &text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_and_local_http_accepted() {
        assert!(check_base_url("https://api.openai.com/v1").is_ok());
        assert!(check_base_url("http://localhost:11434/v1").is_ok());
        assert!(check_base_url("http://127.0.0.1:1234").is_ok());
    }

    #[test]
    fn remote_http_and_odd_schemes_rejected() {
        assert!(check_base_url("http://api.example.com/v1").is_err());
        assert!(check_base_url("ftp://example.com").is_err());
        assert!(check_base_url("not a url").is_err());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = OpenAiCompatibleProvider::new("https://api.openai.com/v1/", "k").unwrap();
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn decodes_text_content() {
        let body = r#"{
            "choices": [{"message": {"content": "Paris."}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        }"#;
        let resp = decode_chat_body("m", body).unwrap();
        assert_eq!(resp.content.as_deref(), Some("Paris."));
        assert!(resp.tool_calls.is_empty());
        let usage = resp.usage.unwrap();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.model, "m");
    }

    #[test]
    fn decodes_tool_calls_with_string_arguments() {
        let body = r#"{
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "function": {"name": "retrieve_documents", "arguments": "{\"query\": \"q\"}"}
                }]
            }}]
        }"#;
        let resp = decode_chat_body("m", body).unwrap();
        assert!(resp.content.is_none());
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "retrieve_documents");
        assert_eq!(resp.tool_calls[0].arguments, r#"{"query": "q"}"#);
    }

    #[test]
    fn missing_choices_is_a_protocol_error() {
        let err = decode_chat_body("m", r#"{"object": "error"}"#).unwrap_err();
        assert_eq!(err.kind, crate::providers::ProviderErrorKind::Protocol);
        let err = decode_chat_body("m", "<html>oops</html>").unwrap_err();
        assert_eq!(err.kind, crate::providers::ProviderErrorKind::Protocol);
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, exactly as the model emitted them.
    pub arguments: String,
}

/// Token accounting reported by the provider for one call.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub model: String,
}

/// What came back from one model call: text, tool calls, or both.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

/// The LLM seam: ship messages and tool definitions, get a response back.
///
/// Messages and tool definitions use the OpenAI chat-completions JSON shapes.
/// Every LLM-dependent component talks through this trait so the model side
/// can be scripted in tests.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        tools: &[Value],
    ) -> anyhow::Result<ProviderResponse>;
}

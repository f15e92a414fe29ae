//! Test infrastructure: MockProvider, StubRetriever, and an engine harness.
//!
//! Provides a fully wired Engine with a scripted LLM and an in-memory
//! retriever, suitable for tests that exercise the real routing pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::agent::Engine;
use crate::config::AppConfig;
use crate::rag::{ChunkRetriever, RetrievedChunk};
use crate::traits::{ModelProvider, ProviderResponse, TokenUsage, ToolCall};

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// A recorded call to `MockProvider::chat()`.
#[derive(Debug, Clone)]
pub struct MockChatCall {
    pub model: String,
    pub messages: Vec<Value>,
    pub tools: Vec<Value>,
}

/// Mock LLM provider that returns scripted responses in FIFO order.
pub struct MockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    fail_with: Option<String>,
    call_log: Mutex<Vec<MockChatCall>>,
}

impl MockProvider {
    /// A provider that always returns "Mock response".
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            fail_with: None,
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// A provider with a FIFO queue of scripted responses.
    pub fn with_responses(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            fail_with: None,
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose every call fails.
    pub fn failing(message: &str) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// A scripted response carrying only assistant text.
    pub fn text_response(text: &str) -> ProviderResponse {
        ProviderResponse {
            content: Some(text.to_string()),
            tool_calls: vec![],
            usage: Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                model: "mock".to_string(),
            }),
        }
    }

    /// A scripted response requesting one tool call.
    pub fn tool_call_response(tool_name: &str, args: &str) -> ProviderResponse {
        ProviderResponse {
            content: None,
            tool_calls: vec![ToolCall {
                id: format!("call_{}", tool_name),
                name: tool_name.to_string(),
                arguments: args.to_string(),
            }],
            usage: None,
        }
    }

    pub async fn calls(&self) -> Vec<MockChatCall> {
        self.call_log.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.call_log.lock().await.len()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        tools: &[Value],
    ) -> anyhow::Result<ProviderResponse> {
        self.call_log.lock().await.push(MockChatCall {
            model: model.to_string(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
        });

        if let Some(message) = &self.fail_with {
            anyhow::bail!("{}", message);
        }

        let mut responses = self.responses.lock().await;
        if responses.is_empty() {
            Ok(Self::text_response("Mock response"))
        } else {
            Ok(responses.remove(0))
        }
    }
}

// ---------------------------------------------------------------------------
// StubRetriever
// ---------------------------------------------------------------------------

/// In-memory retriever serving fixed chunks, ranked in listed order.
pub struct StubRetriever {
    chunks: Vec<RetrievedChunk>,
    dropped: Mutex<Vec<String>>,
}

impl StubRetriever {
    /// Empty index: every retrieval returns no hits.
    pub fn empty() -> Self {
        Self {
            chunks: Vec::new(),
            dropped: Mutex::new(Vec::new()),
        }
    }

    /// Fixed chunk texts attributed to "doc.pdf", scored in descending
    /// listed order.
    pub fn with_chunks(texts: Vec<&str>) -> Self {
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(idx, text)| RetrievedChunk {
                text: text.to_string(),
                rank: idx + 1,
                score: 0.95 - idx as f64 * 0.05,
                file_name: Some("doc.pdf".to_string()),
                chunk_index: Some(idx as i64 + 1),
                total_chunks_in_file: Some(texts.len() as i64),
            })
            .collect();
        Self {
            chunks,
            dropped: Mutex::new(Vec::new()),
        }
    }

    pub async fn dropped_partitions(&self) -> Vec<String> {
        self.dropped.lock().await.clone()
    }
}

#[async_trait]
impl ChunkRetriever for StubRetriever {
    async fn retrieve(&self, _session_id: &str, _query: &str, top_k: usize) -> Vec<RetrievedChunk> {
        self.chunks.iter().take(top_k).cloned().collect()
    }

    async fn drop_partition(&self, session_id: &str) -> anyhow::Result<()> {
        self.dropped.lock().await.push(session_id.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Engine harness
// ---------------------------------------------------------------------------

/// Opt-in tracing for test debugging (`RUST_LOG=debug cargo test ...`).
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Config pointing all state at a throwaway directory.
pub fn test_config(data_dir: &std::path::Path) -> AppConfig {
    let toml = format!(
        r#"
        [provider]
        api_key = "test-key"

        [provider.models]
        primary = "primary-model"
        fast = "fast-model"

        [state]
        data_dir = "{}"
        "#,
        data_dir.display()
    );
    toml::from_str(&toml).expect("test config parses")
}

/// A fully wired engine over a scripted provider and stub retriever.
pub fn test_engine(
    data_dir: &std::path::Path,
    provider: Arc<MockProvider>,
    retriever: Arc<StubRetriever>,
) -> Engine {
    init_tracing();
    let config = test_config(data_dir);
    Engine::new(&config, provider, retriever)
}

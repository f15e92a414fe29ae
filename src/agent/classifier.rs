//! Intent classification: one constrained LLM call that either picks a
//! tool or declines.
//!
//! The model is a router, not an answerer. Its raw output is validated at
//! this boundary into a [`RouteDecision`]: a response with no tool call
//! normalizes to `NoToolRequired` regardless of any text content, and tool
//! arguments are never trusted for identity; only an optional result-count
//! hint is read back.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::traits::ModelProvider;

/// Tool identity for document retrieval.
pub const RAG_TOOL: &str = "retrieve_documents";
/// Tool identity for database querying.
pub const DB_TOOL: &str = "query_database";

/// Validated classifier output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    ToolCall {
        name: String,
        /// Result-count hint for retrieval, when the model provided one.
        top_k: Option<usize>,
    },
    NoToolRequired,
}

/// OpenAI-format definitions for the two bound tools.
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": RAG_TOOL,
                "description": "Retrieve the most relevant text chunks from the user's uploaded \
                                documents. Call this whenever the answer depends on uploaded \
                                document content (reports, manuals, policies, notes). This tool \
                                only retrieves data; a separate step generates the answer.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The user's question, unchanged"
                        },
                        "top_k": {
                            "type": "integer",
                            "description": "How many chunks to retrieve (optional)"
                        }
                    },
                    "required": ["query"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": DB_TOOL,
                "description": "Translate the question into a read-only SQL query against the \
                                session's connected database and return raw rows. Call this when \
                                the answer requires filtering, aggregation, grouping, sorting or \
                                counting over structured tables. This tool only returns data; a \
                                separate step explains the results.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The user's question, unchanged"
                        }
                    },
                    "required": ["query"]
                }
            }
        }),
    ]
}

fn system_prompt(docs: &[String]) -> String {
    let docs_text = if docs.is_empty() {
        "No uploaded documents found in this session.".to_string()
    } else {
        format!("Uploaded documents in this session: {}", docs.join(", "))
    };

    format!(
        "You are the intent router for a question answering system.\n\
         \n\
         Your ONLY responsibility is deciding whether the user's query requires\n\
         one of the available tools. You do not answer, explain, summarize,\n\
         reason, guess missing information, combine tools, or modify the\n\
         question. Another component is responsible for answering.\n\
         \n\
         Call {rag} ONLY when the answer depends on uploaded document content\n\
         (explicit references like \"according to the document\", or questions\n\
         that must be grounded in document text: policies, clauses, report\n\
         contents).\n\
         \n\
         Call {db} ONLY when the answer requires querying structured database\n\
         tables: filtering rows, aggregations, GROUP BY / ORDER BY, time\n\
         comparisons, rankings, fetching specific records.\n\
         \n\
         If the question is general knowledge, conceptual, or conversational,\n\
         output an assistant message with the exact text NO_TOOL_REQUIRED and\n\
         nothing else.\n\
         \n\
         You MUST output exactly one of: a call to {rag}, a call to {db}, or\n\
         the text NO_TOOL_REQUIRED.\n\
         \n\
         Session metadata:\n\
         {docs}",
        rag = RAG_TOOL,
        db = DB_TOOL,
        docs = docs_text,
    )
}

pub struct IntentClassifier {
    provider: Arc<dyn ModelProvider>,
    model: String,
}

impl IntentClassifier {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Classify the latest user message. LLM failure is fatal for this
    /// query. Retries, if any, belong to the provider client.
    pub async fn classify(
        &self,
        query: &str,
        docs: &[String],
    ) -> Result<RouteDecision, EngineError> {
        let messages = vec![
            json!({ "role": "system", "content": system_prompt(docs) }),
            json!({ "role": "user", "content": query }),
        ];
        let tools = tool_definitions();

        let response = self
            .provider
            .chat(&self.model, &messages, &tools)
            .await
            .map_err(EngineError::Upstream)?;

        let Some(call) = response.tool_calls.first() else {
            info!("Classifier decision: no tool required");
            return Ok(RouteDecision::NoToolRequired);
        };
        if response.tool_calls.len() > 1 {
            warn!(
                count = response.tool_calls.len(),
                "Classifier returned multiple tool calls; using the first"
            );
        }

        let top_k = serde_json::from_str::<Value>(&call.arguments)
            .ok()
            .and_then(|args| args.get("top_k").and_then(Value::as_u64))
            .map(|k| k as usize);

        info!(tool = %call.name, "Classifier decision: tool call");
        Ok(RouteDecision::ToolCall {
            name: call.name.clone(),
            top_k,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;

    #[tokio::test]
    async fn text_only_response_normalizes_to_no_tool() {
        let provider = Arc::new(MockProvider::with_responses(vec![
            MockProvider::text_response("I think the answer is Paris, by the way."),
        ]));
        let classifier = IntentClassifier::new(provider, "fast");

        let decision = classifier
            .classify("What is the capital of France?", &[])
            .await
            .unwrap();
        assert_eq!(decision, RouteDecision::NoToolRequired);
    }

    #[tokio::test]
    async fn tool_call_is_surfaced_with_top_k_hint() {
        let provider = Arc::new(MockProvider::with_responses(vec![
            MockProvider::tool_call_response(RAG_TOOL, r#"{"query": "q3 revenue", "top_k": 3}"#),
        ]));
        let classifier = IntentClassifier::new(provider, "fast");

        let decision = classifier
            .classify("According to the report, what was Q3 revenue?", &["report.pdf".to_string()])
            .await
            .unwrap();
        assert_eq!(
            decision,
            RouteDecision::ToolCall {
                name: RAG_TOOL.to_string(),
                top_k: Some(3),
            }
        );
    }

    #[tokio::test]
    async fn malformed_arguments_still_yield_the_tool_decision() {
        let provider = Arc::new(MockProvider::with_responses(vec![
            MockProvider::tool_call_response(DB_TOOL, "not json"),
        ]));
        let classifier = IntentClassifier::new(provider, "fast");

        let decision = classifier.classify("total orders by month", &[]).await.unwrap();
        assert_eq!(
            decision,
            RouteDecision::ToolCall {
                name: DB_TOOL.to_string(),
                top_k: None,
            }
        );
    }

    #[tokio::test]
    async fn document_names_reach_the_system_prompt() {
        let mock = Arc::new(MockProvider::with_responses(vec![
            MockProvider::text_response("NO_TOOL_REQUIRED"),
        ]));
        let classifier = IntentClassifier::new(mock.clone(), "fast");

        classifier
            .classify("hello", &["impact.pdf".to_string(), "notes.txt".to_string()])
            .await
            .unwrap();

        let calls = mock.calls().await;
        let system = calls[0].messages[0]["content"].as_str().unwrap();
        assert!(system.contains("impact.pdf, notes.txt"));
        // Both tool definitions were bound.
        assert_eq!(calls[0].tools.len(), 2);
    }

    #[tokio::test]
    async fn provider_failure_is_fatal_for_the_query() {
        let provider = Arc::new(MockProvider::failing("llm down"));
        let classifier = IntentClassifier::new(provider, "fast");

        let err = classifier.classify("anything", &[]).await.unwrap_err();
        assert!(matches!(err, EngineError::Upstream(_)));
    }
}

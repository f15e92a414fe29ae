//! Graph state for one query's classify → tool → finalize pass.

use serde_json::{Map, Value};

use crate::error::EngineError;
use crate::types::FinalAnswer;

/// A tool's output as it crosses the serialization boundary: either still
/// structured, or a serialized form that must be decoded back. One
/// normalization function owns the conversion; nothing is silently
/// coerced elsewhere.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    RawText(String),
    Structured(Map<String, Value>),
}

impl ToolOutput {
    /// Yield the canonical mapping or signal a contract violation.
    pub fn normalize(self) -> Result<Map<String, Value>, EngineError> {
        match self {
            ToolOutput::Structured(map) => Ok(map),
            ToolOutput::RawText(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(other) => Err(EngineError::contract(format!(
                    "tool payload decoded to {} instead of an object",
                    json_type_name(&other)
                ))),
                Err(e) => Err(EngineError::contract(format!(
                    "tool payload is not valid JSON: {}",
                    e
                ))),
            },
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One message in the query's graph transcript. The finalizer dispatches on
/// the last entry's shape.
#[derive(Debug, Clone)]
pub enum GraphMessage {
    /// The user's question.
    User(String),
    /// Classifier decision: answer without tools.
    NoToolRequired,
    /// Classifier decision: invoke a tool with these arguments.
    ToolInvocation { name: String, arguments: Value },
    /// A tool's result, pending normalization.
    ToolResult { tool: String, output: ToolOutput },
    /// The assistant's final reply text.
    Assistant(String),
}

/// Per-query state threaded through the graph.
pub struct AgentState {
    pub session_id: String,
    pub docs: Vec<String>,
    pub messages: Vec<GraphMessage>,
    pub final_output: Option<FinalAnswer>,
}

impl AgentState {
    pub fn new(session_id: &str, docs: Vec<String>, query: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            docs,
            messages: vec![GraphMessage::User(query.to_string())],
            final_output: None,
        }
    }

    /// Most recent user question, if any.
    pub fn last_user_query(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            GraphMessage::User(q) => Some(q.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_output_passes_through() {
        let mut map = Map::new();
        map.insert("query".into(), json!("q"));
        let normalized = ToolOutput::Structured(map.clone()).normalize().unwrap();
        assert_eq!(normalized, map);
    }

    #[test]
    fn raw_json_object_decodes() {
        let normalized = ToolOutput::RawText(r#"{"query": "q", "rows": []}"#.to_string())
            .normalize()
            .unwrap();
        assert_eq!(normalized["query"], json!("q"));
    }

    #[test]
    fn non_object_and_invalid_json_are_contract_violations() {
        let err = ToolOutput::RawText("[1, 2, 3]".to_string())
            .normalize()
            .unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation(_)));
        assert!(err.to_string().contains("an array"));

        let err = ToolOutput::RawText("not json at all".to_string())
            .normalize()
            .unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation(_)));
    }

    #[test]
    fn last_user_query_finds_the_question() {
        let mut state = AgentState::new("s", vec![], "the question");
        state.messages.push(GraphMessage::NoToolRequired);
        assert_eq!(state.last_user_query(), Some("the question"));
    }
}

//! Terminal node: turn the graph transcript into exactly one FinalAnswer.
//!
//! Dispatch is on the last message's shape. Two shapes are legal (the
//! no-tool decision and a tool result); anything else is a defect in
//! an upstream stage, signaled as a contract violation rather than papered
//! over with a best-effort answer.

use serde_json::{Map, Value};
use tracing::info;

use super::state::{AgentState, GraphMessage};
use super::{answers, classifier, Engine};
use crate::db::executor::run_db_generation;
use crate::error::EngineError;
use crate::memory::{context_excluding_pending_user, MemoryRole};
use crate::rag::pipeline::run_rag_generation;
use crate::types::{AnswerMode, Citation, FinalAnswer};

impl Engine {
    /// Produce the final answer for a completed graph pass.
    pub(super) async fn finalize(&self, state: &mut AgentState) -> Result<FinalAnswer, EngineError> {
        info!(session_id = %state.session_id, "Finalize");

        let last = state
            .messages
            .last()
            .cloned()
            .ok_or_else(|| EngineError::contract("finalize reached with an empty transcript"))?;

        let answer = match last {
            GraphMessage::NoToolRequired => self.finalize_general(state).await?,
            GraphMessage::ToolResult { tool, output } => {
                let payload = output.normalize()?;
                match tool.as_str() {
                    classifier::RAG_TOOL => self.finalize_rag(state, payload).await?,
                    classifier::DB_TOOL => self.finalize_db(state, &payload).await?,
                    other => {
                        return Err(EngineError::contract(format!(
                            "finalize: unknown tool '{}'",
                            other
                        )))
                    }
                }
            }
            other => {
                return Err(EngineError::contract(format!(
                    "finalize: unexpected terminal message {:?}",
                    message_shape(&other)
                )))
            }
        };

        state
            .messages
            .push(GraphMessage::Assistant(answer.response.clone()));
        state.final_output = Some(answer.clone());
        Ok(answer)
    }

    /// No-tool path: general answer over conversation memory.
    async fn finalize_general(&self, state: &AgentState) -> Result<FinalAnswer, EngineError> {
        let query = state
            .last_user_query()
            .ok_or_else(|| EngineError::contract("no-tool path without a user question"))?
            .to_string();

        self.memory
            .append(&state.session_id, MemoryRole::User, &query);
        let snapshot = self.memory.snapshot(&state.session_id);
        let memory_text = context_excluding_pending_user(&snapshot);

        let response = answers::generate_general_answer(
            &self.provider,
            &self.models.primary,
            &query,
            memory_text.as_deref(),
        )
        .await;

        self.memory
            .append(&state.session_id, MemoryRole::Assistant, &response);

        Ok(FinalAnswer {
            mode: AnswerMode::General,
            query,
            response,
            model: self.models.primary.clone(),
            used_chunks: 0,
            citations: Vec::new(),
            formatted_citations: "No citations available.".to_string(),
        })
    }

    /// Document path: second-stage RAG generation over the tool payload.
    async fn finalize_rag(
        &self,
        state: &AgentState,
        payload: Map<String, Value>,
    ) -> Result<FinalAnswer, EngineError> {
        // Recover the question from the transcript if the payload lost it.
        let query = payload
            .get("query")
            .and_then(Value::as_str)
            .or_else(|| state.last_user_query())
            .ok_or_else(|| EngineError::contract("document payload missing 'query'"))?
            .to_string();

        let chunks: Vec<String> = payload
            .get("chunks")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let citations: Vec<Citation> = payload
            .get("citations")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| EngineError::contract(format!("document payload citations invalid: {}", e)))?
            .unwrap_or_default();

        Ok(run_rag_generation(
            &self.provider,
            &self.models.primary,
            &self.memory,
            &state.session_id,
            &query,
            chunks,
            citations,
        )
        .await)
    }

    /// Database path: explanation phase over the tool payload.
    async fn finalize_db(
        &self,
        state: &AgentState,
        payload: &Map<String, Value>,
    ) -> Result<FinalAnswer, EngineError> {
        run_db_generation(
            &self.provider,
            &self.models.primary,
            &self.memory,
            &state.session_id,
            payload,
        )
        .await
    }
}

fn message_shape(message: &GraphMessage) -> &'static str {
    match message {
        GraphMessage::User(_) => "User",
        GraphMessage::NoToolRequired => "NoToolRequired",
        GraphMessage::ToolInvocation { .. } => "ToolInvocation",
        GraphMessage::ToolResult { .. } => "ToolResult",
        GraphMessage::Assistant(_) => "Assistant",
    }
}

//! Two-phase RAG path.
//!
//! Retrieval phase (the document tool): record the question, search the
//! session partition, prepare context and citations, return data only.
//! Generation phase: combine conversation memory with the retrieved
//! chunks, produce the grounded answer, record it, and format citations.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::info;

use crate::agent::answers;
use crate::error::EngineError;
use crate::memory::{context_excluding_pending_user, MemoryRole, MemoryStore};
use crate::rag::citations::{format_citations, prepare_context_and_citations};
use crate::rag::ChunkRetriever;
use crate::traits::ModelProvider;
use crate::types::{AnswerMode, Citation, FinalAnswer};

/// Retrieval-only tool phase. Returns the document tool payload
/// (`{query, chunks, citations}`), never an LLM answer.
pub async fn run_rag_retrieval(
    retriever: &Arc<dyn ChunkRetriever>,
    memory: &MemoryStore,
    session_id: &str,
    query: &str,
    top_k: usize,
    public_base_url: &str,
) -> Result<Map<String, Value>, EngineError> {
    info!(session_id, query, top_k, "RAG retrieval start");

    memory.append(session_id, MemoryRole::User, query);

    let hits = retriever.retrieve(session_id, query, top_k).await;
    let prepared = prepare_context_and_citations(&hits, session_id, public_base_url);
    info!(session_id, chunks = prepared.chunks.len(), "RAG retrieval complete");

    let citations = serde_json::to_value(&prepared.citations)
        .map_err(|e| EngineError::contract(format!("citations not serializable: {}", e)))?;

    let mut payload = Map::new();
    payload.insert("query".into(), json!(query));
    payload.insert("chunks".into(), json!(prepared.chunks));
    payload.insert("citations".into(), citations);
    Ok(payload)
}

/// Generation phase: grounded answer over memory + chunks.
pub async fn run_rag_generation(
    provider: &Arc<dyn ModelProvider>,
    model: &str,
    memory: &MemoryStore,
    session_id: &str,
    query: &str,
    chunks: Vec<String>,
    citations: Vec<Citation>,
) -> FinalAnswer {
    info!(session_id, chunks = chunks.len(), "RAG generation start");

    let snapshot = memory.snapshot(session_id);
    let memory_text = context_excluding_pending_user(&snapshot);

    let mut context = Vec::with_capacity(chunks.len() + 1);
    if let Some(history) = memory_text {
        context.push(format!("Conversation history:\n{}", history));
    }
    context.extend(chunks.iter().cloned());

    let response = answers::generate_rag_answer(provider, model, query, &context).await;

    memory.append(session_id, MemoryRole::Assistant, &response);

    let formatted_citations = format_citations(&citations);
    FinalAnswer {
        mode: AnswerMode::Rag,
        query: query.to_string(),
        response,
        model: model.to_string(),
        used_chunks: chunks.len(),
        citations,
        formatted_citations,
    }
}

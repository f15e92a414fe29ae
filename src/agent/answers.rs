//! Final answer generators for the three paths.
//!
//! One shared mode-switched prompt backs general, document-grounded, and
//! database-grounded generation. These calls are allowed to degrade: an
//! upstream LLM failure produces an apologetic answer instead of an error,
//! because by this point tool work has already succeeded.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::traits::ModelProvider;

fn build_answer_prompt(mode: &str, context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant in a multi-capability chat application.\n\
         \n\
         You operate in one of three modes:\n\
         \n\
         1) MODE = \"general\"\n\
            - Normal conversational or general-knowledge question\n\
            - No documents, no database; use conversation context if provided\n\
         \n\
         2) MODE = \"rag\"\n\
            - The question MUST be answered from the provided document context\n\
            - Treat the context as the primary source of truth\n\
            - If the context is insufficient, say so; do NOT invent specific\n\
              document details\n\
         \n\
         3) MODE = \"db\"\n\
            - The answer MUST be based ONLY on the database query result rows\n\
            - Explain what the data shows in clear language\n\
            - Do NOT invent rows or values, and do NOT assume anything beyond\n\
              the given data\n\
            - If the rows are empty, clearly say no results were found\n\
         \n\
         Guidelines for every mode: be clear and well structured, prefer short\n\
         paragraphs, and be honest about uncertainty.\n\
         \n\
         MODE: {mode}\n\
         \n\
         Context (conversation history and/or grounding data):\n\
         {context}\n\
         \n\
         User question:\n\
         {question}\n\
         \n\
         Your response:",
        mode = mode,
        context = context,
        question = question,
    )
}

/// Run one generation call, degrading to an apologetic message on failure.
async fn generate(
    provider: &Arc<dyn ModelProvider>,
    model: &str,
    mode: &str,
    context: &str,
    question: &str,
) -> String {
    let prompt = build_answer_prompt(mode, context, question);
    let messages = vec![json!({ "role": "user", "content": prompt })];

    match provider.chat(model, &messages, &[]).await {
        Ok(response) => {
            let text = response.content.unwrap_or_default();
            if text.trim().is_empty() {
                warn!(mode, "Answer generation returned empty content");
                "The model returned an empty answer. Please try again.".to_string()
            } else {
                text
            }
        }
        Err(e) => {
            warn!(mode, "Answer generation failed: {}", e);
            format!("Unable to generate an answer right now: {}", e)
        }
    }
}

/// General (no-tool) answer over prior conversation context.
pub async fn generate_general_answer(
    provider: &Arc<dyn ModelProvider>,
    model: &str,
    query: &str,
    memory_text: Option<&str>,
) -> String {
    info!(query, "Generating general answer");
    let context = memory_text.unwrap_or("No prior conversation context is available.");
    generate(provider, model, "general", context, query).await
}

/// Document-grounded answer over the prepared context chunks.
pub async fn generate_rag_answer(
    provider: &Arc<dyn ModelProvider>,
    model: &str,
    query: &str,
    context_chunks: &[String],
) -> String {
    info!(query, chunks = context_chunks.len(), "Generating RAG answer");
    let context = if context_chunks.is_empty() {
        "No document context was retrieved for this query. Answer from general \
         knowledge, but say that no supporting document passage was found."
            .to_string()
    } else {
        context_chunks.join("\n\n")
    };
    generate(provider, model, "rag", &context, query).await
}

/// Database-grounded explanation of the executed query's rows.
pub async fn generate_db_answer(
    provider: &Arc<dyn ModelProvider>,
    model: &str,
    query: &str,
    sql: &str,
    engine_kind: &str,
    rows: &[Value],
    memory_text: Option<&str>,
) -> String {
    info!(query, rows = rows.len(), "Generating DB answer");

    let mut context_parts = Vec::new();
    if let Some(history) = memory_text {
        context_parts.push(format!("Conversation history:\n{}", history));
    }
    context_parts.push(format!("Database type: {}", engine_kind));
    context_parts.push(format!("Executed SQL:\n{}", sql));
    context_parts.push(format!(
        "Query result rows:\n{}",
        serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
    ));

    generate(provider, model, "db", &context_parts.join("\n\n"), query).await
}

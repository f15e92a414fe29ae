use serde::{Deserialize, Serialize};

use crate::db::EngineKind;

/// Which answer path produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// No tool was used; the model answered from general knowledge.
    General,
    /// Answer grounded in retrieved document chunks.
    Rag,
    /// Answer grounded in database query results.
    Db,
}

/// Coarse marker on generated SQL: was the schema judged sufficient?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::High => "high",
        }
    }
}

/// Structured provenance attached to a final answer.
///
/// A response's citation list is homogeneous per request: all document
/// citations on the RAG path, a single database citation on the DB path,
/// empty on the general path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Citation {
    Rag {
        /// 1 = most similar hit.
        rank: usize,
        score: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        /// Deterministic public link; None when session id or file name
        /// is missing rather than a malformed URL.
        #[serde(skip_serializing_if = "Option::is_none")]
        public_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        chunk_index: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_chunks_in_file: Option<i64>,
    },
    Database {
        engine_kind: EngineKind,
        tables: Vec<String>,
        sql: String,
    },
}

/// The single normalized answer surfaced to the caller. Built once per
/// query by the finalizer; immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct FinalAnswer {
    pub mode: AnswerMode,
    pub query: String,
    pub response: String,
    /// Model id that generated the response text.
    pub model: String,
    /// Number of document chunks grounding the answer (0 outside RAG).
    pub used_chunks: usize,
    pub citations: Vec<Citation>,
    /// Human-readable rendering of `citations`.
    pub formatted_citations: String,
}

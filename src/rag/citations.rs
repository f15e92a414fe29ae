//! Citation building and rendering.
//!
//! Pure transformations: raw retrieval hits become `(context, citations)`,
//! and any citation list renders to one human-readable block. No side
//! effects, no network, idempotent.

use crate::rag::RetrievedChunk;
use crate::types::Citation;

/// Context chunks for the LLM plus their structured citations, in rank
/// order. Hits with empty text are dropped from both.
#[derive(Debug, Clone, Default)]
pub struct PreparedContext {
    pub chunks: Vec<String>,
    pub citations: Vec<Citation>,
}

/// Build LLM context and citation metadata from retrieval hits.
pub fn prepare_context_and_citations(
    hits: &[RetrievedChunk],
    session_id: &str,
    public_base_url: &str,
) -> PreparedContext {
    let mut prepared = PreparedContext::default();

    for hit in hits {
        if hit.text.is_empty() {
            continue;
        }
        prepared.chunks.push(hit.text.clone());
        prepared.citations.push(Citation::Rag {
            rank: hit.rank,
            score: hit.score,
            file_name: hit.file_name.clone(),
            public_url: public_url(public_base_url, session_id, hit.file_name.as_deref()),
            chunk_index: hit.chunk_index,
            total_chunks_in_file: hit.total_chunks_in_file,
        });
    }

    prepared
}

/// Deterministic public link for a cited file. Missing session id or file
/// name yields None rather than a malformed URL.
fn public_url(base_url: &str, session_id: &str, file_name: Option<&str>) -> Option<String> {
    let file_name = file_name.filter(|f| !f.is_empty())?;
    if session_id.is_empty() {
        return None;
    }
    Some(format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        session_id,
        percent_encode(file_name)
    ))
}

/// RFC 3986 unreserved-set percent encoding.
fn percent_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len() * 2);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

/// Render a citation list for display. Pure: same input, same output.
pub fn format_citations(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return "No citations available.".to_string();
    }

    let mut blocks = Vec::with_capacity(citations.len());
    for citation in citations {
        match citation {
            Citation::Rag {
                rank,
                file_name,
                public_url,
                chunk_index,
                total_chunks_in_file,
                ..
            } => {
                let file = file_name.as_deref().unwrap_or("unknown");
                let chunk = match (chunk_index, total_chunks_in_file) {
                    (Some(i), Some(n)) => format!(" (chunk {}/{})", i, n),
                    _ => String::new(),
                };
                let link = public_url.as_deref().unwrap_or("N/A");
                blocks.push(format!("[{}] {}{}\n    {}", rank, file, chunk, link));
            }
            Citation::Database {
                engine_kind,
                tables,
                sql,
            } => {
                blocks.push(format!(
                    "Source: {} database\nTables used: {}\nGenerated SQL:\n{}",
                    engine_kind.as_str().to_ascii_uppercase(),
                    tables.join(", "),
                    sql
                ));
            }
        }
    }
    blocks.join("\n")
}

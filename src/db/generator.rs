//! Natural-language → SQL generation with a fail-closed safety gate.
//!
//! The prompt instructs the model to emit a single read-only statement in
//! the bound engine's dialect, but prompt rules are advisory. The returned
//! text is therefore re-checked lexically after generation: anything that
//! is not a single SELECT with no statement separator and no mutating
//! keyword is treated identically to an explicit refusal.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::json;
use tracing::{info, warn};

use crate::db::{dialect_rules, DbSchema, EngineKind};
use crate::error::EngineError;
use crate::traits::ModelProvider;
use crate::types::Confidence;

/// Marker the prompt asks the model to emit when the schema cannot answer
/// the question.
const INSUFFICIENT_SCHEMA_MARKER: &str = "INSUFFICIENT_SCHEMA";

/// Mutating keywords that must never appear in generated SQL, matched as
/// whole tokens.
static DENYLIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(DROP|DELETE|TRUNCATE|ALTER|INSERT|UPDATE|MERGE)\b").unwrap()
});

/// Table names in FROM/JOIN clauses of the generated statement.
static TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:FROM|JOIN)\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Outcome of one generation attempt. `sql: None` means no statement could
/// be safely produced: a valid result, not an error.
#[derive(Debug, Clone)]
pub struct GeneratedSql {
    pub sql: Option<String>,
    pub engine: EngineKind,
    pub tables_used: Vec<String>,
    pub confidence: Confidence,
}

impl GeneratedSql {
    fn blocked(engine: EngineKind) -> Self {
        Self {
            sql: None,
            engine,
            tables_used: Vec::new(),
            confidence: Confidence::Low,
        }
    }
}

/// Models wrap output in code fences despite instructions; strip one layer.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop a language tag like "sql" on the opening fence line.
    match inner.split_once('\n') {
        Some((first, rest)) if first.trim().len() <= 10 && !first.contains(' ') => rest.trim(),
        _ => inner.trim(),
    }
}

/// Lexical read-only check: single SELECT, no `;`, no denylisted keyword.
pub fn passes_safety_gate(sql: &str) -> bool {
    let trimmed = sql.trim();
    let Some(head) = trimmed.get(..6) else {
        return false;
    };
    if !head.eq_ignore_ascii_case("SELECT") {
        return false;
    }
    if trimmed.contains(';') {
        return false;
    }
    !DENYLIST_RE.is_match(trimmed)
}

/// Extract table names from FROM/JOIN clauses of the *generated* SQL,
/// deduped in first-seen order. Best effort: tables referenced only inside
/// subqueries or CTE bodies that never hit a FROM/JOIN are missed.
pub fn extract_tables(sql: &str) -> Vec<String> {
    let mut tables = Vec::new();
    for cap in TABLE_RE.captures_iter(sql) {
        let name = cap[1].to_string();
        if !tables.iter().any(|t: &String| t.eq_ignore_ascii_case(&name)) {
            tables.push(name);
        }
    }
    tables
}

fn build_prompt(engine: EngineKind, schema_json: &str, question: &str) -> String {
    let dialect = dialect_rules(engine);
    format!(
        "You are an expert SQL query generator.\n\
         \n\
         Database engine: {name}\n\
         \n\
         DIALECT RULES (STRICT):\n\
         - Case-insensitive text matching uses: {like}\n\
         - Boolean TRUE is represented as: {btrue}\n\
         - Boolean FALSE is represented as: {bfalse}\n\
         - Current timestamp function: {now}\n\
         - Pagination syntax: {limit}\n\
         - Notes: {notes}\n\
         \n\
         SAFETY RULES (ABSOLUTE, NO EXCEPTIONS):\n\
         - ONLY generate READ-ONLY queries\n\
         - The query MUST start with SELECT\n\
         - The query MUST NOT contain DROP, DELETE, TRUNCATE, ALTER, INSERT, UPDATE or MERGE\n\
         - The query MUST NOT contain multiple statements; the character ';' is forbidden\n\
         - If the request implies data modification or schema changes, return exactly: NO SQL\n\
         \n\
         STRICT RULES (MANDATORY):\n\
         - Use ONLY tables and columns from the schema below\n\
         - Join ONLY along declared foreign keys\n\
         - Do NOT use SELECT *\n\
         - Do NOT add explanations, comments, markdown or backticks\n\
         - If the schema cannot answer the question, return exactly: {marker}\n\
         - Return ONLY ONE valid {name} query\n\
         \n\
         Database schema (JSON):\n\
         {schema}\n\
         \n\
         User question:\n\
         {question}\n\
         \n\
         Return ONLY SQL:",
        name = dialect.name,
        like = dialect.case_insensitive_like,
        btrue = dialect.boolean_true,
        bfalse = dialect.boolean_false,
        now = dialect.date_now,
        limit = dialect.limit_syntax,
        notes = dialect.notes,
        marker = INSUFFICIENT_SCHEMA_MARKER,
        schema = schema_json,
        question = question,
    )
}

pub struct SqlGenerator {
    provider: Arc<dyn ModelProvider>,
    model: String,
}

impl SqlGenerator {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Generate a validated, read-only SQL statement for `question` against
    /// `schema`. LLM failures are fatal for the current query; gate
    /// rejections are not errors.
    pub async fn generate(
        &self,
        engine: EngineKind,
        question: &str,
        schema: &DbSchema,
    ) -> Result<GeneratedSql, EngineError> {
        let schema_json = serde_json::to_string_pretty(schema)
            .map_err(|e| EngineError::Database(anyhow::anyhow!("schema serialization: {}", e)))?;
        let prompt = build_prompt(engine, &schema_json, question);
        let messages = vec![json!({ "role": "user", "content": prompt })];

        let response = self
            .provider
            .chat(&self.model, &messages, &[])
            .await
            .map_err(EngineError::Upstream)?;

        let raw = response.content.unwrap_or_default();
        let cleaned = strip_code_fences(&raw);
        let upper = cleaned.to_ascii_uppercase();

        if cleaned.is_empty() || upper.starts_with("NO SQL") || upper.contains(INSUFFICIENT_SCHEMA_MARKER)
        {
            info!(engine = %engine, "SQL generation declined by model");
            return Ok(GeneratedSql::blocked(engine));
        }

        if !passes_safety_gate(cleaned) {
            warn!(engine = %engine, "Generated SQL rejected by safety gate");
            return Ok(GeneratedSql::blocked(engine));
        }

        let tables_used = extract_tables(cleaned);
        info!(
            engine = %engine,
            tables = ?tables_used,
            "SQL generated"
        );

        Ok(GeneratedSql {
            sql: Some(cleaned.to_string()),
            engine,
            tables_used,
            confidence: Confidence::High,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;
    use std::collections::BTreeMap;

    fn empty_schema() -> DbSchema {
        DbSchema {
            tables: BTreeMap::new(),
        }
    }

    #[test]
    fn gate_accepts_plain_select() {
        assert!(passes_safety_gate("SELECT id FROM users WHERE active = 1"));
        assert!(passes_safety_gate("select count(*) from orders"));
    }

    #[test]
    fn gate_rejects_non_select_and_separators() {
        assert!(!passes_safety_gate("DROP TABLE users"));
        assert!(!passes_safety_gate("SELECT 1; DROP TABLE users"));
        assert!(!passes_safety_gate("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!passes_safety_gate(""));
        assert!(!passes_safety_gate("SEL"));
    }

    #[test]
    fn gate_rejects_denylisted_keywords_as_whole_tokens() {
        assert!(!passes_safety_gate("SELECT * FROM users WHERE id IN (DELETE FROM t)"));
        assert!(!passes_safety_gate("SELECT 1 FROM t UPDATE"));
        // Denylist words inside identifiers are fine.
        assert!(passes_safety_gate("SELECT updated_at FROM deleted_items"));
        assert!(passes_safety_gate("SELECT insert_count FROM merge_stats"));
    }

    #[test]
    fn extract_tables_dedupes_in_first_seen_order() {
        let sql = "SELECT o.id FROM orders o \
                   JOIN customers c ON c.id = o.customer_id \
                   JOIN orders o2 ON o2.id = o.id";
        assert_eq!(extract_tables(sql), vec!["orders", "customers"]);
    }

    #[test]
    fn extract_tables_is_case_insensitive() {
        let sql = "select x from Invoices join INVOICES i on 1=1";
        assert_eq!(extract_tables(sql), vec!["Invoices"]);
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(
            strip_code_fences("```sql\nSELECT 1 FROM t\n```"),
            "SELECT 1 FROM t"
        );
        assert_eq!(strip_code_fences("  SELECT 1 FROM t  "), "SELECT 1 FROM t");
    }

    #[tokio::test]
    async fn accepted_sql_comes_back_with_tables_and_high_confidence() {
        let provider = Arc::new(MockProvider::with_responses(vec![
            MockProvider::text_response("SELECT name FROM customers JOIN orders ON orders.customer_id = customers.id"),
        ]));
        let generator = SqlGenerator::new(provider, "fast-model");

        let out = generator
            .generate(EngineKind::Sqlite, "who ordered?", &empty_schema())
            .await
            .unwrap();
        assert_eq!(
            out.sql.as_deref(),
            Some("SELECT name FROM customers JOIN orders ON orders.customer_id = customers.id")
        );
        assert_eq!(out.tables_used, vec!["customers", "orders"]);
        assert_eq!(out.confidence, Confidence::High);
    }

    #[tokio::test]
    async fn mutating_output_is_blocked_not_an_error() {
        let provider = Arc::new(MockProvider::with_responses(vec![
            MockProvider::text_response("DELETE FROM users WHERE test = 1"),
        ]));
        let generator = SqlGenerator::new(provider, "fast-model");

        let out = generator
            .generate(EngineKind::Postgresql, "delete all test users", &empty_schema())
            .await
            .unwrap();
        assert!(out.sql.is_none());
        assert!(out.tables_used.is_empty());
        assert_eq!(out.confidence, Confidence::Low);
    }

    #[tokio::test]
    async fn explicit_refusals_are_blocked() {
        for refusal in ["NO SQL", "no sql", "INSUFFICIENT_SCHEMA", ""] {
            let provider = Arc::new(MockProvider::with_responses(vec![
                MockProvider::text_response(refusal),
            ]));
            let generator = SqlGenerator::new(provider, "fast-model");
            let out = generator
                .generate(EngineKind::Mysql, "anything", &empty_schema())
                .await
                .unwrap();
            assert!(out.sql.is_none(), "expected block for {:?}", refusal);
            assert_eq!(out.confidence, Confidence::Low);
        }
    }

    #[tokio::test]
    async fn dialect_rules_reach_the_prompt() {
        let provider = Arc::new(MockProvider::with_responses(vec![
            MockProvider::text_response("SELECT 1 FROM t"),
        ]));
        let generator = SqlGenerator::new(provider.clone(), "fast-model");
        generator
            .generate(EngineKind::Postgresql, "q", &empty_schema())
            .await
            .unwrap();

        let calls = provider.calls().await;
        let prompt = calls[0].messages[0]["content"].as_str().unwrap().to_string();
        assert!(prompt.contains("ILIKE"));
        assert!(prompt.contains("PostgreSQL"));
    }
}

//! Two-phase database path.
//!
//! Execution phase (no LLM): resolve the binding, snapshot the schema,
//! generate SQL, execute it read-only, and convert every row value into the
//! minimal JSON type system. The returned payload is the sole contract
//! across the tool-call boundary.
//!
//! Generation phase (LLM): explain the rows in natural language, strictly
//! grounded in the payload, then append the exchange to memory and attach
//! the database citation.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Column, Row, TypeInfo, ValueRef};
use tracing::{info, warn};

use crate::agent::answers;
use crate::db::{inspect_schema, ConnectionRegistry, SqlGenerator};
use crate::error::EngineError;
use crate::memory::{context_excluding_pending_user, MemoryRole, MemoryStore};
use crate::rag::citations::format_citations;
use crate::traits::ModelProvider;
use crate::types::{AnswerMode, Citation, Confidence, FinalAnswer};

/// Decode one column into the minimal JSON type system. The ladder tries
/// the native JSON-represented types first and falls back to a string
/// rendering; values that cannot be decoded at all become null.
fn decode_column(row: &AnyRow, idx: usize) -> Value {
    if let Ok(raw) = row.try_get_raw(idx) {
        if raw.is_null() {
            return Value::Null;
        }
    }

    let type_name = row.column(idx).type_info().name().to_ascii_uppercase();

    if type_name.contains("BOOL") {
        if let Ok(v) = row.try_get::<bool, _>(idx) {
            return Value::Bool(v);
        }
    }
    if type_name.contains("INT") {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Value::from(v);
        }
    }
    if ["REAL", "FLOA", "DOUB", "NUMERIC", "DECIMAL", "MONEY"]
        .iter()
        .any(|t| type_name.contains(t))
    {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Value::from(v);
        }
    }
    // Dates, uuids, text and everything else representable as text.
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Value::String(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
        return Value::String(String::from_utf8_lossy(&v).into_owned());
    }

    warn!(column = row.column(idx).name(), type_name, "Undecodable column value, emitting null");
    Value::Null
}

/// Convert a row into a JSON object keyed by column name.
fn row_to_json(row: &AnyRow) -> Value {
    let mut object = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_string(), decode_column(row, idx));
    }
    Value::Object(object)
}

/// Execute a read-only statement and return JSON-safe rows.
async fn execute_readonly(pool: &AnyPool, sql: &str) -> Result<Vec<Value>, EngineError> {
    let rows = sqlx::query(sql)
        .fetch_all(pool)
        .await
        .map_err(|e| EngineError::Database(anyhow::anyhow!("query execution failed: {}", e)))?;
    Ok(rows.iter().map(row_to_json).collect())
}

fn blocked_payload(query: &str, engine: &str) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("query".into(), json!(query));
    payload.insert("sql".into(), Value::Null);
    payload.insert("engine_kind".into(), json!(engine));
    payload.insert("tables_used".into(), json!([]));
    payload.insert("rows".into(), json!([]));
    payload.insert("row_count".into(), json!(0));
    payload.insert("confidence".into(), json!(Confidence::Low.as_str()));
    payload
}

/// Execution phase: produce the database tool payload. Zero rows is
/// success; a safety-gate rejection yields the blocked payload. SQL
/// execution failures propagate, since a silent wrong row set is worse than a
/// visible failure.
pub async fn run_db_execution(
    registry: &ConnectionRegistry,
    generator: &SqlGenerator,
    memory: &MemoryStore,
    session_id: &str,
    query: &str,
) -> Result<Map<String, Value>, EngineError> {
    info!(session_id, query, "DB execution start");

    memory.append(session_id, MemoryRole::User, query);

    let binding = registry.get(session_id).await?;
    let schema = inspect_schema(&binding)
        .await
        .map_err(EngineError::Database)?;

    let generated = generator.generate(binding.engine, query, &schema).await?;

    let Some(sql) = generated.sql else {
        warn!(session_id, "SQL generation blocked; returning empty payload");
        return Ok(blocked_payload(query, binding.engine.as_str()));
    };

    let rows = execute_readonly(&binding.pool, &sql).await?;
    info!(session_id, rows = rows.len(), "DB execution complete");

    let mut payload = Map::new();
    payload.insert("query".into(), json!(query));
    payload.insert("sql".into(), json!(sql));
    payload.insert("engine_kind".into(), json!(binding.engine.as_str()));
    payload.insert("tables_used".into(), json!(generated.tables_used));
    payload.insert("row_count".into(), json!(rows.len()));
    payload.insert("rows".into(), Value::Array(rows));
    payload.insert("confidence".into(), json!(generated.confidence.as_str()));
    Ok(payload)
}

/// Generation phase: explain the payload's rows, grounded only in them.
/// The payload is JSON-safe by construction here.
pub async fn run_db_generation(
    provider: &Arc<dyn ModelProvider>,
    model: &str,
    memory: &MemoryStore,
    session_id: &str,
    payload: &Map<String, Value>,
) -> Result<FinalAnswer, EngineError> {
    info!(session_id, "DB answer generation start");

    let query = payload
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::contract("database payload missing 'query'"))?
        .to_string();
    let engine_kind = payload
        .get("engine_kind")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::contract("database payload missing 'engine_kind'"))?
        .to_string();
    let sql = payload.get("sql").and_then(Value::as_str);
    let rows = payload
        .get("rows")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let tables_used: Vec<String> = payload
        .get("tables_used")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let (response, citations) = match sql {
        None => {
            // The safety gate refused; say so instead of fabricating a
            // destructive statement or an answer.
            let response = "No safe read-only query could be generated for this \
                            request, so the database was not queried."
                .to_string();
            (response, Vec::new())
        }
        Some(sql) => {
            let snapshot = memory.snapshot(session_id);
            let memory_text = context_excluding_pending_user(&snapshot);
            let response = answers::generate_db_answer(
                provider,
                model,
                &query,
                sql,
                &engine_kind,
                &rows,
                memory_text.as_deref(),
            )
            .await;

            let engine = serde_json::from_value(json!(engine_kind))
                .map_err(|_| EngineError::contract("database payload has unknown engine_kind"))?;
            let citation = Citation::Database {
                engine_kind: engine,
                tables: tables_used,
                sql: sql.to_string(),
            };
            (response, vec![citation])
        }
    };

    memory.append(session_id, MemoryRole::Assistant, &response);

    let formatted_citations = format_citations(&citations);
    Ok(FinalAnswer {
        mode: AnswerMode::Db,
        query,
        response,
        model: model.to_string(),
        used_chunks: 0,
        citations,
        formatted_citations,
    })
}

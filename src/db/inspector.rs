//! Live schema reflection.
//!
//! Reflects exactly what the connection reports at call time, never cached,
//! since the schema can change between requests. Foreign keys are expanded
//! one local/referenced column pair at a time, preserving declared order.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::{AnyPool, Row};
use tracing::{debug, warn};

use crate::db::{DbBinding, EngineKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKeyInfo {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

/// Normalized structure of the connected database. Table iteration order is
/// deterministic (sorted by name) so repeated inspections of an unchanged
/// schema compare equal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbSchema {
    pub tables: BTreeMap<String, TableSchema>,
}

/// Reflect the connected database into a [`DbSchema`].
pub async fn inspect_schema(binding: &DbBinding) -> anyhow::Result<DbSchema> {
    debug!(engine = %binding.engine, "Inspecting database schema");
    match binding.engine {
        EngineKind::Sqlite => inspect_sqlite(&binding.pool).await,
        EngineKind::Postgresql => inspect_postgres(&binding.pool).await,
        EngineKind::Mysql => inspect_mysql(&binding.pool).await,
    }
}

/// Pragma statements interpolate the table name, so only plain identifiers
/// are inspected.
fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

async fn inspect_sqlite(pool: &AnyPool) -> anyhow::Result<DbSchema> {
    let mut tables = BTreeMap::new();

    let table_rows = sqlx::query(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    for table_row in &table_rows {
        let table_name: String = table_row.try_get("name")?;
        if !is_plain_identifier(&table_name) {
            warn!(table = %table_name, "Skipping table with non-identifier name");
            continue;
        }

        let mut columns = Vec::new();
        let mut pk_cols: Vec<(i64, String)> = Vec::new();
        let col_rows = sqlx::query(&format!("PRAGMA table_info(\"{}\")", table_name))
            .fetch_all(pool)
            .await?;
        for row in &col_rows {
            let name: String = row.try_get("name")?;
            let data_type: String = row.try_get("type")?;
            let notnull: i64 = row.try_get("notnull")?;
            let pk: i64 = row.try_get("pk")?;
            if pk > 0 {
                pk_cols.push((pk, name.clone()));
            }
            columns.push(ColumnInfo {
                name,
                data_type,
                nullable: notnull == 0,
            });
        }
        pk_cols.sort_by_key(|(pos, _)| *pos);

        let mut foreign_keys = Vec::new();
        let fk_rows = sqlx::query(&format!("PRAGMA foreign_key_list(\"{}\")", table_name))
            .fetch_all(pool)
            .await?;
        let mut ordered_fks: Vec<(i64, i64, ForeignKeyInfo)> = Vec::new();
        for row in &fk_rows {
            let id: i64 = row.try_get("id")?;
            let seq: i64 = row.try_get("seq")?;
            let column: String = row.try_get("from")?;
            let ref_table: String = row.try_get("table")?;
            // `to` is NULL when the reference targets the implicit primary key.
            let ref_column: String = row
                .try_get::<Option<String>, _>("to")?
                .unwrap_or_default();
            ordered_fks.push((id, seq, ForeignKeyInfo { column, ref_table, ref_column }));
        }
        ordered_fks.sort_by_key(|(id, seq, _)| (*id, *seq));
        foreign_keys.extend(ordered_fks.into_iter().map(|(_, _, fk)| fk));

        tables.insert(
            table_name,
            TableSchema {
                columns,
                primary_key: pk_cols.into_iter().map(|(_, name)| name).collect(),
                foreign_keys,
            },
        );
    }

    Ok(DbSchema { tables })
}

async fn inspect_postgres(pool: &AnyPool) -> anyhow::Result<DbSchema> {
    let mut tables = BTreeMap::new();

    let table_rows = sqlx::query(
        "SELECT table_name AS name FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_type = 'BASE TABLE' ORDER BY table_name",
    )
    .fetch_all(pool)
    .await?;

    for table_row in &table_rows {
        let table_name: String = table_row.try_get("name")?;

        let mut columns = Vec::new();
        let col_rows = sqlx::query(
            "SELECT column_name AS name, data_type, is_nullable \
             FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(&table_name)
        .fetch_all(pool)
        .await?;
        for row in &col_rows {
            let is_nullable: String = row.try_get("is_nullable")?;
            columns.push(ColumnInfo {
                name: row.try_get("name")?,
                data_type: row.try_get("data_type")?,
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
            });
        }

        let mut primary_key = Vec::new();
        let pk_rows = sqlx::query(
            "SELECT kcu.column_name AS name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
             WHERE tc.table_schema = 'public' AND tc.table_name = $1 \
               AND tc.constraint_type = 'PRIMARY KEY' \
             ORDER BY kcu.ordinal_position",
        )
        .bind(&table_name)
        .fetch_all(pool)
        .await?;
        for row in &pk_rows {
            primary_key.push(row.try_get("name")?);
        }

        let mut foreign_keys = Vec::new();
        let fk_rows = sqlx::query(
            "SELECT kcu.column_name AS column_name, \
                    ccu.table_name AS ref_table, \
                    ccu.column_name AS ref_column \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
             JOIN information_schema.constraint_column_usage ccu \
               ON ccu.constraint_name = tc.constraint_name \
              AND ccu.table_schema = tc.table_schema \
             WHERE tc.table_schema = 'public' AND tc.table_name = $1 \
               AND tc.constraint_type = 'FOREIGN KEY' \
             ORDER BY tc.constraint_name, kcu.ordinal_position",
        )
        .bind(&table_name)
        .fetch_all(pool)
        .await?;
        for row in &fk_rows {
            foreign_keys.push(ForeignKeyInfo {
                column: row.try_get("column_name")?,
                ref_table: row.try_get("ref_table")?,
                ref_column: row.try_get("ref_column")?,
            });
        }

        tables.insert(
            table_name,
            TableSchema {
                columns,
                primary_key,
                foreign_keys,
            },
        );
    }

    Ok(DbSchema { tables })
}

async fn inspect_mysql(pool: &AnyPool) -> anyhow::Result<DbSchema> {
    let mut tables = BTreeMap::new();

    let table_rows = sqlx::query(
        "SELECT table_name AS name FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name",
    )
    .fetch_all(pool)
    .await?;

    for table_row in &table_rows {
        let table_name: String = table_row.try_get("name")?;

        let mut columns = Vec::new();
        let col_rows = sqlx::query(
            "SELECT column_name AS name, data_type, is_nullable \
             FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? \
             ORDER BY ordinal_position",
        )
        .bind(&table_name)
        .fetch_all(pool)
        .await?;
        for row in &col_rows {
            let is_nullable: String = row.try_get("is_nullable")?;
            columns.push(ColumnInfo {
                name: row.try_get("name")?,
                data_type: row.try_get("data_type")?,
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
            });
        }

        let mut primary_key = Vec::new();
        let pk_rows = sqlx::query(
            "SELECT column_name AS name \
             FROM information_schema.key_column_usage \
             WHERE table_schema = DATABASE() AND table_name = ? \
               AND constraint_name = 'PRIMARY' \
             ORDER BY ordinal_position",
        )
        .bind(&table_name)
        .fetch_all(pool)
        .await?;
        for row in &pk_rows {
            primary_key.push(row.try_get("name")?);
        }

        let mut foreign_keys = Vec::new();
        let fk_rows = sqlx::query(
            "SELECT column_name AS column_name, \
                    referenced_table_name AS ref_table, \
                    referenced_column_name AS ref_column \
             FROM information_schema.key_column_usage \
             WHERE table_schema = DATABASE() AND table_name = ? \
               AND referenced_table_name IS NOT NULL \
             ORDER BY constraint_name, ordinal_position",
        )
        .bind(&table_name)
        .fetch_all(pool)
        .await?;
        for row in &fk_rows {
            foreign_keys.push(ForeignKeyInfo {
                column: row.try_get("column_name")?,
                ref_table: row.try_get("ref_table")?,
                ref_column: row.try_get("ref_column")?,
            });
        }

        tables.insert(
            table_name,
            TableSchema {
                columns,
                primary_key,
                foreign_keys,
            },
        );
    }

    Ok(DbSchema { tables })
}

//! Schema introspection against the store's system catalog.
//!
//! Both queries are fixed and take no arguments, so they skip the
//! validator, but they are still issued as read-only statements. They are
//! scoped to `current_schema()`.

use std::fmt::Write as _;

use moosicbox_json_utils::database::ToValue as _;
use support_desk_analytics_models::{ColumnInfo, TableInfo};

use crate::InsightsError;
use crate::executor::QueryExecutor;
use crate::validator::ReadOnlyStatement;

/// Builds the table listing statement.
#[must_use]
pub fn tables_statement() -> ReadOnlyStatement {
    ReadOnlyStatement::fixed(
        "list_tables",
        "SELECT c.relname::text AS table_name,
                GREATEST(c.reltuples, 0)::bigint AS estimated_rows,
                pg_total_relation_size(c.oid)::bigint AS total_bytes,
                pg_size_pretty(pg_total_relation_size(c.oid)) AS size
         FROM pg_class c
         JOIN pg_namespace n ON n.oid = c.relnamespace
         WHERE n.nspname = current_schema()
           AND c.relkind IN ('r', 'p')
         ORDER BY c.relname"
            .to_string(),
        Vec::new(),
        "no arguments".to_string(),
    )
}

/// Builds the column catalog statement.
#[must_use]
pub fn columns_statement() -> ReadOnlyStatement {
    ReadOnlyStatement::fixed(
        "describe_schema",
        "SELECT table_name::text AS table_name,
                column_name::text AS column_name,
                data_type::text AS data_type,
                is_nullable::text AS is_nullable
         FROM information_schema.columns
         WHERE table_schema = current_schema()
         ORDER BY table_name, ordinal_position"
            .to_string(),
        Vec::new(),
        "no arguments".to_string(),
    )
}

/// Lists tables in the current schema with size estimates.
///
/// # Errors
///
/// Returns [`InsightsError`] if the catalog query fails.
pub async fn list_tables(executor: &QueryExecutor) -> Result<Vec<TableInfo>, InsightsError> {
    let rows = executor.fetch_rows(&tables_statement()).await?;

    Ok(rows
        .iter()
        .map(|row| TableInfo {
            table_name: row.to_value("table_name").unwrap_or_default(),
            estimated_rows: row.to_value("estimated_rows").unwrap_or(0),
            total_bytes: row.to_value("total_bytes").unwrap_or(0),
            size: row.to_value("size").unwrap_or_default(),
        })
        .collect())
}

/// Lists every column of every table in the current schema.
///
/// # Errors
///
/// Returns [`InsightsError`] if the catalog query fails.
pub async fn describe_schema(executor: &QueryExecutor) -> Result<Vec<ColumnInfo>, InsightsError> {
    let rows = executor.fetch_rows(&columns_statement()).await?;

    Ok(rows
        .iter()
        .map(|row| {
            let nullable: String = row.to_value("is_nullable").unwrap_or_default();
            ColumnInfo {
                table_name: row.to_value("table_name").unwrap_or_default(),
                column_name: row.to_value("column_name").unwrap_or_default(),
                data_type: row.to_value("data_type").unwrap_or_default(),
                is_nullable: nullable.eq_ignore_ascii_case("YES"),
            }
        })
        .collect())
}

/// Renders the column catalog as a markdown document, one section per table.
#[must_use]
pub fn render_schema(columns: &[ColumnInfo]) -> String {
    let mut out = String::from("# Database Schema\n");
    let mut current_table: Option<&str> = None;

    for column in columns {
        if current_table != Some(column.table_name.as_str()) {
            current_table = Some(column.table_name.as_str());
            let _ = write!(out, "\n## Table: {}\n\n", column.table_name);
        }
        let nullable = if column.is_nullable { "NULL" } else { "NOT NULL" };
        let _ = writeln!(
            out,
            "- {}: {} ({nullable})",
            column.column_name, column.data_type
        );
    }

    out
}

/// Renders the table list, one `- name (size)` line per table.
#[must_use]
pub fn render_tables(tables: &[TableInfo]) -> String {
    tables
        .iter()
        .map(|t| format!("- {} ({})", t.table_name, t.size))
        .collect::<Vec<_>>()
        .join("\n")
}

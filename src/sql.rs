//! SQL execution and schema introspection against a SQLite database.
//!
//! Statements come from the translator and are untrusted: they are run
//! as-is inside a transaction, and any driver failure is returned as
//! [`Error::Execution`] with the driver's message.

use std::fmt;

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Executor, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::debug;

use query_harness_core::sql::{ColumnInfo, SchemaDescriptor, TableSchema};
use query_harness_core::{Error, Result};

/// A single cell of a query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Real(r) => write!(f, "{}", r),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryResult {
    /// Render as an aligned plain-text table.
    pub fn to_table(&self) -> String {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| r.iter().map(|v| v.to_string()).collect())
            .collect();
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.chars().count());
                }
            }
        }

        let line = |values: &[String]| -> String {
            values
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!("{:<width$}", v, width = *w))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        let mut out = String::new();
        out.push_str(&line(&self.columns));
        out.push('\n');
        out.push_str(
            &widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("-+-"),
        );
        for row in &cells {
            out.push('\n');
            out.push_str(&line(row));
        }
        out
    }
}

fn execution(err: sqlx::Error) -> Error {
    Error::Execution(err.to_string())
}

fn decode_value(row: &SqliteRow, idx: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    let value = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => SqlValue::Integer(row.try_get_unchecked::<i64, _>(idx)?),
        "REAL" | "NUMERIC" => SqlValue::Real(row.try_get_unchecked::<f64, _>(idx)?),
        "BLOB" => SqlValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(idx)?),
    };
    Ok(value)
}

/// Run one statement in a transaction and return every row it produced.
pub async fn execute(pool: &SqlitePool, sql: &str) -> Result<QueryResult> {
    let mut tx = pool.begin().await.map_err(execution)?;

    let rows = sqlx::query(sql).fetch_all(&mut *tx).await.map_err(execution)?;

    let columns: Vec<String> = match rows.first() {
        Some(first) => first.columns().iter().map(|c| c.name().to_string()).collect(),
        // No rows to read names from; ask the statement instead
        None => (&mut *tx)
            .describe(sql)
            .await
            .map(|d| d.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_else(|e| {
                debug!(error = %e, "could not describe statement; returning no columns");
                Vec::new()
            }),
    };

    let mut decoded = Vec::with_capacity(rows.len());
    for row in &rows {
        let values = (0..row.len())
            .map(|i| decode_value(row, i))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(execution)?;
        decoded.push(values);
    }

    tx.commit().await.map_err(execution)?;
    debug!(rows = decoded.len(), "executed statement");

    Ok(QueryResult {
        columns,
        rows: decoded,
    })
}

/// Read the user tables of the database and their columns in declared order.
pub async fn introspect_schema(pool: &SqlitePool) -> Result<SchemaDescriptor> {
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY rowid",
    )
    .fetch_all(pool)
    .await
    .map_err(execution)?;

    let mut schema = SchemaDescriptor::default();
    for table in tables {
        let rows = sqlx::query("SELECT name, type FROM pragma_table_info(?) ORDER BY cid")
            .bind(&table)
            .fetch_all(pool)
            .await
            .map_err(execution)?;
        let columns = rows
            .iter()
            .map(|r| ColumnInfo {
                name: r.get("name"),
                data_type: r.get("type"),
            })
            .collect();
        schema.tables.push(TableSchema {
            name: table,
            columns,
        });
    }
    Ok(schema)
}

/// Demo rows for the `STUDENT` table: (name, class, section, marks).
pub const DEMO_STUDENTS: [(&str, &str, &str, i64); 5] = [
    ("Krish", "Data Science", "A", 90),
    ("Amit", "Data Analytics", "B", 86),
    ("Pranjay", "Machine Learning", "B", 91),
    ("Arin", "Artificial Intelligence", "A", 56),
    ("Afzal", "Business Management", "B", 32),
];

/// (Re)create the demo `STUDENT` table with five rows.
pub async fn seed_demo(pool: &SqlitePool) -> Result<usize> {
    let mut tx = pool.begin().await.map_err(execution)?;

    sqlx::query("DROP TABLE IF EXISTS STUDENT")
        .execute(&mut *tx)
        .await
        .map_err(execution)?;
    sqlx::query(
        r#"
        CREATE TABLE STUDENT (
            ID INTEGER PRIMARY KEY,
            NAME VARCHAR(25),
            CLASS VARCHAR(25),
            SECTION VARCHAR(25),
            MARKS INT
        )
        "#,
    )
    .execute(&mut *tx)
    .await
    .map_err(execution)?;

    for (name, class, section, marks) in DEMO_STUDENTS {
        sqlx::query("INSERT INTO STUDENT (NAME, CLASS, SECTION, MARKS) VALUES (?, ?, ?, ?)")
            .bind(name)
            .bind(class)
            .bind(section)
            .bind(marks)
            .execute(&mut *tx)
            .await
            .map_err(execution)?;
    }

    tx.commit().await.map_err(execution)?;
    Ok(DEMO_STUDENTS.len())
}

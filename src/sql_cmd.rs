//! `qh sql ...`: question-to-SQL and direct execution.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::context::AppContext;
use crate::db;
use crate::sql::{self, QueryResult};

/// Where `sql seed-demo` writes when neither `--db` nor `[sql] database` is set.
pub const DEFAULT_DEMO_DB: &str = "./data/student.db";

fn print_result(result: &QueryResult) {
    if result.columns.is_empty() && result.rows.is_empty() {
        println!("OK (no rows).");
        return;
    }
    println!("{}", result.to_table());
    println!("({} row{})", result.rows.len(), if result.rows.len() == 1 { "" } else { "s" });
}

pub async fn run_seed_demo(config: &Config, db_path: Option<&Path>) -> Result<()> {
    let path: PathBuf = db_path
        .map(Path::to_path_buf)
        .or_else(|| config.sql.database.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DEMO_DB));

    let pool = db::connect_database(&path, true).await?;
    let inserted = sql::seed_demo(&pool)
        .await
        .with_context(|| format!("Failed to seed {}", path.display()))?;
    pool.close().await;

    println!("Seeded STUDENT table with {} rows in {}.", inserted, path.display());
    Ok(())
}

pub async fn run_schema(ctx: &AppContext) -> Result<()> {
    let schema = ctx.schema().await?;
    if schema.is_empty() {
        println!("No tables.");
    } else {
        println!("{}", schema.render());
    }
    Ok(())
}

pub async fn run_translate(ctx: &AppContext, question: &str) -> Result<()> {
    let statement = ctx.translate(question).await?;
    println!("{}", statement);
    Ok(())
}

/// Translate, record, execute. Translation and execution failures are
/// reported separately; on an execution failure the generated SQL is shown.
pub async fn run_question(ctx: &AppContext, question: &str) -> Result<()> {
    let statement = ctx
        .translate(question)
        .await
        .context("Could not translate the question to SQL")?;
    println!("SQL: {}", statement);
    ctx.try_record_history(question, &statement);

    let result = ctx
        .execute(&statement)
        .await
        .context("The generated SQL could not be executed")?;
    println!();
    print_result(&result);
    Ok(())
}

pub async fn run_exec(ctx: &AppContext, statement: &str) -> Result<()> {
    let result = ctx.execute(statement).await?;
    print_result(&result);
    Ok(())
}

pub fn run_history(ctx: &AppContext) -> Result<()> {
    let entries = ctx.history()?;
    if entries.is_empty() {
        println!("No queries yet.");
        return Ok(());
    }
    for entry in entries.iter().rev() {
        println!("{}  {}", entry.timestamp.format("%Y-%m-%d %H:%M:%S"), entry.question);
        println!("    {}", entry.sql);
    }
    Ok(())
}

//! Natural-language to SQL translation.
//!
//! The translator renders the database schema and a fixed set of few-shot
//! examples into a prompt, makes one generation call, and cleans the reply
//! with [`sanitize_sql`]. The result is untrusted text: nothing here parses
//! or validates it as SQL.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{describe, Error, Result};
use crate::generation::{GenerationOptions, GenerationProvider};
use crate::prompt::PromptTemplate;

/// One column of a table, in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type; may be empty for untyped SQLite columns.
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// Snapshot of the user tables of a database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub tables: Vec<TableSchema>,
}

impl SchemaDescriptor {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// One line per table: `NAME(COL TYPE, COL TYPE)`.
    pub fn render(&self) -> String {
        self.tables
            .iter()
            .map(|t| {
                let cols = t
                    .columns
                    .iter()
                    .map(|c| {
                        if c.data_type.is_empty() {
                            c.name.clone()
                        } else {
                            format!("{} {}", c.name, c.data_type)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}({})", t.name, cols)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Few-shot pairs shown to the model, written against the demo
/// `STUDENT` table.
pub const FEW_SHOT_EXAMPLES: [(&str, &str); 4] = [
    (
        "How many entries of records are present?",
        "SELECT COUNT(*) FROM STUDENT;",
    ),
    (
        "Tell me all the students studying in Machine Learning class?",
        "SELECT * FROM STUDENT WHERE CLASS = 'Machine Learning';",
    ),
    (
        "What is the highest mark scored by any student?",
        "SELECT MAX(MARKS) FROM STUDENT;",
    ),
    (
        "List the students ordered by marks, highest first.",
        "SELECT * FROM STUDENT ORDER BY MARKS DESC;",
    ),
];

const SQL_TEMPLATE: &str = "You are an expert at converting English questions into SQLite \
queries.\n\n\
The database has the following tables and columns:\n{schema}\n\n\
Examples:\n{examples}\n\n\
Rules: return only the SQL statement, no delimiters, no prose. Do not wrap the \
statement in code fences and do not prefix it with the word sql.\n\n\
Question: {question}\n\
SQL:";

pub const SQL_TEMPERATURE: f32 = 0.0;

/// Render the translation prompt for `question` against `schema`.
pub fn build_sql_prompt(question: &str, schema: &SchemaDescriptor) -> Result<String> {
    let examples = FEW_SHOT_EXAMPLES
        .iter()
        .map(|(q, sql)| format!("Question: {}\nSQL: {}", q, sql))
        .collect::<Vec<_>>()
        .join("\n\n");
    let schema_text = if schema.is_empty() {
        "(no tables)".to_string()
    } else {
        schema.render()
    };
    PromptTemplate::parse(SQL_TEMPLATE)
        .and_then(|t| {
            t.render(&[
                ("schema", &schema_text),
                ("examples", &examples),
                ("question", question),
            ])
        })
        .map_err(|e| Error::Translation(format!("bad SQL template: {}", e)))
}

/// Strip the formatting a model commonly wraps around a SQL statement.
///
/// Removes a leading code fence with its optional language label, a
/// trailing fence, and a bare leading `sql` label. Does not check that the
/// result is SQL.
pub fn sanitize_sql(raw: &str) -> String {
    let mut s = raw.trim();

    if let Some(rest) = s.strip_prefix("```") {
        // the rest of the fence line is a language label, if it is one word
        s = match rest.split_once('\n') {
            Some((label, body)) if !label.trim().contains(char::is_whitespace) => body,
            _ => rest,
        };
        s = s.trim();
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim_end();
    }

    let lower = s.get(..3).map(|p| p.eq_ignore_ascii_case("sql")).unwrap_or(false);
    if lower {
        let after = &s[3..];
        match after.chars().next() {
            Some(c) if c.is_whitespace() || c == ':' => {
                s = after.trim_start_matches(':');
            }
            _ => {}
        }
    }

    s.trim().to_string()
}

/// Turns questions into SQL through a generation provider.
pub struct Translator<'a> {
    pub generator: &'a dyn GenerationProvider,
    pub options: GenerationOptions,
}

impl<'a> Translator<'a> {
    pub fn new(generator: &'a dyn GenerationProvider) -> Self {
        Self {
            generator,
            options: GenerationOptions::with_temperature(SQL_TEMPERATURE),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Translate `question` into a single SQL statement for `schema`.
    pub async fn translate(&self, question: &str, schema: &SchemaDescriptor) -> Result<String> {
        let prompt = build_sql_prompt(question, schema)?;
        let raw = self
            .generator
            .generate(&prompt, &self.options)
            .await
            .map_err(|e| Error::Translation(describe(&e)))?;
        let sql = sanitize_sql(&raw);
        debug!(raw = %raw, sql = %sql, "translated question");
        if sql.is_empty() {
            return Err(Error::Translation(
                "model returned an empty statement".to_string(),
            ));
        }
        Ok(sql)
    }
}

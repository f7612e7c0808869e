//! Application context shared by CLI commands and HTTP handlers.
//!
//! [`AppContext`] owns the configuration, the index store, both model
//! providers and the optional SQL database. It is built once per process
//! and passed explicitly; nothing here is global.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use query_harness_core::embedding::EmbeddingProvider;
use query_harness_core::generation::GenerationProvider;
use query_harness_core::index::{IndexHandle, Indexer};
use query_harness_core::models::Document;
use query_harness_core::qa::{Answer, RetrievalQa, QA_TEMPERATURE};
use query_harness_core::sql::{SchemaDescriptor, Translator, SQL_TEMPERATURE};
use query_harness_core::store::{IndexManifest, IndexStore};
use query_harness_core::tasks::{self, CHAT_MAX_TOKENS, CHAT_TEMPERATURE};
use query_harness_core::Error;

use crate::chat::{ChatLog, ChatMessage};
use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::extract::DocumentExtractor;
use crate::generation::create_generator;
use crate::history::{HistoryEntry, QueryHistory};
use crate::migrate;
use crate::sql::{self, QueryResult};
use crate::sqlite_store::SqliteIndexStore;

/// Outcome of `sql run`: the generated statement and its rows.
#[derive(Debug, Clone, Serialize)]
pub struct SqlRun {
    pub question: String,
    pub sql: String,
    #[serde(flatten)]
    pub result: QueryResult,
}

pub struct AppContext {
    pub config: Config,
    pub store: Box<dyn IndexStore>,
    pub embedder: Box<dyn EmbeddingProvider>,
    pub generator: Box<dyn GenerationProvider>,
    database: Option<SqlitePool>,
}

impl AppContext {
    /// Open the index database, create providers, and attach the SQL
    /// database named in `[sql] database` if the file exists.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::apply(&pool).await?;

        let embedder = create_provider(&config.embedding)?;
        let generator = create_generator(&config.generation)?;

        let database = match &config.sql.database {
            Some(path) if path.exists() => Some(db::connect_database(path, false).await?),
            Some(path) => {
                warn!(path = %path.display(), "SQL database does not exist yet");
                None
            }
            None => None,
        };

        Ok(Self::from_parts(
            config,
            Box::new(SqliteIndexStore::new(pool)),
            embedder,
            generator,
            database,
        ))
    }

    pub fn from_parts(
        config: Config,
        store: Box<dyn IndexStore>,
        embedder: Box<dyn EmbeddingProvider>,
        generator: Box<dyn GenerationProvider>,
        database: Option<SqlitePool>,
    ) -> Self {
        Self {
            config,
            store,
            embedder,
            generator,
            database,
        }
    }

    /// The attached SQL database.
    pub fn database(&self) -> Result<&SqlitePool, Error> {
        self.database.as_ref().ok_or_else(|| {
            let path = self
                .config
                .sql
                .database
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(not set)".to_string());
            Error::InvalidConfiguration(format!(
                "no SQL database available at {}; set [sql] database or run `qh sql seed-demo`",
                path
            ))
        })
    }

    pub fn history_path(&self) -> PathBuf {
        self.config.sql.history_path.clone()
    }

    // ============ Documents ============

    pub async fn build_index(&self, name: &str, documents: &[Document]) -> Result<IndexHandle, Error> {
        let handle = Indexer::new(self.store.as_ref(), self.embedder.as_ref(), &DocumentExtractor)
            .with_params(self.config.chunking.params())
            .with_batch_size(self.config.embedding.batch_size)
            .build_index(documents, name)
            .await?;
        info!(index = name, chunks = handle.chunk_count, "index built");
        Ok(handle)
    }

    pub async fn list_indexes(&self) -> Result<Vec<IndexManifest>, Error> {
        self.store
            .list_indexes()
            .await
            .map_err(|e| Error::Storage(format!("{:#}", e)))
    }

    pub async fn drop_index(&self, name: &str) -> Result<bool, Error> {
        self.store
            .drop_index(name)
            .await
            .map_err(|e| Error::Storage(format!("{:#}", e)))
    }

    pub async fn ask(
        &self,
        question: &str,
        index: &str,
        top_k: Option<usize>,
    ) -> Result<Answer, Error> {
        let top_k = top_k.unwrap_or(self.config.retrieval.top_k);
        RetrievalQa::new(self.store.as_ref(), self.embedder.as_ref(), self.generator.as_ref())
            .with_options(self.config.generation.options(QA_TEMPERATURE))
            .answer_with_sources(question, index, top_k)
            .await
    }

    // ============ SQL ============

    pub async fn schema(&self) -> Result<SchemaDescriptor, Error> {
        sql::introspect_schema(self.database()?).await
    }

    pub async fn translate(&self, question: &str) -> Result<String, Error> {
        let schema = self.schema().await?;
        Translator::new(self.generator.as_ref())
            .with_options(self.config.generation.options(SQL_TEMPERATURE))
            .translate(question, &schema)
            .await
    }

    pub async fn execute(&self, statement: &str) -> Result<QueryResult, Error> {
        sql::execute(self.database()?, statement).await
    }

    /// Translate, record the statement in history, then execute it.
    ///
    /// The statement is recorded even when execution fails, so the history
    /// shows what the model produced. A history that cannot be read or
    /// written is logged and does not stop execution.
    pub async fn run_question(&self, question: &str) -> Result<SqlRun, Error> {
        let statement = self.translate(question).await?;
        self.try_record_history(question, &statement);
        let result = self.execute(&statement).await?;
        Ok(SqlRun {
            question: question.to_string(),
            sql: statement,
            result,
        })
    }

    pub fn record_history(&self, question: &str, statement: &str) -> Result<(), Error> {
        let storage = |e: anyhow::Error| Error::Storage(format!("{:#}", e));
        let mut history = QueryHistory::load(&self.history_path(), self.config.sql.history_limit)
            .map_err(storage)?;
        history.record(question, statement);
        history.save().map_err(storage)
    }

    /// Record in history, logging instead of failing.
    pub fn try_record_history(&self, question: &str, statement: &str) {
        if let Err(e) = self.record_history(question, statement) {
            warn!(
                path = %self.history_path().display(),
                error = %e,
                "could not record query history"
            );
        }
    }

    pub fn history(&self) -> Result<Vec<HistoryEntry>, Error> {
        QueryHistory::load(&self.history_path(), self.config.sql.history_limit)
            .map(|h| h.recent().to_vec())
            .map_err(|e| Error::Storage(format!("{:#}", e)))
    }

    // ============ Chat ============

    fn chat_log(&self) -> Result<ChatLog, Error> {
        ChatLog::load(&self.config.chat.history_path, self.config.chat.history_limit)
            .map_err(|e| Error::Storage(format!("{:#}", e)))
    }

    /// Reply to `message` in the context of the saved conversation.
    ///
    /// An unreadable log is an error. A reply that cannot be saved is
    /// still returned.
    pub async fn chat(&self, message: &str) -> Result<String, Error> {
        let mut log = self.chat_log()?;
        let mut options = self.config.generation.options(CHAT_TEMPERATURE);
        options.max_tokens = options.max_tokens.or(Some(CHAT_MAX_TOKENS));
        let reply = tasks::chat(self.generator.as_ref(), &log.turns(), message, &options).await?;
        log.record_exchange(message, &reply);
        if let Err(e) = log.save() {
            warn!(
                path = %self.config.chat.history_path.display(),
                error = %format!("{:#}", e),
                "could not save chat history"
            );
        }
        Ok(reply)
    }

    pub fn chat_history(&self) -> Result<Vec<ChatMessage>, Error> {
        self.chat_log().map(|log| log.messages().to_vec())
    }

    pub fn clear_chat(&self) -> Result<(), Error> {
        let mut log = self.chat_log().unwrap_or_else(|_| {
            ChatLog::empty(&self.config.chat.history_path, self.config.chat.history_limit)
        });
        log.clear();
        log.save().map_err(|e| Error::Storage(format!("{:#}", e)))
    }
}

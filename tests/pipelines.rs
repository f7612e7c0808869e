//! Pipelines against real SQLite files: the index store, SQL execution and
//! schema introspection, and the application context that ties them to the
//! model providers.

use std::path::Path;

use tempfile::TempDir;

use query_harness::config::Config;
use query_harness::context::AppContext;
use query_harness::sql::{self, SqlValue};
use query_harness::sqlite_store::SqliteIndexStore;
use query_harness::{db, migrate};
use query_harness_core::index::Indexer;
use query_harness_core::models::{Document, PlainTextExtractor};
use query_harness_core::qa::{RetrievalQa, CONTEXT_MARKER, NOT_AVAILABLE, QUESTION_MARKER};
use query_harness_core::store::{IndexEntry, IndexManifest, IndexStore};
use query_harness_core::testing::{
    ContextualGenerator, FailingEmbedder, FixedGenerator, HashEmbedder,
};
use query_harness_core::Error;

fn test_config(root: &Path) -> Config {
    let mut config = Config::minimal();
    config.db.path = root.join("data/qh.sqlite");
    config.sql.database = Some(root.join("data/student.db"));
    config.sql.history_path = root.join("data/history.json");
    config.chat.history_path = root.join("data/chat.json");
    config
}

async fn open_store(config: &Config) -> SqliteIndexStore {
    let pool = db::connect(config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    SqliteIndexStore::new(pool)
}

async fn seeded_database(config: &Config) -> sqlx::SqlitePool {
    let path = config.sql.database.clone().unwrap();
    let pool = db::connect_database(&path, true).await.unwrap();
    assert_eq!(sql::seed_demo(&pool).await.unwrap(), 5);
    pool
}

fn vacation_generator() -> ContextualGenerator {
    ContextualGenerator {
        term: "vacation".to_string(),
        answer: "Twenty days per year.".to_string(),
        fallback: NOT_AVAILABLE.to_string(),
        context_marker: CONTEXT_MARKER.to_string(),
        question_marker: QUESTION_MARKER.to_string(),
    }
}

// ============ Index store ============

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    migrate::run_migrations(&config).await.unwrap();
    migrate::run_migrations(&config).await.unwrap();
    assert!(config.db.path.exists());
}

#[tokio::test]
async fn test_rebuild_replaces_previous_build() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let store = open_store(&config).await;
    let embedder = HashEmbedder::new(32);
    let indexer = Indexer::new(&store, &embedder, &PlainTextExtractor);

    let first = indexer
        .build_from_text("The office opens at nine every morning.", "handbook")
        .await
        .unwrap();
    let second = indexer
        .build_from_text("Vacation allowance is twenty days per year.", "handbook")
        .await
        .unwrap();
    assert_ne!(first.build_id, second.build_id);

    let live = store.manifest("handbook").await.unwrap().unwrap();
    assert_eq!(live.build_id, second.build_id);
    assert_eq!(live.model, "hash-32");
    assert_eq!(live.dims, 32);
    assert_eq!(store.build_count().await.unwrap(), 1);

    let generator = vacation_generator();
    let qa = RetrievalQa::new(&store, &embedder, &generator);
    let answer = qa
        .answer_with_sources("How many vacation days?", "handbook", 4)
        .await
        .unwrap();
    assert_eq!(answer.answer, "Twenty days per year.");
    assert_eq!(answer.sources.len(), 1);
    assert!(answer.sources[0].text.contains("Vacation"));
}

#[tokio::test]
async fn test_failed_rebuild_keeps_previous_index() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let store = open_store(&config).await;
    let embedder = HashEmbedder::new(16);

    let original = Indexer::new(&store, &embedder, &PlainTextExtractor)
        .build_from_text("Vacation allowance is twenty days.", "handbook")
        .await
        .unwrap();

    let err = Indexer::new(&store, &FailingEmbedder, &PlainTextExtractor)
        .build_from_text("Completely different text.", "handbook")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));

    let live = store.manifest("handbook").await.unwrap().unwrap();
    assert_eq!(live.build_id, original.build_id);
    assert_eq!(store.build_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_promote_rejects_incomplete_build() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let store = open_store(&config).await;
    let embedder = HashEmbedder::new(8);

    let original = Indexer::new(&store, &embedder, &PlainTextExtractor)
        .build_from_text("first build", "notes")
        .await
        .unwrap();

    let entries = vec![
        IndexEntry {
            chunk_index: 0,
            text: "a".to_string(),
            hash: "ha".to_string(),
            vector: vec![1.0; 8],
        },
        IndexEntry {
            chunk_index: 1,
            text: "b".to_string(),
            hash: "hb".to_string(),
            vector: vec![0.5; 8],
        },
    ];
    store.stage_entries("partial", &entries).await.unwrap();

    let manifest = IndexManifest {
        name: "notes".to_string(),
        build_id: "partial".to_string(),
        model: "hash-8".to_string(),
        dims: 8,
        chunk_count: 3,
        created_at: 0,
    };
    assert!(store.promote(&manifest).await.is_err());

    let live = store.manifest("notes").await.unwrap().unwrap();
    assert_eq!(live.build_id, original.build_id);

    store.discard_staged("partial").await.unwrap();
    assert_eq!(store.build_count().await.unwrap(), 1);

    // The live build survives a discard aimed at it
    store.discard_staged(&original.build_id).await.unwrap();
    assert_eq!(store.build_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_list_and_drop_indexes() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let store = open_store(&config).await;
    let embedder = HashEmbedder::new(8);
    let indexer = Indexer::new(&store, &embedder, &PlainTextExtractor);

    indexer.build_from_text("beta text", "beta").await.unwrap();
    indexer.build_from_text("alpha text", "alpha").await.unwrap();

    let names: Vec<String> = store
        .list_indexes()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, vec!["alpha", "beta"]);

    assert!(store.drop_index("alpha").await.unwrap());
    assert!(!store.drop_index("alpha").await.unwrap());
    assert!(store.manifest("alpha").await.unwrap().is_none());
    assert_eq!(store.build_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_nearest_orders_by_similarity() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let store = open_store(&config).await;

    let entries = vec![
        IndexEntry {
            chunk_index: 0,
            text: "far".to_string(),
            hash: "h0".to_string(),
            vector: vec![0.0, 1.0],
        },
        IndexEntry {
            chunk_index: 1,
            text: "near".to_string(),
            hash: "h1".to_string(),
            vector: vec![1.0, 0.1],
        },
        IndexEntry {
            chunk_index: 2,
            text: "exact".to_string(),
            hash: "h2".to_string(),
            vector: vec![1.0, 0.0],
        },
    ];
    store.stage_entries("b1", &entries).await.unwrap();

    let hits = store.nearest("b1", &[1.0, 0.0], 2).await.unwrap();
    let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
    assert_eq!(texts, vec!["exact", "near"]);
}

// ============ SQL ============

#[tokio::test]
async fn test_execute_count_on_seeded_database() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = seeded_database(&config).await;

    let result = sql::execute(&pool, "SELECT COUNT(*) FROM STUDENT;")
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["COUNT(*)"]);
    assert_eq!(result.rows, vec![vec![SqlValue::Integer(5)]]);
}

#[tokio::test]
async fn test_execute_returns_typed_rows() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = seeded_database(&config).await;

    let result = sql::execute(&pool, "SELECT NAME, MARKS FROM STUDENT ORDER BY MARKS DESC LIMIT 2")
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["NAME", "MARKS"]);
    assert_eq!(
        result.rows,
        vec![
            vec![SqlValue::Text("Pranjay".to_string()), SqlValue::Integer(91)],
            vec![SqlValue::Text("Krish".to_string()), SqlValue::Integer(90)],
        ]
    );
}

#[tokio::test]
async fn test_execute_empty_result_keeps_columns() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = seeded_database(&config).await;

    let result = sql::execute(&pool, "SELECT NAME FROM STUDENT WHERE MARKS > 100")
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["NAME"]);
    assert!(result.rows.is_empty());
}

#[tokio::test]
async fn test_execute_statement_without_result_columns() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = seeded_database(&config).await;

    let result = sql::execute(&pool, "UPDATE STUDENT SET MARKS = MARKS WHERE 0")
        .await
        .unwrap();
    assert!(result.columns.is_empty());
    assert!(result.rows.is_empty());
}

#[tokio::test]
async fn test_execute_invalid_sql_is_execution_error() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = seeded_database(&config).await;

    let err = sql::execute(&pool, "SELEC BAD SYNTAX").await.unwrap_err();
    assert!(matches!(err, Error::Execution(_)));

    let err = sql::execute(&pool, "SELECT * FROM NO_SUCH_TABLE")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Execution(_)));
}

#[tokio::test]
async fn test_seed_demo_is_repeatable() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = seeded_database(&config).await;
    assert_eq!(sql::seed_demo(&pool).await.unwrap(), 5);

    let result = sql::execute(&pool, "SELECT COUNT(*) FROM STUDENT")
        .await
        .unwrap();
    assert_eq!(result.rows, vec![vec![SqlValue::Integer(5)]]);
}

#[tokio::test]
async fn test_introspect_schema() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = seeded_database(&config).await;

    let schema = sql::introspect_schema(&pool).await.unwrap();
    assert_eq!(schema.tables.len(), 1);
    let table = &schema.tables[0];
    assert_eq!(table.name, "STUDENT");
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["ID", "NAME", "CLASS", "SECTION", "MARKS"]);
    assert!(schema.render().starts_with("STUDENT(ID INTEGER, NAME VARCHAR(25)"));
}

// ============ Application context ============

async fn context_with(config: Config, generator: FixedGenerator) -> AppContext {
    let store = open_store(&config).await;
    let database = match &config.sql.database {
        Some(path) if path.exists() => Some(db::connect_database(path, false).await.unwrap()),
        _ => None,
    };
    AppContext::from_parts(
        config,
        Box::new(store),
        Box::new(HashEmbedder::new(16)),
        Box::new(generator),
        database,
    )
}

#[tokio::test]
async fn test_context_run_question_records_history() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    seeded_database(&config).await.close().await;

    let ctx = context_with(
        config,
        FixedGenerator::new("```sql\nSELECT COUNT(*) FROM STUDENT;\n```"),
    )
    .await;

    let run = ctx.run_question("How many students are there?").await.unwrap();
    assert_eq!(run.sql, "SELECT COUNT(*) FROM STUDENT;");
    assert_eq!(run.result.rows, vec![vec![SqlValue::Integer(5)]]);

    let history = ctx.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].question, "How many students are there?");
    assert_eq!(history[0].sql, "SELECT COUNT(*) FROM STUDENT;");
}

#[tokio::test]
async fn test_context_records_sql_that_fails_to_execute() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    seeded_database(&config).await.close().await;

    let ctx = context_with(config, FixedGenerator::new("SELECT * FROM TEACHER")).await;

    let err = ctx.run_question("List the teachers").await.unwrap_err();
    assert!(matches!(err, Error::Execution(_)));
    let history = ctx.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sql, "SELECT * FROM TEACHER");
}

#[tokio::test]
async fn test_context_runs_question_with_corrupt_history() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    seeded_database(&config).await.close().await;
    std::fs::write(&config.sql.history_path, "{not json").unwrap();

    let ctx = context_with(config, FixedGenerator::new("SELECT COUNT(*) FROM STUDENT;")).await;

    let run = ctx.run_question("How many students are there?").await.unwrap();
    assert_eq!(run.result.rows, vec![vec![SqlValue::Integer(5)]]);
    // The unreadable file is left for the user to inspect
    assert!(matches!(ctx.history().unwrap_err(), Error::Storage(_)));
    assert_eq!(
        std::fs::read_to_string(ctx.history_path()).unwrap(),
        "{not json"
    );
}

#[tokio::test]
async fn test_context_without_database() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let ctx = context_with(config, FixedGenerator::new("SELECT 1")).await;

    let err = ctx.execute("SELECT 1").await.unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration(_)));
    assert!(ctx.history().unwrap().is_empty());
}

#[tokio::test]
async fn test_context_build_and_ask() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.chunking.size = 60;
    config.chunking.overlap = 10;
    let ctx = context_with(config, FixedGenerator::new("From the handbook.")).await;

    let docs = vec![
        Document::plain_text("a.txt", "Vacation allowance is twenty days per year for all staff."),
        Document::plain_text("b.md", "The cafeteria serves lunch from noon until two."),
    ];
    let handle = ctx.build_index("handbook", &docs).await.unwrap();
    assert!(handle.chunk_count >= 2);

    let answer = ctx
        .ask("How much vacation do staff get?", "handbook", Some(1))
        .await
        .unwrap();
    assert_eq!(answer.answer, "From the handbook.");
    assert_eq!(answer.sources.len(), 1);

    let err = ctx.ask("anything", "missing", None).await.unwrap_err();
    assert_eq!(err, Error::IndexNotFound("missing".to_string()));

    assert!(ctx.drop_index("handbook").await.unwrap());
    assert!(ctx.list_indexes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_context_chat_saves_exchanges() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let ctx = context_with(config, FixedGenerator::new("Noted.")).await;

    assert_eq!(ctx.chat("My name is Ada.").await.unwrap(), "Noted.");
    assert_eq!(ctx.chat("What is my name?").await.unwrap(), "Noted.");

    let history = ctx.chat_history().unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[2].content, "What is my name?");

    ctx.clear_chat().unwrap();
    assert!(ctx.chat_history().unwrap().is_empty());
}

#[tokio::test]
async fn test_context_chat_with_corrupt_log_is_storage_error() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    std::fs::create_dir_all(tmp.path().join("data")).unwrap();
    std::fs::write(&config.chat.history_path, "{not json").unwrap();
    let ctx = context_with(config, FixedGenerator::new("Noted.")).await;

    let err = ctx.chat("hello").await.unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    ctx.clear_chat().unwrap();
    assert!(ctx.chat_history().unwrap().is_empty());
}

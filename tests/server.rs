//! HTTP API through the router, without binding a socket.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use query_harness::config::Config;
use query_harness::context::AppContext;
use query_harness::sqlite_store::SqliteIndexStore;
use query_harness::{db, migrate, server, sql};
use query_harness_core::generation::GenerationProvider;
use query_harness_core::testing::{FailingGenerator, FixedGenerator, HashEmbedder};

async fn app(tmp: &TempDir, generator: Box<dyn GenerationProvider>, seed: bool) -> Router {
    let root = tmp.path();
    let mut config = Config::minimal();
    config.db.path = root.join("qh.sqlite");
    config.sql.history_path = root.join("history.json");
    config.chat.history_path = root.join("chat.json");

    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();

    let database = if seed {
        let path = root.join("student.db");
        config.sql.database = Some(path.clone());
        let db = db::connect_database(&path, true).await.unwrap();
        sql::seed_demo(&db).await.unwrap();
        Some(db)
    } else {
        None
    };

    let ctx = AppContext::from_parts(
        config,
        Box::new(SqliteIndexStore::new(pool)),
        Box::new(HashEmbedder::new(16)),
        generator,
        database,
    );
    server::router(ctx)
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp, Box::new(FixedGenerator::new("")), false).await;
    let (status, body) = send(app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_indexes_empty() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp, Box::new(FixedGenerator::new("")), false).await;
    let (status, body) = send(app, "GET", "/indexes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["indexes"], json!([]));
}

#[tokio::test]
async fn test_ask_missing_index_is_404() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp, Box::new(FixedGenerator::new("")), false).await;
    let (status, body) = send(
        app,
        "POST",
        "/ask",
        Some(json!({ "question": "How many vacation days?", "index": "handbook" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "index_not_found");
    assert_eq!(body["error"]["message"], "index not found: handbook");
}

#[tokio::test]
async fn test_ask_empty_question_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp, Box::new(FixedGenerator::new("")), false).await;
    let (status, body) = send(
        app,
        "POST",
        "/ask",
        Some(json!({ "question": "  ", "index": "handbook" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_sql_run_and_history() {
    let tmp = TempDir::new().unwrap();
    let generator = FixedGenerator::new("```sql\nSELECT COUNT(*) FROM STUDENT;\n```");
    let app = app(&tmp, Box::new(generator), true).await;

    let (status, body) = send(
        app.clone(),
        "POST",
        "/sql/run",
        Some(json!({ "question": "How many students are there?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sql"], "SELECT COUNT(*) FROM STUDENT;");
    assert_eq!(body["columns"], json!(["COUNT(*)"]));
    assert_eq!(body["rows"], json!([[5]]));

    let (status, body) = send(app, "GET", "/sql/history", None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["question"], "How many students are there?");
}

#[tokio::test]
async fn test_sql_translate_does_not_execute() {
    let tmp = TempDir::new().unwrap();
    let generator = FixedGenerator::new("SELECT NAME FROM STUDENT WHERE CLASS = 'Data Science';");
    let app = app(&tmp, Box::new(generator), true).await;

    let (status, body) = send(
        app.clone(),
        "POST",
        "/sql/translate",
        Some(json!({ "question": "Who studies Data Science?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sql"], "SELECT NAME FROM STUDENT WHERE CLASS = 'Data Science';");
    assert!(body.get("rows").is_none());

    let (_, body) = send(app, "GET", "/sql/history", None).await;
    assert_eq!(body["entries"], json!([]));
}

#[tokio::test]
async fn test_sql_run_bad_statement_is_422() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp, Box::new(FixedGenerator::new("SELEC BAD SYNTAX")), true).await;
    let (status, body) = send(
        app,
        "POST",
        "/sql/run",
        Some(json!({ "question": "Anything" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "execution_error");
}

#[tokio::test]
async fn test_sql_run_generation_failure_is_502() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp, Box::new(FailingGenerator), true).await;
    let (status, body) = send(
        app,
        "POST",
        "/sql/run",
        Some(json!({ "question": "How many students?" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "translation_error");
}

#[tokio::test]
async fn test_sql_run_without_database_is_400() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp, Box::new(FixedGenerator::new("SELECT 1")), false).await;
    let (status, body) = send(
        app,
        "POST",
        "/sql/run",
        Some(json!({ "question": "How many students?" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_configuration");
}

#[tokio::test]
async fn test_chat_replies_and_saves_exchange() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp, Box::new(FixedGenerator::new("Hello Ada.")), false).await;

    let (status, body) = send(
        app.clone(),
        "POST",
        "/chat",
        Some(json!({ "message": "My name is Ada." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "Hello Ada.");

    let saved: Value =
        serde_json::from_str(&std::fs::read_to_string(tmp.path().join("chat.json")).unwrap())
            .unwrap();
    assert_eq!(saved["messages"][0]["role"], "user");
    assert_eq!(saved["messages"][1]["content"], "Hello Ada.");

    let (status, body) = send(app, "POST", "/chat", Some(json!({ "message": " " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_chat_generation_failure_is_502() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp, Box::new(FailingGenerator), false).await;
    let (status, body) = send(app, "POST", "/chat", Some(json!({ "message": "hi" }))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "generation_error");
    assert!(!tmp.path().join("chat.json").exists());
}

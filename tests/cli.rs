//! End-to-end tests of the `qh` binary.
//!
//! Providers stay disabled, so these cover everything that runs without a
//! model: setup, the demo database, direct SQL, the chat log, and the
//! error paths of the model-backed commands.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn qh_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("qh");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(docs_dir.join("receipt.png"), [0x89, b'P', b'N', b'G']).unwrap();
    fs::write(
        docs_dir.join("handbook.md"),
        "# Handbook\n\nVacation allowance is twenty days per year.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/qh.sqlite"

[chunking]
size = 200
overlap = 20

[sql]
database = "{root}/data/student.db"
history_path = "{root}/data/history.json"

[chat]
history_path = "{root}/data/chat.json"

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("qh.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_qh(config_path: &Path, args: &[&str]) -> Output {
    Command::new(qh_binary())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run qh")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let output = run_qh(&config, &["init"]);
    assert!(output.status.success(), "init failed: {}", stderr(&output));
    assert!(stdout(&output).contains("Database initialized"));
    assert!(tmp.path().join("data/qh.sqlite").exists());

    // Running twice is fine
    let output = run_qh(&config, &["init"]);
    assert!(output.status.success());
}

#[test]
fn test_seed_demo_then_exec() {
    let (tmp, config) = setup_test_env();

    let output = run_qh(&config, &["sql", "seed-demo"]);
    assert!(output.status.success(), "seed-demo failed: {}", stderr(&output));
    assert!(stdout(&output).contains("5 rows"));
    assert!(tmp.path().join("data/student.db").exists());

    let output = run_qh(&config, &["sql", "exec", "SELECT COUNT(*) FROM STUDENT;"]);
    assert!(output.status.success(), "exec failed: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("COUNT(*)"));
    assert!(out.lines().any(|l| l.trim() == "5"));
    assert!(out.contains("(1 row)"));
}

#[test]
fn test_exec_invalid_sql_fails() {
    let (_tmp, config) = setup_test_env();
    run_qh(&config, &["sql", "seed-demo"]);

    let output = run_qh(&config, &["sql", "exec", "SELEC BAD SYNTAX"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("execution failed"));
}

#[test]
fn test_schema_lists_student_table() {
    let (_tmp, config) = setup_test_env();
    run_qh(&config, &["sql", "seed-demo"]);

    let output = run_qh(&config, &["sql", "schema"]);
    assert!(output.status.success(), "schema failed: {}", stderr(&output));
    assert!(stdout(&output).contains("STUDENT(ID INTEGER, NAME VARCHAR(25)"));
}

#[test]
fn test_sql_without_database_fails() {
    let (_tmp, config) = setup_test_env();
    let output = run_qh(&config, &["sql", "schema"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("seed-demo"));
}

#[test]
fn test_history_starts_empty() {
    let (_tmp, config) = setup_test_env();
    let output = run_qh(&config, &["sql", "history"]);
    assert!(output.status.success(), "history failed: {}", stderr(&output));
    assert!(stdout(&output).contains("No queries yet."));
}

#[test]
fn test_index_list_empty() {
    let (_tmp, config) = setup_test_env();
    let output = run_qh(&config, &["index", "list"]);
    assert!(output.status.success(), "list failed: {}", stderr(&output));
    assert!(stdout(&output).contains("No indexes."));
}

#[test]
fn test_ask_missing_index_fails() {
    let (_tmp, config) = setup_test_env();
    let output = run_qh(&config, &["ask", "How many vacation days?", "--index", "handbook"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("index not found: handbook"));
}

#[test]
fn test_index_build_needs_embedding_provider() {
    let (tmp, config) = setup_test_env();
    let doc = tmp.path().join("docs/handbook.md");
    let output = run_qh(
        &config,
        &["index", "build", "handbook", doc.to_str().unwrap()],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("embedding failed"));

    let output = run_qh(&config, &["index", "list"]);
    assert!(stdout(&output).contains("No indexes."));
}

#[test]
fn test_index_build_without_inputs_fails() {
    let (_tmp, config) = setup_test_env();
    let output = run_qh(&config, &["index", "build", "handbook"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No input files"));
}

#[test]
fn test_drop_missing_index_fails() {
    let (_tmp, config) = setup_test_env();
    let output = run_qh(&config, &["index", "drop", "nope"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No index named 'nope'"));
}

#[test]
fn test_summarize_rejects_bad_length() {
    let (_tmp, config) = setup_test_env();
    let output = run_qh(&config, &["summarize", "some text", "--length", "epic"]);
    assert!(!output.status.success());
}

#[test]
fn test_generate_needs_generation_provider() {
    let (_tmp, config) = setup_test_env();
    let output = run_qh(&config, &["generate", "Say hello"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("generation failed"));
}

#[test]
fn test_image_needs_generation_provider() {
    let (tmp, config) = setup_test_env();
    let image = tmp.path().join("docs/receipt.png");
    let output = run_qh(&config, &["image", "describe", image.to_str().unwrap()]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("generation failed"));
    assert!(err.contains("disabled"));
}

#[test]
fn test_image_rejects_non_image_file() {
    let (tmp, config) = setup_test_env();
    let doc = tmp.path().join("docs/handbook.md");
    let output = run_qh(&config, &["image", "calories", doc.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unsupported image type"));
}

#[test]
fn test_custom_invoice_needs_query() {
    let (tmp, config) = setup_test_env();
    let image = tmp.path().join("docs/receipt.png");
    let output = run_qh(
        &config,
        &["image", "invoice", image.to_str().unwrap(), "--extract", "custom"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("needs a request"));
}

#[test]
fn test_chat_history_and_clear() {
    let (tmp, config) = setup_test_env();
    let output = run_qh(&config, &["chat", "--history"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No conversation yet."));

    let output = run_qh(&config, &["chat", "Hello there"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("generation failed"));
    assert!(!tmp.path().join("data/chat.json").exists());

    let output = run_qh(&config, &["chat", "--clear"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Conversation cleared."));
    let saved = fs::read_to_string(tmp.path().join("data/chat.json")).unwrap();
    assert!(saved.contains("\"messages\": []"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _config) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(&bad, "[chunking]\nsize = 10\noverlap = 10\n").unwrap();
    let output = run_qh(&bad, &["index", "list"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("chunking.overlap"));
}

//! # Query Harness
//!
//! Ask questions of your documents, and ask questions of a SQLite database
//! in plain language.
//!
//! Documents (PDF, DOCX, text) are chunked, embedded and stored as named
//! indexes. Questions against an index retrieve the closest chunks and are
//! answered by a language model from that context only. Questions against a
//! database are translated to SQL, executed, and recorded in a history.
//! The same model providers also serve single-prompt text tasks, image
//! tasks (describe, meal calories, invoice fields) and a saved chat.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │  Documents  │──▶│  Pipeline   │──▶│  SQLite  │
//! │ PDF/DOCX/MD │   │ Chunk+Embed │   │ indexes  │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │   (qh)   │       │  (axum)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! qh init                                   # create the index database
//! qh index build handbook ./handbook.pdf    # build an index
//! qh ask "How many vacation days?" --index handbook
//! qh sql seed-demo                          # demo STUDENT table
//! qh sql run "Who scored the highest marks?"
//! qh image invoice ./scan.png --extract totals
//! qh chat "Suggest a name for my cat"
//! qh serve                                  # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`context`] | Shared application context |
//! | [`db`] | Database connections |
//! | [`migrate`] | Index database schema |
//! | [`sqlite_store`] | SQLite index store |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Generation providers |
//! | [`extract`] | PDF/DOCX/text extraction |
//! | [`sql`] | SQL execution and introspection |
//! | [`history`] | Query history file |
//! | [`chat`] | Conversation log for `qh chat` |
//! | [`server`] | HTTP API |

pub mod ask;
pub mod chat;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod history;
pub mod index_cmd;
pub mod logging;
pub mod migrate;
pub mod server;
pub mod sql;
pub mod sql_cmd;
pub mod sqlite_store;
pub mod tasks_cmd;

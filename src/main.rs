//! # Query Harness CLI (`qh`)
//!
//! ## Usage
//!
//! ```bash
//! qh --config ./config/qh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `qh init` | Create the index database and tables |
//! | `qh index build <name> <files...>` | Build (or rebuild) a named index |
//! | `qh index list` / `qh index drop <name>` | Inspect and remove indexes |
//! | `qh ask "<question>" --index <name>` | Answer a question from an index |
//! | `qh sql seed-demo` | Create the demo `STUDENT` database |
//! | `qh sql schema` | Show the tables the translator sees |
//! | `qh sql translate "<question>"` | Question to SQL, without running it |
//! | `qh sql run "<question>"` | Translate, record, and execute |
//! | `qh sql exec "<statement>"` | Execute SQL directly |
//! | `qh sql history` | Recent questions and their SQL |
//! | `qh summarize` / `translate` / `codegen` / `generate` | Single-prompt text tasks |
//! | `qh image describe / calories / invoice <files...>` | Image tasks |
//! | `qh chat "<message>"` | Continue the saved conversation |
//! | `qh serve` | Start the HTTP API |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use query_harness::config::{self, Config};
use query_harness::context::AppContext;
use query_harness::{ask, index_cmd, logging, migrate, server, sql_cmd, tasks_cmd};
use query_harness_core::tasks::{InvoiceExtraction, MealAnalysis, SummaryLength};

const DEFAULT_CONFIG: &str = "./config/qh.toml";

/// Query Harness: question answering over documents and natural-language
/// queries over SQLite.
#[derive(Parser)]
#[command(name = "qh", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/qh.toml`; built-in defaults are used when that
    /// file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index database and its tables. Safe to run repeatedly.
    Init,

    /// Build, list and drop document indexes.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Answer a question using only the contents of an index.
    Ask {
        question: String,

        /// Index to answer from.
        #[arg(long)]
        index: String,

        /// Number of chunks to retrieve (default from `[retrieval] top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the retrieved chunks after the answer.
        #[arg(long)]
        sources: bool,
    },

    /// Ask questions of a SQLite database.
    Sql {
        #[command(subcommand)]
        action: SqlAction,
    },

    /// Summarize text (argument, --file, or stdin).
    Summarize {
        text: Option<String>,

        #[arg(long)]
        file: Option<PathBuf>,

        /// short, medium or long.
        #[arg(long, default_value = "medium")]
        length: SummaryLength,
    },

    /// Translate text into another language.
    Translate {
        text: Option<String>,

        /// Target language, e.g. `French`.
        #[arg(long)]
        to: String,

        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Write code from a description.
    Codegen {
        description: String,

        #[arg(long, default_value = "Python")]
        language: String,
    },

    /// Send a prompt to the model as-is.
    Generate { prompt: Option<String> },

    /// Ask the model about images (png, jpg, gif, webp).
    Image {
        #[command(subcommand)]
        action: ImageAction,
    },

    /// Continue the saved conversation.
    Chat {
        message: Option<String>,

        /// Print the saved conversation instead of sending a message.
        #[arg(long, conflicts_with_all = ["message", "clear"])]
        history: bool,

        /// Forget the saved conversation.
        #[arg(long, conflicts_with = "message")]
        clear: bool,
    },

    /// Start the HTTP API on `[server] bind`.
    Serve,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Build `name` from files and/or a directory. Replaces an existing
    /// index of the same name only if the build succeeds.
    Build {
        name: String,

        files: Vec<PathBuf>,

        /// Directory to walk for documents.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Glob of files to include under --dir (repeatable).
        #[arg(long = "include")]
        include: Vec<String>,

        /// Glob of files to skip under --dir (repeatable).
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },
    /// List built indexes.
    List,
    /// Delete an index and its entries.
    Drop { name: String },
}

#[derive(Subcommand)]
enum SqlAction {
    /// Create (or reset) the demo STUDENT table with five rows.
    SeedDemo {
        /// Database file (default: `[sql] database`, then ./data/student.db).
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print the tables and columns of the database.
    Schema,
    /// Translate a question into SQL without running it.
    Translate { question: String },
    /// Translate a question, record it in history, and run it.
    Run { question: String },
    /// Execute a SQL statement directly.
    Exec { statement: String },
    /// Show recent questions and their SQL.
    History,
}

#[derive(Subcommand)]
enum ImageAction {
    /// Describe the images in detail.
    Describe {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Question to answer about the images.
        #[arg(long)]
        question: Option<String>,
    },
    /// Estimate the calories of a meal.
    Calories {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// total, breakdown or nutrition.
        #[arg(long, default_value = "total")]
        analysis: MealAnalysis,

        /// Extra request sent with the analysis instructions.
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Extract fields from an invoice.
    Invoice {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// full, line-items, totals, vendor or custom.
        #[arg(long, default_value = "full")]
        extract: InvoiceExtraction,

        /// Request to answer; required with `--extract custom`.
        #[arg(long)]
        query: Option<String>,
    },
}

fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            config::load_config(Path::new(DEFAULT_CONFIG))
        }
        None => Ok(Config::minimal()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = resolve_config(cli.config.as_deref())?;
    logging::init(&cfg.logging);

    // Commands that don't need the application context
    match &cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
            return Ok(());
        }
        Commands::Sql {
            action: SqlAction::SeedDemo { db },
        } => {
            return sql_cmd::run_seed_demo(&cfg, db.as_deref()).await;
        }
        _ => {}
    }

    let ctx = AppContext::open(cfg).await?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Index { action } => match action {
            IndexAction::Build {
                name,
                files,
                dir,
                include,
                exclude,
            } => {
                index_cmd::run_build(&ctx, &name, &files, dir.as_deref(), &include, &exclude)
                    .await?;
            }
            IndexAction::List => index_cmd::run_list(&ctx).await?,
            IndexAction::Drop { name } => index_cmd::run_drop(&ctx, &name).await?,
        },
        Commands::Ask {
            question,
            index,
            top_k,
            sources,
        } => {
            ask::run_ask(&ctx, &question, &index, top_k, sources).await?;
        }
        Commands::Sql { action } => match action {
            SqlAction::SeedDemo { .. } => unreachable!(),
            SqlAction::Schema => sql_cmd::run_schema(&ctx).await?,
            SqlAction::Translate { question } => sql_cmd::run_translate(&ctx, &question).await?,
            SqlAction::Run { question } => sql_cmd::run_question(&ctx, &question).await?,
            SqlAction::Exec { statement } => sql_cmd::run_exec(&ctx, &statement).await?,
            SqlAction::History => sql_cmd::run_history(&ctx)?,
        },
        Commands::Summarize { text, file, length } => {
            let text = tasks_cmd::read_input(text.as_deref(), file.as_deref())?;
            tasks_cmd::run_summarize(&ctx, &text, length).await?;
        }
        Commands::Translate { text, to, file } => {
            let text = tasks_cmd::read_input(text.as_deref(), file.as_deref())?;
            tasks_cmd::run_translate(&ctx, &text, &to).await?;
        }
        Commands::Codegen {
            description,
            language,
        } => {
            tasks_cmd::run_codegen(&ctx, &description, &language).await?;
        }
        Commands::Generate { prompt } => {
            let prompt = tasks_cmd::read_input(prompt.as_deref(), None)?;
            tasks_cmd::run_generate(&ctx, &prompt).await?;
        }
        Commands::Image { action } => match action {
            ImageAction::Describe { files, question } => {
                tasks_cmd::run_describe_image(&ctx, &files, question.as_deref()).await?;
            }
            ImageAction::Calories {
                files,
                analysis,
                prompt,
            } => {
                tasks_cmd::run_meal(&ctx, &files, analysis, prompt.as_deref()).await?;
            }
            ImageAction::Invoice {
                files,
                extract,
                query,
            } => {
                tasks_cmd::run_invoice(&ctx, &files, extract, query.as_deref()).await?;
            }
        },
        Commands::Chat {
            message,
            history,
            clear,
        } => {
            if history {
                tasks_cmd::run_chat_history(&ctx)?;
            } else if clear {
                tasks_cmd::run_chat_clear(&ctx)?;
            } else {
                let message = tasks_cmd::read_input(message.as_deref(), None)?;
                tasks_cmd::run_chat(&ctx, &message).await?;
            }
        }
        Commands::Serve => server::run_server(ctx).await?,
    }

    Ok(())
}

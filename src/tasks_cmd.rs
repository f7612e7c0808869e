//! `qh summarize | translate | codegen | generate`, `qh image ...` and
//! `qh chat`.
//!
//! Input text comes from the argument, or from stdin when the argument is
//! `-` or omitted. Images are read from files named on the command line.

use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};

use query_harness_core::generation::{GenerationOptions, ImagePart};
use query_harness_core::models::TextExtractor;
use query_harness_core::tasks::{self, InvoiceExtraction, MealAnalysis, SummaryLength};

use crate::context::AppContext;
use crate::extract::{load_document, load_image, DocumentExtractor};

/// Default temperature for the free-form text tasks.
const TASK_TEMPERATURE: f32 = 0.7;

fn options(ctx: &AppContext) -> GenerationOptions {
    ctx.config.generation.options(TASK_TEMPERATURE)
}

/// Resolve the input text: inline argument, `--file`, or stdin.
pub fn read_input(text: Option<&str>, file: Option<&Path>) -> Result<String> {
    if let Some(path) = file {
        let doc = load_document(path)?;
        return DocumentExtractor
            .extract(&doc)
            .with_context(|| format!("Failed to extract text from {}", path.display()));
    }
    match text {
        Some(t) if t != "-" => Ok(t.to_string()),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn require_input(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        bail!("No input text.");
    }
    Ok(())
}

pub async fn run_summarize(ctx: &AppContext, text: &str, length: SummaryLength) -> Result<()> {
    require_input(text)?;
    let out = tasks::summarize(ctx.generator.as_ref(), text, length, &options(ctx)).await?;
    println!("{}", out.trim_end());
    Ok(())
}

pub async fn run_translate(ctx: &AppContext, text: &str, language: &str) -> Result<()> {
    require_input(text)?;
    let out = tasks::translate_text(ctx.generator.as_ref(), text, language, &options(ctx)).await?;
    println!("{}", out.trim_end());
    Ok(())
}

pub async fn run_codegen(ctx: &AppContext, description: &str, language: &str) -> Result<()> {
    require_input(description)?;
    let out =
        tasks::generate_code(ctx.generator.as_ref(), description, language, &options(ctx)).await?;
    println!("{}", out.trim_end());
    Ok(())
}

pub async fn run_generate(ctx: &AppContext, prompt: &str) -> Result<()> {
    require_input(prompt)?;
    let out = tasks::generate(ctx.generator.as_ref(), prompt, &options(ctx)).await?;
    println!("{}", out.trim_end());
    Ok(())
}

fn load_images(paths: &[PathBuf]) -> Result<Vec<ImagePart>> {
    if paths.is_empty() {
        bail!("No image files given.");
    }
    paths.iter().map(|p| load_image(p)).collect()
}

pub async fn run_describe_image(
    ctx: &AppContext,
    files: &[PathBuf],
    question: Option<&str>,
) -> Result<()> {
    let images = load_images(files)?;
    let out =
        tasks::describe_image(ctx.generator.as_ref(), &images, question, &options(ctx)).await?;
    println!("{}", out.trim_end());
    Ok(())
}

pub async fn run_meal(
    ctx: &AppContext,
    files: &[PathBuf],
    analysis: MealAnalysis,
    request: Option<&str>,
) -> Result<()> {
    let images = load_images(files)?;
    let out = tasks::analyze_meal(
        ctx.generator.as_ref(),
        &images,
        analysis,
        request,
        &options(ctx),
    )
    .await?;
    println!("{}", out.trim_end());
    Ok(())
}

pub async fn run_invoice(
    ctx: &AppContext,
    files: &[PathBuf],
    extraction: InvoiceExtraction,
    request: Option<&str>,
) -> Result<()> {
    let images = load_images(files)?;
    let out = tasks::extract_invoice(
        ctx.generator.as_ref(),
        &images,
        extraction,
        request,
        &options(ctx),
    )
    .await?;
    println!("{}", out.trim_end());
    Ok(())
}

pub async fn run_chat(ctx: &AppContext, message: &str) -> Result<()> {
    require_input(message)?;
    let reply = ctx.chat(message).await?;
    println!("{}", reply.trim_end());
    Ok(())
}

pub fn run_chat_history(ctx: &AppContext) -> Result<()> {
    let messages = ctx.chat_history()?;
    if messages.is_empty() {
        println!("No conversation yet.");
        return Ok(());
    }
    for m in messages {
        println!(
            "[{}] {}: {}",
            m.timestamp.format("%Y-%m-%d %H:%M"),
            m.role,
            m.content.trim_end()
        );
    }
    Ok(())
}

pub fn run_chat_clear(ctx: &AppContext) -> Result<()> {
    ctx.clear_chat()?;
    println!("Conversation cleared.");
    Ok(())
}

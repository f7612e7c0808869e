//! `qh index build | list | drop`.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use query_harness_core::models::Document;

use crate::context::AppContext;
use crate::extract::load_document;

/// File patterns collected by `index build --dir` when none are given.
pub const DEFAULT_INCLUDE_GLOBS: [&str; 5] =
    ["**/*.pdf", "**/*.docx", "**/*.txt", "**/*.md", "**/*.markdown"];

const DEFAULT_EXCLUDE_GLOBS: [&str; 3] = ["**/.git/**", "**/target/**", "**/node_modules/**"];

fn build_globset<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern.as_ref())?);
    }
    Ok(builder.build()?)
}

/// Walk `root` and return matching files, sorted by relative path.
pub fn collect_files(root: &Path, include: &[String], exclude: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Directory does not exist: {}", root.display());
    }

    let include_set = if include.is_empty() {
        build_globset(&DEFAULT_INCLUDE_GLOBS[..])?
    } else {
        build_globset(include)?
    };
    let mut excludes: Vec<String> = DEFAULT_EXCLUDE_GLOBS.iter().map(|s| s.to_string()).collect();
    excludes.extend(exclude.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

pub async fn run_build(
    ctx: &AppContext,
    name: &str,
    files: &[PathBuf],
    dir: Option<&Path>,
    include: &[String],
    exclude: &[String],
) -> Result<()> {
    let mut paths: Vec<PathBuf> = files.to_vec();
    if let Some(dir) = dir {
        paths.extend(collect_files(dir, include, exclude)?);
    }
    if paths.is_empty() {
        bail!("No input files. Pass file paths or --dir <directory>.");
    }

    let documents = paths
        .iter()
        .map(|p| load_document(p))
        .collect::<Result<Vec<Document>>>()?;

    println!("Indexing {} document(s) into '{}'...", documents.len(), name);
    let handle = ctx.build_index(name, &documents).await?;
    println!(
        "Index '{}' ready: {} chunks, model {} ({} dims).",
        handle.name, handle.chunk_count, handle.model, handle.dims
    );
    Ok(())
}

pub async fn run_list(ctx: &AppContext) -> Result<()> {
    let indexes = ctx.list_indexes().await?;
    if indexes.is_empty() {
        println!("No indexes.");
        return Ok(());
    }

    println!("{:<24} {:>7} {:>6}  {:<28} CREATED", "NAME", "CHUNKS", "DIMS", "MODEL");
    for m in indexes {
        let created = chrono::DateTime::from_timestamp(m.created_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| m.created_at.to_string());
        println!(
            "{:<24} {:>7} {:>6}  {:<28} {}",
            m.name, m.chunk_count, m.dims, m.model, created
        );
    }
    Ok(())
}

pub async fn run_drop(ctx: &AppContext, name: &str) -> Result<()> {
    if ctx.drop_index(name).await? {
        println!("Dropped index '{}'.", name);
        Ok(())
    } else {
        bail!("No index named '{}'", name)
    }
}

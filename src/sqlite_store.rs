//! SQLite-backed [`IndexStore`] implementation.
//!
//! Entries live in `index_entries` keyed by build id; the `indexes` table
//! maps each index name to its live build. Promotion swaps that pointer and
//! deletes the replaced build's entries in a single transaction.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use query_harness_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use query_harness_core::store::{rank_top_k, IndexEntry, IndexManifest, IndexStore, ScoredEntry};

/// SQLite implementation of the [`IndexStore`] trait.
pub struct SqliteIndexStore {
    pool: SqlitePool,
}

impl SqliteIndexStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of distinct builds with entries, staged or live.
    pub async fn build_count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT build_id) FROM index_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}

fn manifest_from_row(row: &sqlx::sqlite::SqliteRow) -> IndexManifest {
    let dims: i64 = row.get("dims");
    let chunk_count: i64 = row.get("chunk_count");
    IndexManifest {
        name: row.get("name"),
        build_id: row.get("build_id"),
        model: row.get("model"),
        dims: dims as usize,
        chunk_count: chunk_count as usize,
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn stage_entries(&self, build_id: &str, entries: &[IndexEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            let blob = vec_to_blob(&entry.vector);
            sqlx::query(
                r#"
                INSERT INTO index_entries (build_id, chunk_index, text, hash, embedding)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(build_id)
            .bind(entry.chunk_index as i64)
            .bind(&entry.text)
            .bind(&entry.hash)
            .bind(&blob)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn promote(&self, manifest: &IndexManifest) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let staged: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM index_entries WHERE build_id = ?")
                .bind(&manifest.build_id)
                .fetch_one(&mut *tx)
                .await?;
        if staged as usize != manifest.chunk_count {
            bail!(
                "build {} has {} staged entries, manifest expects {}",
                manifest.build_id,
                staged,
                manifest.chunk_count
            );
        }

        let previous: Option<String> =
            sqlx::query_scalar("SELECT build_id FROM indexes WHERE name = ?")
                .bind(&manifest.name)
                .fetch_optional(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO indexes (name, build_id, model, dims, chunk_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                build_id = excluded.build_id,
                model = excluded.model,
                dims = excluded.dims,
                chunk_count = excluded.chunk_count,
                created_at = excluded.created_at
            "#,
        )
        .bind(&manifest.name)
        .bind(&manifest.build_id)
        .bind(&manifest.model)
        .bind(manifest.dims as i64)
        .bind(manifest.chunk_count as i64)
        .bind(manifest.created_at)
        .execute(&mut *tx)
        .await?;

        if let Some(old) = previous.filter(|old| old != &manifest.build_id) {
            sqlx::query("DELETE FROM index_entries WHERE build_id = ?")
                .bind(&old)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn discard_staged(&self, build_id: &str) -> Result<()> {
        sqlx::query(
            "DELETE FROM index_entries WHERE build_id = ? \
             AND NOT EXISTS (SELECT 1 FROM indexes WHERE build_id = ?)",
        )
        .bind(build_id)
        .bind(build_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn manifest(&self, name: &str) -> Result<Option<IndexManifest>> {
        let row = sqlx::query(
            "SELECT name, build_id, model, dims, chunk_count, created_at FROM indexes WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(manifest_from_row))
    }

    async fn list_indexes(&self) -> Result<Vec<IndexManifest>> {
        let rows = sqlx::query(
            "SELECT name, build_id, model, dims, chunk_count, created_at FROM indexes ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(manifest_from_row).collect())
    }

    async fn nearest(
        &self,
        build_id: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredEntry>> {
        let rows = sqlx::query(
            "SELECT chunk_index, text, embedding FROM index_entries WHERE build_id = ?",
        )
        .bind(build_id)
        .fetch_all(&self.pool)
        .await?;

        let scored: Vec<ScoredEntry> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let chunk_index: i64 = row.get("chunk_index");
                ScoredEntry {
                    chunk_index: chunk_index as usize,
                    text: row.get("text"),
                    score: cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64,
                }
            })
            .collect();

        Ok(rank_top_k(scored, k))
    }

    async fn drop_index(&self, name: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let build: Option<String> = sqlx::query_scalar("SELECT build_id FROM indexes WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(build) = build else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM index_entries WHERE build_id = ?")
            .bind(&build)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM indexes WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

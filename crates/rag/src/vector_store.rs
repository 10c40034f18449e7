//! `PostgresVectorStore` (C3) — spec §4.4/§6 schema.
//!
//! A single `chunks` table carries both the HNSW cosine vector index and a
//! `pg_trgm` GIN trigram index on `text`, so dense and sparse search never
//! need a cross-engine join. This replaces the teacher's Qdrant+Tantivy
//! dual-engine stack (see DESIGN.md): the teacher's `VectorStore`/
//! `SparseIndex` types aren't present in this crate at all, by design.

use async_trait::async_trait;
use medrag_core::{Chunk, VectorStore};
use pgvector::Vector;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::RagError;

pub struct PostgresVectorStore {
    pool: PgPool,
    keyword_search_enabled: bool,
}

impl PostgresVectorStore {
    pub async fn connect(
        connection_string: &str,
        min_connections: u32,
        max_connections: u32,
        keyword_search_enabled: bool,
    ) -> Result<Self, RagError> {
        let pool = PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .connect(connection_string)
            .await?;

        Ok(Self {
            pool,
            keyword_search_enabled,
        })
    }

    fn row_to_chunk(row: &PgRow) -> Result<Chunk, RagError> {
        let embedding: Vector = row.try_get("embedding")?;
        Ok(Chunk {
            id: row.try_get("id")?,
            text: row.try_get("text")?,
            source_document: row.try_get("source_document")?,
            chapter_title: row.try_get("chapter_title")?,
            section_title: row.try_get("section_title")?,
            subsection_titles: row.try_get::<Vec<String>, _>("subsection_titles")?,
            summary: row.try_get("summary")?,
            token_count: row.try_get::<i32, _>("token_count")? as u32,
            embedding: embedding.to_vec(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl VectorStore for PostgresVectorStore {
    async fn search_dense(&self, vector: &[f32], k: usize) -> medrag_core::Result<Vec<(Chunk, f32)>> {
        let query_vector = Vector::from(vector.to_vec());

        let rows = sqlx::query(
            "SELECT id, text, source_document, chapter_title, section_title, \
             subsection_titles, summary, token_count, embedding, created_at, updated_at, \
             1 - (embedding <=> $1) AS similarity \
             FROM chunks ORDER BY embedding <=> $1 LIMIT $2",
        )
        .bind(&query_vector)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::from)
        .map_err(medrag_core::Error::from)?;

        rows.iter()
            .map(|row| {
                let chunk = Self::row_to_chunk(row).map_err(medrag_core::Error::from)?;
                let similarity: f32 = row.try_get("similarity").map_err(|e| {
                    medrag_core::Error::from(RagError::VectorStore(e.to_string()))
                })?;
                Ok((chunk, similarity))
            })
            .collect()
    }

    async fn search_sparse(
        &self,
        text: &str,
        k: usize,
        threshold: f32,
    ) -> medrag_core::Result<Option<Vec<(Chunk, f32)>>> {
        if !self.keyword_search_enabled {
            return Ok(None);
        }

        let rows = sqlx::query(
            "SELECT id, text, source_document, chapter_title, section_title, \
             subsection_titles, summary, token_count, embedding, created_at, updated_at, \
             similarity(text, $1) AS sim \
             FROM chunks WHERE similarity(text, $1) >= $2 \
             ORDER BY sim DESC LIMIT $3",
        )
        .bind(text)
        .bind(threshold)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::from)
        .map_err(medrag_core::Error::from)?;

        let results = rows
            .iter()
            .map(|row| {
                let chunk = Self::row_to_chunk(row).map_err(medrag_core::Error::from)?;
                let sim: f32 = row
                    .try_get("sim")
                    .map_err(|e| medrag_core::Error::from(RagError::VectorStore(e.to_string())))?;
                Ok((chunk, sim))
            })
            .collect::<medrag_core::Result<Vec<_>>>()?;

        Ok(Some(results))
    }

    async fn upsert(&self, chunk: Chunk) -> medrag_core::Result<()> {
        let vector = Vector::from(chunk.embedding.clone());
        sqlx::query(
            "INSERT INTO chunks (id, text, source_document, chapter_title, section_title, \
             subsection_titles, summary, token_count, embedding, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO UPDATE SET \
             text = EXCLUDED.text, source_document = EXCLUDED.source_document, \
             chapter_title = EXCLUDED.chapter_title, section_title = EXCLUDED.section_title, \
             subsection_titles = EXCLUDED.subsection_titles, summary = EXCLUDED.summary, \
             token_count = EXCLUDED.token_count, embedding = EXCLUDED.embedding, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(&chunk.id)
        .bind(&chunk.text)
        .bind(&chunk.source_document)
        .bind(&chunk.chapter_title)
        .bind(&chunk.section_title)
        .bind(&chunk.subsection_titles)
        .bind(&chunk.summary)
        .bind(chunk.token_count as i32)
        .bind(&vector)
        .bind(chunk.created_at)
        .bind(chunk.updated_at)
        .execute(&self.pool)
        .await
        .map_err(RagError::from)?;

        Ok(())
    }

    async fn batch_upsert(&self, chunks: Vec<Chunk>) -> medrag_core::Result<()> {
        for chunk in chunks {
            self.upsert(chunk).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // `PostgresVectorStore` needs a live Postgres instance with pgvector and
    // pg_trgm extensions; exercised by the end-to-end scenario tests in
    // `crates/server` against a test database, not unit-tested here.
}

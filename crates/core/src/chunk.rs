//! Corpus chunk type, owned by the VectorStore.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A passage-sized, pre-embedded unit of the medical corpus. Produced by an
/// offline chunking pipeline (out of scope here); the VectorStore owns
/// `Chunk` rows and retrievers only ever see read-only copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source_document: String,
    pub chapter_title: Option<String>,
    pub section_title: Option<String>,
    #[serde(default)]
    pub subsection_titles: Vec<String>,
    pub summary: Option<String>,
    pub token_count: u32,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chunk {
    /// Construct a chunk, enforcing the invariants spec §3 names: id
    /// non-empty, text at least 10 chars.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        source_document: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Result<Self> {
        let id = id.into();
        let text = text.into();
        if id.is_empty() {
            return Err(Error::InvalidChunk("id must not be empty".into()));
        }
        if text.chars().count() < 10 {
            return Err(Error::InvalidChunk(
                "text must be at least 10 characters".into(),
            ));
        }
        let now = Utc::now();
        let token_count = (text.split_whitespace().count() as f32 * 1.3) as u32;
        Ok(Self {
            id,
            text,
            source_document: source_document.into(),
            chapter_title: None,
            section_title: None,
            subsection_titles: Vec::new(),
            summary: None,
            token_count,
            embedding,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_titles(
        mut self,
        chapter: Option<String>,
        section: Option<String>,
        subsections: Vec<String>,
    ) -> Self {
        self.chapter_title = chapter;
        self.section_title = section;
        self.subsection_titles = subsections;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_text() {
        let result = Chunk::new("c1", "too short", "doc.md", vec![0.0; 4]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_id() {
        let result = Chunk::new("", "a sufficiently long chunk of text", "doc.md", vec![0.0; 4]);
        assert!(result.is_err());
    }

    #[test]
    fn accepts_valid_chunk() {
        let chunk = Chunk::new(
            "c1",
            "Aripiprazole is a partial dopamine agonist used in schizophrenia.",
            "pharmacology.md",
            vec![0.1, 0.2, 0.3],
        )
        .unwrap();
        assert_eq!(chunk.id, "c1");
        assert!(chunk.token_count > 0);
    }
}

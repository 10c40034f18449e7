//! `Retriever` strategies (C3/C4): Simple, Rerank, Advanced.
//!
//! `AdvancedRetriever`'s fan-out/fusion is a direct generalization of the
//! teacher's `HybridRetriever::rrf_fusion` (exactly one dense list + exactly
//! one sparse list) to N dense/sparse list pairs, one pair per LLM-generated
//! query variation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use medrag_core::{
    Error as CoreError, QueryInput, Result as CoreResult, RetrievalResult, Retriever, ScoredChunk,
    SearchSource,
};
use medrag_core::{Chunk, EmbeddingProvider, Reranker, VectorStore};

use crate::query_expansion::QueryExpander;

const DEFAULT_RRF_K: f32 = 60.0;
const DEFAULT_DENSE_WEIGHT: f32 = 0.6;

async fn until_deadline<F, T>(deadline: Instant, fut: F) -> CoreResult<T>
where
    F: std::future::Future<Output = CoreResult<T>>,
{
    match tokio::time::timeout_at(deadline.into(), fut).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::Component("retrieval deadline exceeded".to_string())),
    }
}

/// Dense-only retrieval: encode the query, search, return as-is. Grounded on
/// `HybridRetriever::search_dense` with reranking and fusion stripped out.
pub struct SimpleRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl SimpleRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }
}

#[async_trait]
impl Retriever for SimpleRetriever {
    async fn retrieve(&self, input: QueryInput, top_k: usize, deadline: Instant) -> CoreResult<RetrievalResult> {
        let query = input.primary_text().unwrap_or_default().to_string();
        until_deadline(deadline, async {
            let vectors = self.embedder.encode(std::slice::from_ref(&query)).await?;
            let vector = vectors.into_iter().next().unwrap_or_default();
            let hits = self.store.search_dense(&vector, top_k).await?;
            Ok(hits
                .into_iter()
                .enumerate()
                .map(|(rank, (chunk, score))| ScoredChunk {
                    chunk,
                    dense_score: Some(score),
                    rerank_score: None,
                    rank,
                    source: SearchSource::Dense,
                })
                .collect())
        })
        .await
    }

    fn name(&self) -> &str {
        "simple"
    }
}

/// Dense search over a wider candidate pool, then cross-encoder rerank down
/// to `top_k`. Grounded on `HybridRetriever::rerank`.
pub struct RerankRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    reranker: Arc<dyn Reranker>,
    candidate_multiplier: usize,
}

impl RerankRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        reranker: Arc<dyn Reranker>,
        candidate_multiplier: usize,
    ) -> Self {
        Self { embedder, store, reranker, candidate_multiplier }
    }
}

#[async_trait]
impl Retriever for RerankRetriever {
    async fn retrieve(&self, input: QueryInput, top_k: usize, deadline: Instant) -> CoreResult<RetrievalResult> {
        let query = input.primary_text().unwrap_or_default().to_string();
        until_deadline(deadline, async {
            let vectors = self.embedder.encode(std::slice::from_ref(&query)).await?;
            let vector = vectors.into_iter().next().unwrap_or_default();
            let candidate_k = top_k.saturating_mul(self.candidate_multiplier).max(top_k);
            let hits = self.store.search_dense(&vector, candidate_k).await?;

            let passages: Vec<String> = hits.iter().map(|(chunk, _)| chunk.text.clone()).collect();
            let rerank_scores = self.reranker.rerank(&query, &passages).await?;

            let mut scored: Vec<(Chunk, f32, f32)> = hits
                .into_iter()
                .zip(rerank_scores)
                .map(|((chunk, dense_score), rerank_score)| (chunk, dense_score, rerank_score))
                .collect();
            scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(top_k);

            Ok(scored
                .into_iter()
                .enumerate()
                .map(|(rank, (chunk, dense_score, rerank_score))| ScoredChunk {
                    chunk,
                    dense_score: Some(dense_score),
                    rerank_score: Some(rerank_score),
                    rank,
                    source: SearchSource::Dense,
                })
                .collect())
        })
        .await
    }

    fn name(&self) -> &str {
        "rerank"
    }
}

/// Query-expand, fan out dense+sparse search per variation, fuse with RRF,
/// rerank the merged candidate pool. Grounded on `HybridRetriever::search`
/// plus `rrf_fusion`, generalized from one dense/sparse pair to N.
pub struct AdvancedRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    reranker: Arc<dyn Reranker>,
    query_expander: QueryExpander,
    candidate_multiplier: usize,
    keyword_similarity_threshold: f32,
    rrf_k: f32,
    dense_weight: f32,
}

impl AdvancedRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        reranker: Arc<dyn Reranker>,
        query_expander: QueryExpander,
        candidate_multiplier: usize,
        keyword_similarity_threshold: f32,
    ) -> Self {
        Self {
            embedder,
            store,
            reranker,
            query_expander,
            candidate_multiplier,
            keyword_similarity_threshold,
            rrf_k: DEFAULT_RRF_K,
            dense_weight: DEFAULT_DENSE_WEIGHT,
        }
    }

    async fn fetch_variation(&self, query: &str, candidate_k: usize) -> (Vec<(Chunk, f32)>, Option<Vec<(Chunk, f32)>>) {
        let vectors = match self.embedder.encode(std::slice::from_ref(&query.to_string())).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed for query variation, skipping");
                return (Vec::new(), None);
            }
        };
        let vector = vectors.into_iter().next().unwrap_or_default();

        let dense = self.store.search_dense(&vector, candidate_k).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "dense search failed for query variation, skipping");
            Vec::new()
        });
        let sparse = self
            .store
            .search_sparse(query, candidate_k, self.keyword_similarity_threshold)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "sparse search failed for query variation, skipping");
                None
            });

        (dense, sparse)
    }

    /// Generalization of `HybridRetriever::rrf_fusion` to an arbitrary
    /// number of ranked lists, each weighted by whether it's a dense or
    /// sparse list.
    fn rrf_fuse(&self, lists: Vec<(SearchSource, Vec<(Chunk, f32)>)>) -> Vec<(Chunk, Option<f32>)> {
        let mut accum: HashMap<String, (f32, Chunk, Option<f32>)> = HashMap::new();

        for (source, hits) in lists {
            let weight = match source {
                SearchSource::Dense => self.dense_weight,
                SearchSource::Sparse => 1.0 - self.dense_weight,
                SearchSource::Hybrid => 1.0,
            };
            for (rank, (chunk, score)) in hits.into_iter().enumerate() {
                let rrf_score = weight / (self.rrf_k + rank as f32 + 1.0);
                let entry = accum
                    .entry(chunk.id.clone())
                    .or_insert_with(|| (0.0, chunk.clone(), None));
                entry.0 += rrf_score;
                if matches!(source, SearchSource::Dense) {
                    entry.2 = Some(score);
                }
            }
        }

        let mut fused: Vec<(f32, Chunk, Option<f32>)> = accum.into_values().collect();
        fused.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        fused.into_iter().map(|(_, chunk, dense_score)| (chunk, dense_score)).collect()
    }
}

#[async_trait]
impl Retriever for AdvancedRetriever {
    async fn retrieve(&self, input: QueryInput, top_k: usize, deadline: Instant) -> CoreResult<RetrievalResult> {
        let query = input.primary_text().unwrap_or_default().to_string();
        until_deadline(deadline, async {
            let (variations, stats) = self.query_expander.expand(&input).await?;
            tracing::debug!(queries_generated = stats.queries_generated, was_expanded = stats.was_expanded, "query expansion");

            let candidate_k = top_k.saturating_mul(self.candidate_multiplier).max(top_k);
            let results = futures::future::join_all(
                variations.iter().map(|q| self.fetch_variation(q, candidate_k)),
            )
            .await;

            let mut lists = Vec::with_capacity(results.len() * 2);
            for (dense, sparse) in results {
                if !dense.is_empty() {
                    lists.push((SearchSource::Dense, dense));
                }
                if let Some(sparse) = sparse {
                    if !sparse.is_empty() {
                        lists.push((SearchSource::Sparse, sparse));
                    }
                }
            }

            let mut fused = self.rrf_fuse(lists);
            fused.truncate(candidate_k);

            if fused.is_empty() {
                return Ok(Vec::new());
            }

            let passages: Vec<String> = fused.iter().map(|(chunk, _)| chunk.text.clone()).collect();
            let rerank_scores = self.reranker.rerank(&query, &passages).await?;

            let mut scored: Vec<(Chunk, Option<f32>, f32)> = fused
                .into_iter()
                .zip(rerank_scores)
                .map(|((chunk, dense_score), rerank_score)| (chunk, dense_score, rerank_score))
                .collect();
            scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(top_k);

            Ok(scored
                .into_iter()
                .enumerate()
                .map(|(rank, (chunk, dense_score, rerank_score))| ScoredChunk {
                    chunk,
                    dense_score,
                    rerank_score: Some(rerank_score),
                    rank,
                    source: SearchSource::Hybrid,
                })
                .collect())
        })
        .await
    }

    fn name(&self) -> &str {
        "advanced"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as at;
    use chrono::Utc;
    use medrag_core::{AgentLlm, Message, Result};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use tokio::sync::mpsc;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            source_document: "doc.md".to_string(),
            chapter_title: None,
            section_title: None,
            subsection_titles: Vec::new(),
            summary: None,
            token_count: 5,
            embedding: vec![0.0; 4],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct StubEmbedder;
    #[at]
    impl EmbeddingProvider for StubEmbedder {
        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
        fn dimension(&self) -> Option<usize> {
            Some(3)
        }
        fn name(&self) -> &str {
            "stub"
        }
    }

    struct StubStore {
        dense: Vec<(Chunk, f32)>,
        sparse: Option<Vec<(Chunk, f32)>>,
        calls: AtomicUsize,
    }
    #[at]
    impl VectorStore for StubStore {
        async fn search_dense(&self, _vector: &[f32], k: usize) -> Result<Vec<(Chunk, f32)>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.dense.iter().take(k).cloned().collect())
        }
        async fn search_sparse(&self, _text: &str, k: usize, _threshold: f32) -> Result<Option<Vec<(Chunk, f32)>>> {
            Ok(self.sparse.as_ref().map(|v| v.iter().take(k).cloned().collect()))
        }
        async fn upsert(&self, _chunk: Chunk) -> Result<()> {
            Ok(())
        }
        async fn batch_upsert(&self, _chunks: Vec<Chunk>) -> Result<()> {
            Ok(())
        }
    }

    struct StubReranker;
    #[at]
    impl Reranker for StubReranker {
        async fn rerank(&self, _query: &str, passages: &[String]) -> Result<Vec<f32>> {
            Ok(passages.iter().enumerate().map(|(i, _)| 1.0 - (i as f32 * 0.1)).collect())
        }
    }

    struct StubLlm;
    #[at]
    impl AgentLlm for StubLlm {
        async fn generate(&self, _messages: &[Message], _temperature: f32) -> Result<String> {
            Ok("alternate phrasing".to_string())
        }
        async fn generate_stream(&self, _: &[Message], _: f32, _: mpsc::Sender<String>) -> Result<()> {
            Ok(())
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn far_deadline() -> Instant {
        Instant::now() + std::time::Duration::from_secs(30)
    }

    #[tokio::test]
    async fn simple_retriever_returns_dense_results_in_order() {
        let store = Arc::new(StubStore {
            dense: vec![(chunk("a", "alpha passage"), 0.9), (chunk("b", "beta passage"), 0.5)],
            sparse: None,
            calls: AtomicUsize::new(0),
        });
        let retriever = SimpleRetriever::new(Arc::new(StubEmbedder), store);
        let result = retriever
            .retrieve(QueryInput::Last("query".to_string()), 2, far_deadline())
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].chunk.id, "a");
        assert_eq!(result[0].source, SearchSource::Dense);
        assert!(result[0].rerank_score.is_none());
    }

    #[tokio::test]
    async fn rerank_retriever_reorders_by_rerank_score() {
        let store = Arc::new(StubStore {
            dense: vec![(chunk("a", "alpha"), 0.9), (chunk("b", "beta"), 0.8)],
            sparse: None,
            calls: AtomicUsize::new(0),
        });
        let retriever = RerankRetriever::new(Arc::new(StubEmbedder), store, Arc::new(StubReranker), 2);
        let result = retriever
            .retrieve(QueryInput::Last("query".to_string()), 2, far_deadline())
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert!(result[0].rerank_score.unwrap() >= result[1].rerank_score.unwrap());
    }

    #[tokio::test]
    async fn advanced_retriever_fuses_dense_and_sparse_and_reranks() {
        let store = Arc::new(StubStore {
            dense: vec![(chunk("a", "alpha"), 0.9), (chunk("b", "beta"), 0.5)],
            sparse: Some(vec![(chunk("b", "beta"), 0.7), (chunk("c", "gamma"), 0.4)]),
            calls: AtomicUsize::new(0),
        });
        let expander = QueryExpander::new(Arc::new(StubLlm), crate::query_expansion::QueryExpansionConfig::default());
        let retriever = AdvancedRetriever::new(
            Arc::new(StubEmbedder), store, Arc::new(StubReranker), expander, 3, 0.1,
        );
        let result = retriever
            .retrieve(QueryInput::Last("query".to_string()), 3, far_deadline())
            .await
            .unwrap();
        assert!(!result.is_empty());
        assert!(result.iter().all(|r| r.source == SearchSource::Hybrid));
    }
}

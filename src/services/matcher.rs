//! Brute-force top-K semantic matcher.
//!
//! Similarity is the dot product of unit vectors. The scan is sharded per chunk
//! across the rayon pool; each shard keeps a bounded min-heap and the shards are
//! merged at the end. Ties break by corpus position.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

use super::embedding::Encoder;
use super::store::{Chunk, ChunkedVectorStore};
use crate::error::{EmbeddingError, QueryError, StoreLoadError};
use crate::models::{MatchResult, MetricFilter};
use crate::utils::{dot, l2_norm};

/// Query embeddings with a norm below this are rejected.
const MIN_QUERY_NORM: f32 = 1e-6;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f32,
    position: usize,
}

impl Ord for Candidate {
    /// Greater is better: higher score, then earlier position.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.position.cmp(&self.position))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Keeps the best `k` candidates seen; the heap top is the worst of them.
struct TopK {
    k: usize,
    heap: BinaryHeap<Reverse<Candidate>>,
}

impl TopK {
    fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1)),
        }
    }

    fn offer(&mut self, candidate: Candidate) {
        if self.heap.len() < self.k {
            self.heap.push(Reverse(candidate));
        } else if let Some(Reverse(worst)) = self.heap.peek()
            && candidate > *worst
        {
            self.heap.pop();
            self.heap.push(Reverse(candidate));
        }
    }

    fn merge(mut self, other: TopK) -> Self {
        for Reverse(candidate) in other.heap {
            self.offer(candidate);
        }
        self
    }

    /// Best first.
    fn into_sorted(self) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self.heap.into_iter().map(|Reverse(c)| c).collect();
        candidates.sort_unstable_by(|a, b| b.cmp(a));
        candidates
    }
}

pub struct SemanticMatcher {
    store: Arc<ChunkedVectorStore>,
    encoder: Arc<dyn Encoder>,
}

impl SemanticMatcher {
    /// Pair a store with the encoder used for queries. The encoder must be the
    /// model that built the store.
    pub fn new(store: Arc<ChunkedVectorStore>, encoder: Arc<dyn Encoder>) -> Result<Self, StoreLoadError> {
        if store.model_id() != encoder.model_id() {
            return Err(StoreLoadError::ModelMismatch {
                store: store.model_id().to_string(),
                encoder: encoder.model_id().to_string(),
            });
        }
        if store.dimension() != encoder.dimension() {
            return Err(StoreLoadError::DimensionMismatch {
                store: store.dimension(),
                encoder: encoder.dimension(),
            });
        }
        Ok(Self { store, encoder })
    }

    pub fn store(&self) -> &Arc<ChunkedVectorStore> {
        &self.store
    }

    /// Up to `top_k` keywords most similar to `query`, best first, among those
    /// passing every filter.
    pub async fn find_matches(
        &self,
        query: &str,
        top_k: usize,
        filters: &[MetricFilter],
    ) -> Result<Vec<MatchResult>, QueryError> {
        self.find_matches_cancellable(query, top_k, filters, None).await
    }

    /// As [`find_matches`](Self::find_matches); the scan stops with
    /// [`QueryError::Cancelled`] at the next chunk boundary once `cancel` is set.
    pub async fn find_matches_cancellable(
        &self,
        query: &str,
        top_k: usize,
        filters: &[MetricFilter],
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<MatchResult>, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.encode_query(query).await?;
        self.rank(&query_vector, top_k, filters, cancel)
    }

    async fn encode_query(&self, query: &str) -> Result<Vec<f32>, QueryError> {
        let mut vector = self.encoder.encode(query).await?;
        if vector.len() != self.store.dimension() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.store.dimension(),
                actual: vector.len(),
            }
            .into());
        }

        let norm = l2_norm(&vector);
        if !norm.is_finite() || norm < MIN_QUERY_NORM {
            return Err(QueryError::DegenerateQuery(norm));
        }
        vector.iter_mut().for_each(|x| *x /= norm);
        Ok(vector)
    }

    /// Scan the store with an already normalized query vector.
    pub fn rank(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filters: &[MetricFilter],
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<MatchResult>, QueryError> {
        if top_k == 0 || self.store.is_empty() {
            return Ok(Vec::new());
        }
        let top_k = top_k.min(self.store.len());
        if query_vector.len() != self.store.dimension() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.store.dimension(),
                actual: query_vector.len(),
            }
            .into());
        }

        let start = Instant::now();
        let shards = self
            .store
            .chunks()
            .par_iter()
            .map(|chunk| {
                if cancel.is_some_and(|c| c.load(AtomicOrdering::Relaxed)) {
                    return Err(QueryError::Cancelled);
                }
                Ok(self.scan_chunk(chunk, query_vector, top_k, filters))
            })
            .collect::<Result<Vec<TopK>, QueryError>>()?;

        let best = shards
            .into_iter()
            .fold(TopK::new(top_k), TopK::merge)
            .into_sorted();

        let matches: Vec<MatchResult> = best
            .into_iter()
            .filter_map(|c| {
                let entry = self.store.entry(c.position)?;
                Some(MatchResult {
                    keyword: entry.keyword.to_string(),
                    similarity: c.score,
                    metrics: entry.record.clone(),
                })
            })
            .collect();

        debug!(
            top_k,
            filters = filters.len(),
            matches = matches.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "scan complete"
        );
        Ok(matches)
    }

    fn scan_chunk(&self, chunk: &Chunk, query: &[f32], top_k: usize, filters: &[MetricFilter]) -> TopK {
        let mut top = TopK::new(top_k.min(chunk.len()));
        for entry in self.store.chunk_entries(chunk) {
            if !filters.iter().all(|f| f.matches(entry.record)) {
                continue;
            }
            top.offer(Candidate {
                score: dot(query, entry.vector).clamp(-1.0, 1.0),
                position: entry.position,
            });
        }
        top
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilterField, FilterOp, KeywordRecord};
    use crate::services::{Corpus, StoreBuilder};
    use crate::test_utils::{HashingEncoder, MapEncoder, numbered_records, scenario_records};
    use crate::utils::normalize_in_place;
    use tempfile::TempDir;

    async fn matcher_for(
        encoder: Arc<dyn Encoder>,
        records: Vec<KeywordRecord>,
        chunk_size: usize,
    ) -> (TempDir, SemanticMatcher) {
        let dir = TempDir::new().unwrap();
        let corpus = Corpus::from_records(records).unwrap();
        StoreBuilder::new(Arc::clone(&encoder))
            .with_chunk_size(chunk_size)
            .write_store(&corpus, dir.path())
            .await
            .unwrap();
        let store = Arc::new(ChunkedVectorStore::open(dir.path()).unwrap());
        (dir, SemanticMatcher::new(store, encoder).unwrap())
    }

    fn brute_force(matcher: &SemanticMatcher, query: &[f32], k: usize) -> Vec<String> {
        let mut scored: Vec<(f32, usize, String)> = matcher
            .store()
            .iter()
            .map(|e| (dot(query, e.vector), e.position, e.keyword.to_string()))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.into_iter().take(k).map(|(_, _, kw)| kw).collect()
    }

    #[tokio::test]
    async fn test_top_k_matches_brute_force_for_every_k() {
        let encoder = Arc::new(HashingEncoder::new(12));
        let (_dir, matcher) = matcher_for(encoder.clone(), numbered_records(23), 5).await;

        let mut query = encoder.embed("keyword 0013");
        normalize_in_place(&mut query, 0.0).unwrap();

        let len = matcher.store().len();
        for k in 0..=len + 2 {
            let ranked: Vec<String> = matcher
                .rank(&query, k, &[], None)
                .unwrap()
                .into_iter()
                .map(|m| m.keyword)
                .collect();
            assert_eq!(ranked, brute_force(&matcher, &query, k), "k = {k}");
        }
    }

    #[tokio::test]
    async fn test_top_k_beyond_corpus_returns_everything() {
        let encoder = Arc::new(HashingEncoder::new(12));
        let (_dir, matcher) = matcher_for(encoder.clone(), numbered_records(5), 2).await;

        let mut query = encoder.embed("keyword 0003");
        normalize_in_place(&mut query, 0.0).unwrap();

        for k in [u32::MAX as usize, usize::MAX] {
            let ranked: Vec<String> = matcher
                .rank(&query, k, &[], None)
                .unwrap()
                .into_iter()
                .map(|m| m.keyword)
                .collect();
            assert_eq!(ranked.len(), 5);
            assert_eq!(ranked, brute_force(&matcher, &query, 5));
        }

        let matches = matcher.find_matches("keyword 0003", usize::MAX, &[]).await.unwrap();
        assert_eq!(matches.len(), 5);
    }

    #[tokio::test]
    async fn test_ties_break_by_corpus_order() {
        let encoder = MapEncoder::new("stub", 2)
            .with("zeta", vec![1.0, 0.0])
            .with("alpha", vec![1.0, 0.0])
            .with("other", vec![0.0, 1.0])
            .with("q", vec![1.0, 0.0]);
        let records = vec![
            KeywordRecord::new("other"),
            KeywordRecord::new("zeta"),
            KeywordRecord::new("alpha"),
        ];
        let (_dir, matcher) = matcher_for(Arc::new(encoder), records, 1).await;

        let matches = matcher.find_matches("q", 2, &[]).await.unwrap();
        let keywords: Vec<&str> = matches.iter().map(|m| m.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["zeta", "alpha"]);
    }

    #[tokio::test]
    async fn test_photo_editor_scenario() {
        let (_dir, matcher) =
            matcher_for(Arc::new(MapEncoder::scenario()), scenario_records(), 2).await;

        let matches = matcher.find_matches("edit photos online", 3, &[]).await.unwrap();
        let keywords: Vec<&str> = matches.iter().map(|m| m.keyword.as_str()).collect();
        assert_eq!(keywords[0], "photo editor");
        let photo = keywords.iter().position(|k| *k == "photo editor").unwrap();
        let tax = keywords.iter().position(|k| *k == "tax software").unwrap();
        assert!(photo < tax);

        for m in &matches {
            assert!((-1.0..=1.0).contains(&m.similarity));
        }
        for pair in matches.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[tokio::test]
    async fn test_zero_k_and_empty_query() {
        let (_dir, matcher) =
            matcher_for(Arc::new(MapEncoder::scenario()), scenario_records(), 2).await;

        assert!(matcher.find_matches("edit photos online", 0, &[]).await.unwrap().is_empty());
        assert!(matches!(
            matcher.find_matches("   ", 5, &[]).await,
            Err(QueryError::EmptyQuery)
        ));
    }

    #[tokio::test]
    async fn test_degenerate_query_is_rejected() {
        let encoder = MapEncoder::scenario().with("???", vec![0.0; 5]);
        let (_dir, matcher) = matcher_for(Arc::new(encoder), scenario_records(), 2).await;

        assert!(matches!(
            matcher.find_matches("???", 5, &[]).await,
            Err(QueryError::DegenerateQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_nothing() {
        let encoder: Arc<dyn Encoder> = Arc::new(HashingEncoder::new(8));
        let (_dir, matcher) = matcher_for(encoder, Vec::new(), 4).await;
        assert!(matcher.find_matches("anything", 10, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filters_apply_before_ranking() {
        let (_dir, matcher) =
            matcher_for(Arc::new(MapEncoder::scenario()), scenario_records(), 2).await;
        let cheap = MetricFilter::new(FilterField::Cpc, FilterOp::Lt, 2.0).unwrap();

        let matches = matcher.find_matches("edit photos online", 3, &[cheap]).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].keyword, "photo editor");

        // tax software has no top_page_bid, so it never satisfies a bid filter.
        let any_bid: MetricFilter = "top_page_bid >= 0".parse().unwrap();
        let matches = matcher.find_matches("edit photos online", 3, &[any_bid]).await.unwrap();
        assert!(matches.iter().all(|m| m.keyword != "tax software"));
    }

    #[tokio::test]
    async fn test_cancelled_scan() {
        let encoder = Arc::new(HashingEncoder::new(8));
        let (_dir, matcher) = matcher_for(encoder, numbered_records(10), 3).await;
        let cancel = AtomicBool::new(true);

        let result = matcher
            .find_matches_cancellable("keyword", 5, &[], Some(&cancel))
            .await;
        assert!(matches!(result, Err(QueryError::Cancelled)));
    }

    #[tokio::test]
    async fn test_model_mismatch_is_refused() {
        let (_dir, matcher) =
            matcher_for(Arc::new(HashingEncoder::new(5)), numbered_records(3), 3).await;
        let store = Arc::clone(matcher.store());

        let result = SemanticMatcher::new(store, Arc::new(MapEncoder::scenario()));
        assert!(matches!(result, Err(StoreLoadError::ModelMismatch { .. })));
    }

    #[test]
    fn test_top_k_keeps_best() {
        let mut top = TopK::new(2);
        for (score, position) in [(0.1, 0), (0.9, 1), (0.5, 2), (0.9, 3)] {
            top.offer(Candidate { score, position });
        }
        let positions: Vec<usize> = top.into_sorted().iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![1, 3]);
    }
}

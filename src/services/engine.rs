//! Search facade: matcher, then aggregation.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use super::aggregator::MetricsAggregator;
use super::embedding::Encoder;
use super::matcher::SemanticMatcher;
use super::store::ChunkedVectorStore;
use crate::error::{QueryError, StoreLoadError};
use crate::models::{MetricFilter, ScoringConfig, SearchResponse};

pub struct KeywordSearch {
    matcher: SemanticMatcher,
    aggregator: MetricsAggregator,
}

impl KeywordSearch {
    pub fn new(matcher: SemanticMatcher, aggregator: MetricsAggregator) -> Self {
        Self {
            matcher,
            aggregator,
        }
    }

    pub fn from_store(
        store: Arc<ChunkedVectorStore>,
        encoder: Arc<dyn Encoder>,
        scoring: ScoringConfig,
    ) -> Result<Self, StoreLoadError> {
        Ok(Self::new(
            SemanticMatcher::new(store, encoder)?,
            MetricsAggregator::new(scoring),
        ))
    }

    pub fn matcher(&self) -> &SemanticMatcher {
        &self.matcher
    }

    pub fn store(&self) -> &ChunkedVectorStore {
        self.matcher.store()
    }

    /// Top-K matches for `query` plus their similarity-weighted aggregate.
    /// An empty match list is a valid answer, not an error.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &[MetricFilter],
    ) -> Result<SearchResponse, QueryError> {
        let start = Instant::now();
        let matches = self.matcher.find_matches(query, top_k, filters).await?;
        let aggregated = self.aggregator.aggregate(&matches);
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            query,
            top_k,
            matches = matches.len(),
            duration_ms,
            "search complete"
        );

        Ok(SearchResponse {
            query: query.to_string(),
            matches,
            aggregated,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AggregatedMetrics;
    use crate::services::{Corpus, DataDir, StoreBuilder};
    use crate::test_utils::{MapEncoder, scenario_records};
    use tempfile::TempDir;

    async fn scenario_search() -> (TempDir, KeywordSearch) {
        let dir = TempDir::new().unwrap();
        let data_dir = DataDir::new(dir.path());
        let encoder: Arc<dyn Encoder> = Arc::new(MapEncoder::scenario());

        let corpus = Corpus::from_records(scenario_records()).unwrap();
        StoreBuilder::new(Arc::clone(&encoder))
            .with_chunk_size(2)
            .build(&corpus, &data_dir)
            .await
            .unwrap();

        let store = Arc::new(ChunkedVectorStore::open_current(&data_dir, 1e-4).unwrap());
        let search = KeywordSearch::from_store(store, encoder, ScoringConfig::default()).unwrap();
        (dir, search)
    }

    #[tokio::test]
    async fn test_search_returns_matches_and_aggregate() {
        let (_dir, search) = scenario_search().await;
        let response = search.search("edit photos online", 2, &[]).await.unwrap();

        assert_eq!(response.len(), 2);
        assert_eq!(response.matches[0].keyword, "photo editor");
        assert_eq!(response.aggregated.monthly_trend.len(), 12);
        assert!(response.aggregated.avg_volume > 0.0);
        assert!((0.0..=100.0).contains(&response.aggregated.opportunity_score));
    }

    #[tokio::test]
    async fn test_filtered_to_nothing_is_empty_not_error() {
        let (_dir, search) = scenario_search().await;
        let filter: MetricFilter = "volume > 1000000".parse().unwrap();
        let response = search
            .search("edit photos online", 5, &[filter])
            .await
            .unwrap();

        assert!(response.is_empty());
        assert_eq!(response.aggregated, AggregatedMetrics::default());
    }

    #[tokio::test]
    async fn test_rejected_query_does_not_poison_store() {
        let (_dir, search) = scenario_search().await;
        assert!(search.search("", 5, &[]).await.is_err());
        assert!(search.search("unknown phrase", 5, &[]).await.is_err());
        assert!(search.search("edit photos online", 5, &[]).await.is_ok());
    }
}

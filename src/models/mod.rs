mod config;
mod keyword;
mod metrics;
mod search;
mod store;

pub use config::{
    Config, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL, DEFAULT_KEEP_GENERATIONS,
    DEFAULT_NORMALIZATION_TOLERANCE, EmbeddingConfig, ScoringConfig, SearchConfig, StoreConfig,
};
pub use keyword::{KeywordRecord, MonthKey};
pub use metrics::{AggregatedMetrics, GrowthRates, TrendPoint};
pub use search::{
    FilterField, FilterOp, MatchResult, MetricFilter, OutputFormat, SearchResponse,
};
pub use store::{
    BuildReport, CHUNKS_DIR, ChunkInfo, DEFAULT_CHUNK_SIZE, KeywordLocation, MAX_EMBEDDING_DIMENSIONS,
    METADATA_FILE,
    RECORDS_FILE, STORE_FORMAT_VERSION, StoreIndex, StoreInfo, chunk_file_name,
};

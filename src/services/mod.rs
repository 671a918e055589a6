pub mod aggregator;
pub mod builder;
pub mod corpus;
pub mod embedding;
pub mod engine;
pub mod generations;
pub mod growth;
pub mod matcher;
pub mod store;

pub use aggregator::MetricsAggregator;
pub use builder::{ProgressFn, StoreBuilder};
pub use corpus::{Corpus, load_corpus, parse_csv, validate_records};
pub use embedding::{Encoder, OnnxEncoder, OnnxModel, PrecomputedEncoder};
pub use engine::KeywordSearch;
pub use generations::{BuildLock, DataDir};
pub use growth::{growth, is_chronological};
pub use matcher::SemanticMatcher;
pub use store::{Chunk, ChunkedVectorStore, StoreEntry};

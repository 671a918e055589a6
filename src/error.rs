//! Error types for the keyword opportunity engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors related to embedding generation.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("failed to load model: {0}")]
    LoadError(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("inference error: {0}")]
    InferenceError(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("no precomputed embedding for: {0}")]
    UnknownText(String),

    #[error("invalid embedding data: {0}")]
    InvalidData(String),
}

/// Errors raised while building a vector store. Every variant aborts the build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cannot read corpus {path}: {source}")]
    CorpusUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corpus parse error: {0}")]
    CorpusParse(String),

    #[error("invalid record at row {row}: {reason}")]
    InvalidRecord { row: usize, reason: String },

    #[error("empty keyword at row {row}")]
    EmptyKeyword { row: usize },

    #[error("duplicate keyword: {0}")]
    DuplicateKeyword(String),

    #[error("encoder failed on '{keyword}': {source}")]
    Encoder {
        keyword: String,
        #[source]
        source: EmbeddingError,
    },

    #[error("zero or non-finite embedding for '{0}'")]
    ZeroVector(String),

    #[error("embedding dimension mismatch for '{keyword}': expected {expected}, got {actual}")]
    DimensionMismatch {
        keyword: String,
        expected: usize,
        actual: usize,
    },

    #[error("another build holds the lock: {0}")]
    Locked(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised while loading a persisted store. The store refuses to serve.
#[derive(Debug, Error)]
pub enum StoreLoadError {
    #[error("no active store in {0}")]
    NoActiveStore(PathBuf),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed store index: {0}")]
    MalformedIndex(String),

    #[error("missing chunk file: {0}")]
    MissingChunk(PathBuf),

    #[error("chunk {path} has {actual} bytes, expected {expected}")]
    ChunkSizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("corrupt vector for '{keyword}': {reason}")]
    CorruptVector { keyword: String, reason: String },

    #[error("keyword records do not match the index: {0}")]
    RecordMismatch(String),

    #[error("store was built with '{store}' but the encoder is '{encoder}'")]
    ModelMismatch { store: String, encoder: String },

    #[error("store dimension {store} does not match encoder dimension {encoder}")]
    DimensionMismatch { store: usize, encoder: usize },
}

/// Per-request query errors. They never affect the store or other queries.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query text is empty")]
    EmptyQuery,

    #[error("query embedding is degenerate (norm {0:e})")]
    DegenerateQuery(f32),

    #[error("unknown filter field: {0}")]
    UnknownFilterField(String),

    #[error("malformed filter: {0}")]
    InvalidFilter(String),

    #[error("embedding error: {0}")]
    Encoder(#[from] EmbeddingError),

    #[error("query cancelled")]
    Cancelled,
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("build error: {0}")]
    Build(#[from] BuildError),

    #[error("store unavailable: {0}")]
    Store(#[from] StoreLoadError),

    #[error("query rejected: {0}")]
    Query(#[from] QueryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_distinguishes_outcomes() {
        let rejected: AppError = QueryError::EmptyQuery.into();
        assert!(rejected.to_string().starts_with("query rejected"));

        let unavailable: AppError = StoreLoadError::NoActiveStore(PathBuf::from("/tmp/x")).into();
        assert!(unavailable.to_string().starts_with("store unavailable"));
    }

    #[test]
    fn test_encoder_error_keeps_keyword() {
        let err = BuildError::Encoder {
            keyword: "photo editor".to_string(),
            source: EmbeddingError::InferenceError("boom".to_string()),
        };
        assert!(err.to_string().contains("photo editor"));
    }
}

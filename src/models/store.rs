//! Persisted store metadata (`embeddings_metadata.json`).

use serde::{Deserialize, Serialize};

/// On-disk format revision of the store layout.
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Largest embedding width a store index may declare.
pub const MAX_EMBEDDING_DIMENSIONS: usize = 1 << 16;

/// Default number of vectors per chunk file.
pub const DEFAULT_CHUNK_SIZE: usize = 2000;

pub const METADATA_FILE: &str = "embeddings_metadata.json";
pub const RECORDS_FILE: &str = "keywords.json";
pub const CHUNKS_DIR: &str = "embeddings_chunks";

/// File name of the chunk with the given id (`chunk_007.bin`).
pub fn chunk_file_name(chunk_id: usize) -> String {
    format!("chunk_{chunk_id:03}.bin")
}

/// One chunk file entry. `end_index` is inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub chunk_id: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub keyword_count: usize,
    pub file_path: String,
}

impl ChunkInfo {
    /// Exact file length for `dimension`-wide vectors; `None` on overflow.
    pub fn byte_len(&self, dimension: usize) -> Option<u64> {
        self.keyword_count
            .checked_mul(dimension)?
            .checked_mul(std::mem::size_of::<f32>())
            .and_then(|n| u64::try_from(n).ok())
    }
}

/// Position of one keyword's vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordLocation {
    pub keyword: String,
    pub chunk_id: usize,
    pub local_index: usize,
}

/// The store index written last by every build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreIndex {
    /// Identifier of the encoder model that produced the vectors.
    pub version: String,
    pub format_version: u32,
    pub created_at: String,
    pub total_keywords: usize,
    pub embedding_dimensions: usize,
    pub chunk_size: usize,
    #[serde(default)]
    pub corpus_checksum: Option<String>,
    pub chunks: Vec<ChunkInfo>,
    pub keywords: Vec<KeywordLocation>,
}

impl StoreIndex {
    pub fn model_id(&self) -> &str {
        &self.version
    }

    /// Global corpus position of a keyword location.
    pub fn global_position(&self, location: &KeywordLocation) -> Option<usize> {
        self.chunk_size
            .checked_mul(location.chunk_id)?
            .checked_add(location.local_index)
    }
}

/// Summary of a loaded store for status output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreInfo {
    pub generation: Option<String>,
    pub model_id: String,
    pub created_at: String,
    pub total_keywords: usize,
    pub chunks: usize,
    pub embedding_dimensions: usize,
    pub chunk_size: usize,
    pub corpus_checksum: Option<String>,
    pub renormalized_vectors: usize,
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub generation: String,
    pub store_dir: String,
    pub model_id: String,
    pub total_keywords: usize,
    pub chunks: usize,
    pub embedding_dimensions: usize,
    pub chunk_size: usize,
    pub corpus_checksum: Option<String>,
    pub pruned_generations: Vec<String>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_file_name() {
        assert_eq!(chunk_file_name(0), "chunk_000.bin");
        assert_eq!(chunk_file_name(42), "chunk_042.bin");
        assert_eq!(chunk_file_name(1234), "chunk_1234.bin");
    }

    #[test]
    fn test_chunk_byte_len() {
        let chunk = ChunkInfo {
            chunk_id: 0,
            start_index: 0,
            end_index: 1999,
            keyword_count: 2000,
            file_path: chunk_file_name(0),
        };
        assert_eq!(chunk.byte_len(384), Some(2000 * 384 * 4));
        assert_eq!(chunk.byte_len(1 << 62), None);
    }

    #[test]
    fn test_global_position() {
        let index = StoreIndex {
            version: "stub".to_string(),
            format_version: STORE_FORMAT_VERSION,
            created_at: String::new(),
            total_keywords: 0,
            embedding_dimensions: 4,
            chunk_size: 2000,
            corpus_checksum: None,
            chunks: vec![],
            keywords: vec![],
        };
        let location = KeywordLocation {
            keyword: "x".to_string(),
            chunk_id: 2,
            local_index: 7,
        };
        assert_eq!(index.global_position(&location), Some(4007));

        let far = KeywordLocation {
            chunk_id: usize::MAX,
            ..location
        };
        assert_eq!(index.global_position(&far), None);
    }
}

//! Read-only chunked vector store.
//!
//! The whole store is validated and loaded into memory once; afterwards it is
//! immutable and can be shared across concurrent queries without locking.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::generations::{CURRENT_FILE, DataDir};
use crate::error::StoreLoadError;
use crate::models::{
    CHUNKS_DIR, ChunkInfo, DEFAULT_NORMALIZATION_TOLERANCE, KeywordRecord,
    MAX_EMBEDDING_DIMENSIONS, METADATA_FILE, RECORDS_FILE, STORE_FORMAT_VERSION, StoreIndex,
    StoreInfo,
};
use crate::utils::{f32s_from_le_bytes, l2_norm};

const MIN_VECTOR_NORM: f32 = 1e-12;

/// One chunk file held in memory.
#[derive(Debug)]
pub struct Chunk {
    info: ChunkInfo,
    dimension: usize,
    vectors: Vec<f32>,
}

impl Chunk {
    pub fn info(&self) -> &ChunkInfo {
        &self.info
    }

    /// Corpus position of the first vector.
    pub fn start_index(&self) -> usize {
        self.info.start_index
    }

    pub fn len(&self) -> usize {
        self.info.keyword_count
    }

    pub fn is_empty(&self) -> bool {
        self.info.keyword_count == 0
    }

    pub fn vector(&self, local_index: usize) -> Option<&[f32]> {
        let start = local_index.checked_mul(self.dimension)?;
        self.vectors.get(start..start + self.dimension)
    }

    /// Vectors in local order.
    pub fn vectors(&self) -> std::slice::ChunksExact<'_, f32> {
        self.vectors.chunks_exact(self.dimension)
    }
}

/// A keyword as yielded by [`ChunkedVectorStore::iter`].
#[derive(Debug, Clone, Copy)]
pub struct StoreEntry<'a> {
    pub position: usize,
    pub keyword: &'a str,
    pub vector: &'a [f32],
    pub record: &'a KeywordRecord,
}

#[derive(Debug)]
pub struct ChunkedVectorStore {
    dir: PathBuf,
    generation: Option<String>,
    index: StoreIndex,
    chunks: Vec<Chunk>,
    records: Vec<KeywordRecord>,
    positions: HashMap<String, usize>,
    renormalized: usize,
}

impl ChunkedVectorStore {
    /// Load the generation `CURRENT` points at.
    pub fn open_current(data_dir: &DataDir, tolerance: f32) -> Result<Self, StoreLoadError> {
        let generation = data_dir
            .current()
            .map_err(|source| StoreLoadError::Io {
                path: data_dir.root().join(CURRENT_FILE),
                source,
            })?
            .ok_or_else(|| StoreLoadError::NoActiveStore(data_dir.root().to_path_buf()))?;

        let mut store = Self::open_with_tolerance(&data_dir.generation_path(&generation), tolerance)?;
        store.generation = Some(generation);
        Ok(store)
    }

    pub fn open(dir: &Path) -> Result<Self, StoreLoadError> {
        Self::open_with_tolerance(dir, DEFAULT_NORMALIZATION_TOLERANCE)
    }

    /// Load and validate a store directory. Vectors whose norm is more than
    /// `tolerance` away from 1 are re-normalized.
    pub fn open_with_tolerance(dir: &Path, tolerance: f32) -> Result<Self, StoreLoadError> {
        let index: StoreIndex = read_json(&dir.join(METADATA_FILE))?;
        validate_index(&index)?;

        let records: Vec<KeywordRecord> = read_json(&dir.join(RECORDS_FILE))?;
        if records.len() != index.total_keywords {
            return Err(StoreLoadError::RecordMismatch(format!(
                "{} records for {} indexed keywords",
                records.len(),
                index.total_keywords
            )));
        }
        for (position, (record, location)) in records.iter().zip(&index.keywords).enumerate() {
            if record.keyword != location.keyword {
                return Err(StoreLoadError::RecordMismatch(format!(
                    "position {position}: record '{}' but index '{}'",
                    record.keyword, location.keyword
                )));
            }
        }

        let dimension = index.embedding_dimensions;
        let chunks_dir = dir.join(CHUNKS_DIR);
        let mut chunks = Vec::with_capacity(index.chunks.len());
        let mut renormalized = 0usize;

        for info in &index.chunks {
            let expected = info.byte_len(dimension).ok_or_else(|| {
                StoreLoadError::MalformedIndex(format!("chunk {} is too large", info.chunk_id))
            })?;
            let mut vectors = read_chunk(&chunks_dir.join(&info.file_path), expected)?;

            for (local, vector) in vectors.chunks_exact_mut(dimension).enumerate() {
                let keyword = || records[info.start_index + local].keyword.clone();
                if vector.iter().any(|x| !x.is_finite()) {
                    return Err(StoreLoadError::CorruptVector {
                        keyword: keyword(),
                        reason: "non-finite component".to_string(),
                    });
                }
                let norm = l2_norm(vector);
                if norm <= MIN_VECTOR_NORM {
                    return Err(StoreLoadError::CorruptVector {
                        keyword: keyword(),
                        reason: "zero norm".to_string(),
                    });
                }
                if (norm - 1.0).abs() > tolerance {
                    vector.iter_mut().for_each(|x| *x /= norm);
                    renormalized += 1;
                }
            }

            chunks.push(Chunk {
                info: info.clone(),
                dimension,
                vectors,
            });
        }

        if renormalized > 0 {
            warn!(count = renormalized, tolerance, "re-normalized drifted vectors");
        }

        let positions = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.keyword.clone(), i))
            .collect();

        info!(
            path = %dir.display(),
            model = %index.version,
            keywords = index.total_keywords,
            chunks = chunks.len(),
            dimension,
            "vector store loaded"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            generation: None,
            index,
            chunks,
            records,
            positions,
            renormalized,
        })
    }

    pub fn vector_of(&self, keyword: &str) -> Option<&[f32]> {
        self.entry(*self.positions.get(keyword)?).map(|e| e.vector)
    }

    pub fn record_of(&self, keyword: &str) -> Option<&KeywordRecord> {
        self.positions.get(keyword).map(|&i| &self.records[i])
    }

    /// Entry at a global corpus position.
    pub fn entry(&self, position: usize) -> Option<StoreEntry<'_>> {
        let record = self.records.get(position)?;
        let chunk = self.chunks.get(position / self.index.chunk_size)?;
        let vector = chunk.vector(position - chunk.start_index())?;
        Some(StoreEntry {
            position,
            keyword: &record.keyword,
            vector,
            record,
        })
    }

    /// Every keyword in corpus order. Each call starts a fresh pass.
    pub fn iter(&self) -> impl Iterator<Item = StoreEntry<'_>> + '_ {
        self.chunks.iter().flat_map(move |chunk| self.chunk_entries(chunk))
    }

    /// Entries of one chunk, in corpus order.
    pub fn chunk_entries<'a>(&'a self, chunk: &'a Chunk) -> impl Iterator<Item = StoreEntry<'a>> + 'a {
        chunk.vectors().enumerate().map(move |(local, vector)| {
            let position = chunk.start_index() + local;
            let record = &self.records[position];
            StoreEntry {
                position,
                keyword: &record.keyword,
                vector,
                record,
            }
        })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn records(&self) -> &[KeywordRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.embedding_dimensions
    }

    pub fn model_id(&self) -> &str {
        self.index.model_id()
    }

    pub fn index(&self) -> &StoreIndex {
        &self.index
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn info(&self) -> StoreInfo {
        StoreInfo {
            generation: self.generation.clone(),
            model_id: self.index.version.clone(),
            created_at: self.index.created_at.clone(),
            total_keywords: self.index.total_keywords,
            chunks: self.chunks.len(),
            embedding_dimensions: self.index.embedding_dimensions,
            chunk_size: self.index.chunk_size,
            corpus_checksum: self.index.corpus_checksum.clone(),
            renormalized_vectors: self.renormalized,
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreLoadError> {
    let bytes = fs::read(path).map_err(|source| StoreLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| StoreLoadError::MalformedIndex(format!("{}: {e}", path.display())))
}

fn read_chunk(path: &Path, expected: u64) -> Result<Vec<f32>, StoreLoadError> {
    let actual = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StoreLoadError::MissingChunk(path.to_path_buf()));
        }
        Err(source) => {
            return Err(StoreLoadError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if actual != expected {
        return Err(StoreLoadError::ChunkSizeMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }

    let bytes = fs::read(path).map_err(|source| StoreLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.len() as u64 != expected {
        return Err(StoreLoadError::ChunkSizeMismatch {
            path: path.to_path_buf(),
            expected,
            actual: bytes.len() as u64,
        });
    }
    Ok(f32s_from_le_bytes(&bytes))
}

/// Structural checks on the index before any chunk is read.
fn validate_index(index: &StoreIndex) -> Result<(), StoreLoadError> {
    let malformed = |msg: String| Err(StoreLoadError::MalformedIndex(msg));

    if index.format_version != STORE_FORMAT_VERSION {
        return malformed(format!(
            "unsupported format version {} (expected {STORE_FORMAT_VERSION})",
            index.format_version
        ));
    }
    if index.embedding_dimensions == 0 || index.chunk_size == 0 {
        return malformed("dimension and chunk size must be positive".to_string());
    }
    if index.embedding_dimensions > MAX_EMBEDDING_DIMENSIONS {
        return malformed(format!(
            "embedding dimension {} exceeds {MAX_EMBEDDING_DIMENSIONS}",
            index.embedding_dimensions
        ));
    }

    let last = index.chunks.len().saturating_sub(1);
    let mut next_start = 0usize;
    for (i, chunk) in index.chunks.iter().enumerate() {
        if chunk.chunk_id != i {
            return malformed(format!("chunk {i} has id {}", chunk.chunk_id));
        }
        if chunk.start_index != next_start {
            return malformed(format!(
                "chunk {i} starts at {} but previous chunk ended at {next_start}",
                chunk.start_index
            ));
        }
        if chunk.keyword_count == 0 || chunk.keyword_count > index.chunk_size {
            return malformed(format!(
                "chunk {i} holds {} keywords (chunk size {})",
                chunk.keyword_count, index.chunk_size
            ));
        }
        if i != last && chunk.keyword_count != index.chunk_size {
            return malformed(format!("chunk {i} is not full but is not the last chunk"));
        }
        if chunk.start_index.checked_add(chunk.keyword_count - 1) != Some(chunk.end_index) {
            return malformed(format!("chunk {i} range does not match its count"));
        }
        if chunk.file_path.contains(['/', '\\']) || chunk.file_path.starts_with('.') {
            return malformed(format!("chunk {i} has invalid file name {}", chunk.file_path));
        }
        if chunk.byte_len(index.embedding_dimensions).is_none() {
            return malformed(format!("chunk {i} is too large"));
        }
        next_start = match next_start.checked_add(chunk.keyword_count) {
            Some(n) => n,
            None => return malformed(format!("chunk {i} overflows the corpus range")),
        };
    }
    if next_start != index.total_keywords {
        return malformed(format!(
            "chunks hold {next_start} keywords but total_keywords is {}",
            index.total_keywords
        ));
    }
    if index.keywords.len() != index.total_keywords {
        return malformed(format!(
            "{} keyword entries for total_keywords {}",
            index.keywords.len(),
            index.total_keywords
        ));
    }

    let mut seen = HashMap::with_capacity(index.keywords.len());
    for (position, location) in index.keywords.iter().enumerate() {
        let Some(chunk) = index.chunks.get(location.chunk_id) else {
            return malformed(format!("'{}' references missing chunk", location.keyword));
        };
        if location.local_index >= chunk.keyword_count
            || chunk.start_index + location.local_index != position
        {
            return malformed(format!("'{}' is out of corpus order", location.keyword));
        }
        if seen.insert(location.keyword.as_str(), position).is_some() {
            return malformed(format!("duplicate keyword '{}'", location.keyword));
        }
    }
    Ok(())
}

//! Offline vector store builder.
//!
//! Encodes every corpus keyword in input order, L2-normalizes it and packs the
//! vectors into fixed-capacity chunk files. The store index is written last,
//! and a generation only becomes visible once `CURRENT` is swapped to it.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::corpus::Corpus;
use super::embedding::Encoder;
use super::generations::DataDir;
use crate::error::{BuildError, EmbeddingError};
use crate::models::{
    BuildReport, CHUNKS_DIR, ChunkInfo, DEFAULT_CHUNK_SIZE, DEFAULT_KEEP_GENERATIONS,
    KeywordLocation, KeywordRecord, METADATA_FILE, RECORDS_FILE, STORE_FORMAT_VERSION,
    StoreIndex, chunk_file_name,
};
use crate::utils::{f32s_to_le_bytes, normalize_in_place, sync_dir, write_atomic};

/// Vectors with a norm at or below this are rejected.
const MIN_VECTOR_NORM: f32 = 1e-12;

const DEFAULT_BATCH_SIZE: usize = 32;

/// Called with `(encoded, total)` after every encoder batch.
pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

pub struct StoreBuilder {
    encoder: Arc<dyn Encoder>,
    chunk_size: usize,
    batch_size: usize,
    keep_generations: usize,
    progress: Option<Arc<ProgressFn>>,
}

impl StoreBuilder {
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self {
            encoder,
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            keep_generations: DEFAULT_KEEP_GENERATIONS as usize,
            progress: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_keep_generations(mut self, keep: usize) -> Self {
        self.keep_generations = keep.max(1);
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Build a new generation under `data_dir` and make it the active store.
    ///
    /// Holds the build lock for the whole run. On any failure the partial
    /// generation is removed and the previously active one stays in place.
    pub async fn build(&self, corpus: &Corpus, data_dir: &DataDir) -> Result<BuildReport, BuildError> {
        let start = Instant::now();
        let _lock = data_dir.lock()?;

        let (generation, store_dir) = data_dir.allocate(Some(&corpus.checksum))?;
        info!(
            generation = %generation,
            keywords = corpus.len(),
            chunk_size = self.chunk_size,
            model = self.encoder.model_id(),
            "building store"
        );

        let index = match self.write_store(corpus, &store_dir).await {
            Ok(index) => index,
            Err(e) => {
                discard(&store_dir);
                return Err(e);
            }
        };

        if let Err(e) = data_dir.publish(&generation) {
            discard(&store_dir);
            return Err(e.into());
        }

        let pruned_generations = match data_dir.prune(self.keep_generations) {
            Ok(pruned) => pruned,
            Err(e) => {
                warn!(error = %e, "failed to prune old generations");
                Vec::new()
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            generation = %generation,
            keywords = index.total_keywords,
            chunks = index.chunks.len(),
            duration_ms,
            "build complete"
        );

        Ok(BuildReport {
            generation,
            store_dir: store_dir.display().to_string(),
            model_id: index.version,
            total_keywords: index.total_keywords,
            chunks: index.chunks.len(),
            embedding_dimensions: index.embedding_dimensions,
            chunk_size: index.chunk_size,
            corpus_checksum: index.corpus_checksum,
            pruned_generations,
            duration_ms,
        })
    }

    /// Write a complete store into `out_dir`: chunk files, then the keyword
    /// records, then the index.
    pub async fn write_store(&self, corpus: &Corpus, out_dir: &Path) -> Result<StoreIndex, BuildError> {
        let dimension = self.encoder.dimension();
        let chunks_dir = out_dir.join(CHUNKS_DIR);
        fs::create_dir_all(&chunks_dir)?;

        let total = corpus.len();
        let mut chunks: Vec<ChunkInfo> = Vec::with_capacity(total.div_ceil(self.chunk_size));
        let mut locations = Vec::with_capacity(total);
        let mut buffer: Vec<f32> = Vec::with_capacity(self.chunk_size.min(total) * dimension);
        let mut buffered = 0usize;
        let mut encoded = 0usize;

        for batch in corpus.records.chunks(self.batch_size) {
            let vectors = self.encode_batch(batch).await?;

            for (record, mut vector) in batch.iter().zip(vectors) {
                if vector.len() != dimension {
                    return Err(BuildError::DimensionMismatch {
                        keyword: record.keyword.clone(),
                        expected: dimension,
                        actual: vector.len(),
                    });
                }
                if normalize_in_place(&mut vector, MIN_VECTOR_NORM).is_none() {
                    return Err(BuildError::ZeroVector(record.keyword.clone()));
                }

                locations.push(KeywordLocation {
                    keyword: record.keyword.clone(),
                    chunk_id: chunks.len(),
                    local_index: buffered,
                });
                buffer.extend_from_slice(&vector);
                buffered += 1;

                if buffered == self.chunk_size {
                    let start_index = encoded + 1 - buffered;
                    let chunk = flush_chunk(&chunks_dir, chunks.len(), start_index, &buffer, buffered)?;
                    chunks.push(chunk);
                    buffer.clear();
                    buffered = 0;
                }
                encoded += 1;
            }

            if let Some(ref progress) = self.progress {
                progress(encoded, total);
            }
        }

        if buffered > 0 {
            let chunk = flush_chunk(&chunks_dir, chunks.len(), encoded - buffered, &buffer, buffered)?;
            chunks.push(chunk);
        }
        sync_dir(&chunks_dir)?;

        let records = serde_json::to_vec(&corpus.records)?;
        write_atomic(&out_dir.join(RECORDS_FILE), &records)?;

        let index = StoreIndex {
            version: self.encoder.model_id().to_string(),
            format_version: STORE_FORMAT_VERSION,
            created_at: Utc::now().to_rfc3339(),
            total_keywords: encoded,
            embedding_dimensions: dimension,
            chunk_size: self.chunk_size,
            corpus_checksum: Some(corpus.checksum.clone()),
            chunks,
            keywords: locations,
        };
        let metadata = serde_json::to_vec_pretty(&index)?;
        write_atomic(&out_dir.join(METADATA_FILE), &metadata)?;

        Ok(index)
    }

    async fn encode_batch(&self, batch: &[KeywordRecord]) -> Result<Vec<Vec<f32>>, BuildError> {
        let texts: Vec<String> = batch.iter().map(|r| r.keyword.clone()).collect();
        let first = texts.first().cloned().unwrap_or_default();

        let vectors = self
            .encoder
            .encode_batch(&texts)
            .await
            .map_err(|source| BuildError::Encoder {
                keyword: match source {
                    EmbeddingError::UnknownText(ref text) => text.clone(),
                    _ => first.clone(),
                },
                source,
            })?;

        if vectors.len() != texts.len() {
            return Err(BuildError::Encoder {
                keyword: first,
                source: EmbeddingError::InvalidData(format!(
                    "expected {} vectors, got {}",
                    texts.len(),
                    vectors.len()
                )),
            });
        }
        Ok(vectors)
    }
}

fn flush_chunk(
    chunks_dir: &Path,
    chunk_id: usize,
    start_index: usize,
    vectors: &[f32],
    count: usize,
) -> Result<ChunkInfo, BuildError> {
    let file_path = chunk_file_name(chunk_id);
    let mut file = File::create(chunks_dir.join(&file_path))?;
    file.write_all(&f32s_to_le_bytes(vectors))?;
    file.sync_all()?;

    debug!(chunk_id, count, "chunk written");
    Ok(ChunkInfo {
        chunk_id,
        start_index,
        end_index: start_index + count - 1,
        keyword_count: count,
        file_path,
    })
}

fn discard(store_dir: &Path) {
    if let Err(e) = fs::remove_dir_all(store_dir) {
        warn!(path = %store_dir.display(), error = %e, "failed to remove partial generation");
    }
}

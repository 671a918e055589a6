use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::{Ix2, Ix3};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};
use tracing::{debug, info};

use super::Encoder;
use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::utils::normalize_in_place;

/// Sentence-transformer model (BERT family) run through ONNX Runtime with
/// attention-masked mean pooling.
pub struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
}

impl OnnxModel {
    pub fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, EmbeddingError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let max_tokens = config.max_tokens as usize;

        if !model_path.exists() {
            return Err(EmbeddingError::ModelNotFound(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| EmbeddingError::LoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| EmbeddingError::LoadError(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e: ort::Error| EmbeddingError::LoadError(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| EmbeddingError::LoadError(e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        info!(
            model = %model_path.display(),
            dimension = config.dimension,
            "embedding model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension: config.dimension as usize,
        })
    }

    /// Embed a batch; every output row is L2-normalized.
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch_size = encodings.len();

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();
            for j in 0..ids.len() {
                input_ids[i * max_len + j] = i64::from(ids[j]);
                attention_mask[i * max_len + j] = i64::from(mask[j]);
                token_type_ids[i * max_len + j] = i64::from(types[j]);
            }
        }

        let input_ids_tensor = Tensor::from_array(([batch_size, max_len], input_ids))
            .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;
        let attention_mask_tensor =
            Tensor::from_array(([batch_size, max_len], attention_mask.clone()))
                .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;
        let token_type_ids_tensor = Tensor::from_array(([batch_size, max_len], token_type_ids))
            .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::InferenceError("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![
                input_ids_tensor,
                attention_mask_tensor,
                token_type_ids_tensor
            ])
            .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;

        let output_array = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;
        let shape = output_array.shape().to_vec();

        let mut embeddings = if let Ok(hidden) = output_array.view().into_dimensionality::<Ix3>() {
            // Token embeddings: mean over unmasked positions.
            self.check_dimension(shape[2])?;
            (0..batch_size)
                .map(|i| {
                    let mut pooled = vec![0f32; self.dimension];
                    let mut count = 0f32;
                    for t in 0..max_len {
                        if attention_mask[i * max_len + t] == 0 {
                            continue;
                        }
                        count += 1.0;
                        for (d, slot) in pooled.iter_mut().enumerate() {
                            *slot += hidden[[i, t, d]];
                        }
                    }
                    if count > 0.0 {
                        pooled.iter_mut().for_each(|x| *x /= count);
                    }
                    pooled
                })
                .collect::<Vec<_>>()
        } else if let Ok(pooled) = output_array.view().into_dimensionality::<Ix2>() {
            self.check_dimension(shape[1])?;
            (0..batch_size)
                .map(|i| (0..self.dimension).map(|d| pooled[[i, d]]).collect())
                .collect::<Vec<_>>()
        } else {
            return Err(EmbeddingError::InferenceError(format!(
                "unexpected output shape: {:?}",
                shape
            )));
        };

        let degenerate = normalize_rows(&mut embeddings);

        debug!(batch_size, max_len, degenerate, "embedded batch");
        Ok(embeddings)
    }

    fn check_dimension(&self, actual: usize) -> Result<(), EmbeddingError> {
        if actual != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// [`Encoder`] backed by an [`OnnxModel`]; inference runs on the blocking pool.
#[derive(Clone)]
pub struct OnnxEncoder {
    model: Arc<OnnxModel>,
    model_id: String,
}

impl OnnxEncoder {
    pub fn new(model: OnnxModel, model_id: impl Into<String>) -> Self {
        Self {
            model: Arc::new(model),
            model_id: model_id.into(),
        }
    }

    pub fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, EmbeddingError> {
        let model = OnnxModel::load(config, model_dir)?;
        Ok(Self::new(model, config.model_id.clone()))
    }
}

#[async_trait]
impl Encoder for OnnxEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.model.dimension()
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || model.embed(&texts))
            .await
            .map_err(|e| EmbeddingError::InferenceError(e.to_string()))?
    }
}

/// Unit-normalize each pooled row. Zero or non-finite rows are left as they
/// are for the caller to reject; returns how many were left.
fn normalize_rows(rows: &mut [Vec<f32>]) -> usize {
    rows.iter_mut()
        .map(|row| normalize_in_place(row, 0.0))
        .filter(Option::is_none)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_rows_leaves_zero_rows_untouched() {
        let mut rows = vec![vec![3.0, 4.0], vec![0.0, 0.0], vec![f32::NAN, 1.0]];
        assert_eq!(normalize_rows(&mut rows), 2);
        assert_eq!(rows[0], vec![0.6, 0.8]);
        assert_eq!(rows[1], vec![0.0, 0.0]);
        assert!(rows[2][0].is_nan());
    }

    #[test]
    fn test_load_missing_model() {
        let dir = TempDir::new().unwrap();
        let result = OnnxModel::load(&EmbeddingConfig::default(), dir.path());
        assert!(matches!(result, Err(EmbeddingError::ModelNotFound(_))));
    }
}

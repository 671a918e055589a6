use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use super::Encoder;
use crate::error::EmbeddingError;
use crate::utils::f32s_from_le_bytes;

/// JSON array of keyword strings, row order of [`EMBEDDINGS_FILE`].
pub const KEYWORDS_FILE: &str = "keywords_list.json";

/// Raw little-endian f32 matrix, `keywords × dimension`, no header.
pub const EMBEDDINGS_FILE: &str = "embeddings.bin";

/// Encoder that answers from an exported embedding dump instead of a model.
///
/// Only texts present in the dump can be encoded; anything else is
/// [`EmbeddingError::UnknownText`].
pub struct PrecomputedEncoder {
    model_id: String,
    dimension: usize,
    positions: HashMap<String, usize>,
    vectors: Vec<f32>,
}

impl PrecomputedEncoder {
    pub fn load(
        dir: &Path,
        model_id: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, EmbeddingError> {
        let keywords_path = dir.join(KEYWORDS_FILE);
        let embeddings_path = dir.join(EMBEDDINGS_FILE);

        let keywords_json = std::fs::read_to_string(&keywords_path).map_err(|e| {
            EmbeddingError::ModelNotFound(format!("{}: {e}", keywords_path.display()))
        })?;
        let keywords: Vec<String> = serde_json::from_str(&keywords_json)
            .map_err(|e| EmbeddingError::InvalidData(format!("{KEYWORDS_FILE}: {e}")))?;

        let bytes = std::fs::read(&embeddings_path).map_err(|e| {
            EmbeddingError::ModelNotFound(format!("{}: {e}", embeddings_path.display()))
        })?;

        let encoder = Self::from_parts(model_id, dimension, keywords, f32s_from_le_bytes(&bytes))
            .map_err(|e| match e {
                EmbeddingError::InvalidData(msg) => {
                    EmbeddingError::InvalidData(format!("{EMBEDDINGS_FILE}: {msg}"))
                }
                other => other,
            })?;
        if bytes.len() != encoder.vectors.len() * 4 {
            return Err(EmbeddingError::InvalidData(format!(
                "{EMBEDDINGS_FILE}: length {} is not a multiple of 4",
                bytes.len()
            )));
        }

        info!(
            keywords = encoder.positions.len(),
            dimension, "loaded precomputed embeddings"
        );
        Ok(encoder)
    }

    pub fn from_parts(
        model_id: impl Into<String>,
        dimension: usize,
        keywords: Vec<String>,
        vectors: Vec<f32>,
    ) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InvalidData(
                "dimension must be positive".to_string(),
            ));
        }
        let expected = keywords.len() * dimension;
        if vectors.len() != expected {
            return Err(EmbeddingError::InvalidData(format!(
                "expected {} floats for {} keywords, found {}",
                expected,
                keywords.len(),
                vectors.len()
            )));
        }

        let mut positions = HashMap::with_capacity(keywords.len());
        for (i, keyword) in keywords.into_iter().enumerate() {
            // First occurrence wins; the builder rejects duplicate corpus rows anyway.
            positions.entry(keyword).or_insert(i);
        }

        Ok(Self {
            model_id: model_id.into(),
            dimension,
            positions,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[async_trait]
impl Encoder for PrecomputedEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts
            .iter()
            .map(|text| {
                let row = self
                    .positions
                    .get(text)
                    .ok_or_else(|| EmbeddingError::UnknownText(text.clone()))?;
                let start = row * self.dimension;
                Ok(self.vectors[start..start + self.dimension].to_vec())
            })
            .collect()
    }
}

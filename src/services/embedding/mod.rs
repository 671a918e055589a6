//! Text encoders.
//!
//! The matcher and the store builder never talk to a concrete model; they take
//! an [`Encoder`] so the ONNX model, a precomputed embedding dump, or a test
//! stub can be swapped in.

mod onnx;
mod precomputed;

pub use onnx::{OnnxEncoder, OnnxModel};
pub use precomputed::{EMBEDDINGS_FILE, KEYWORDS_FILE, PrecomputedEncoder};

use async_trait::async_trait;

use crate::error::EmbeddingError;

/// `text -> vector[dimension]`, deterministic for a given model.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Identifier recorded in the store index; a store only serves queries
    /// encoded by the same model.
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Encode texts in order. The output has one vector per input.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.encode_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidData("empty embedding response".to_string()))
    }
}

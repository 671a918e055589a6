mod build;
mod config;
mod search;
mod status;

pub use build::BuildArgs;
pub use config::ConfigCommand;
pub use search::SearchArgs;

pub use build::handle_build;
pub use config::handle_config;
pub use search::handle_search;
pub use status::handle_status;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::error::AppError;
use crate::models::Config;
use crate::services::{ChunkedVectorStore, DataDir, Encoder, OnnxEncoder};

/// Load the configured ONNX model.
fn load_model_encoder(config: &Config) -> Result<Arc<dyn Encoder>> {
    let model_dir = config.model_dir()?;
    let encoder = OnnxEncoder::load(&config.embedding, &model_dir)
        .map_err(AppError::from)
        .with_context(|| format!("failed to load embedding model from {}", model_dir.display()))?;
    Ok(Arc::new(encoder))
}

/// Open and validate the active store generation.
fn open_active_store(config: &Config) -> Result<Arc<ChunkedVectorStore>> {
    let data_dir = DataDir::new(config.data_dir()?);
    let store = ChunkedVectorStore::open_current(&data_dir, config.store.normalization_tolerance)
        .map_err(AppError::from)?;
    Ok(Arc::new(store))
}

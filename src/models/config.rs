use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::search::OutputFormat;
use super::store::DEFAULT_CHUNK_SIZE;
use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_KEEP_GENERATIONS: u32 = 2;
pub const DEFAULT_NORMALIZATION_TOLERANCE: f32 = 1e-4;

const APP_DIR: &str = "kwscout";

const ENV_DATA_DIR: &str = "KWSCOUT_DATA_DIR";
const ENV_MODEL_PATH: &str = "KWSCOUT_MODEL_PATH";
const ENV_MODEL_ID: &str = "KWSCOUT_MODEL_ID";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join("config.toml"))
    }

    pub fn default_data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join(APP_DIR))
    }

    /// Load the global config file (if any), then apply `.env` and environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR)
            && !dir.trim().is_empty()
        {
            self.store.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(path) = std::env::var(ENV_MODEL_PATH)
            && !path.trim().is_empty()
        {
            self.embedding.model_path = Some(PathBuf::from(path));
        }
        if let Ok(model_id) = std::env::var(ENV_MODEL_ID)
            && !model_id.trim().is_empty()
        {
            self.embedding.model_id = model_id;
        }
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path()
            .ok_or_else(|| ConfigError::PathError("could not determine config directory".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be positive".into(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.batch_size must be positive".into(),
            ));
        }
        if self.store.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "store.chunk_size must be positive".into(),
            ));
        }
        self.scoring.validate()
    }

    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        self.store
            .data_dir
            .clone()
            .or_else(Self::default_data_dir)
            .ok_or_else(|| ConfigError::PathError("could not determine data directory".into()))
    }

    /// Directory holding `model.onnx` and `tokenizer.json`.
    pub fn model_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.embedding.model_path {
            return Ok(path.clone());
        }
        Self::default_data_dir()
            .map(|d| d.join("models").join(model_dir_name(&self.embedding.model_id)))
            .ok_or_else(|| ConfigError::PathError("could not determine models directory".into()))
    }
}

fn model_dir_name(model_id: &str) -> String {
    model_id.replace('/', "--")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

fn default_model_id() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_max_tokens() -> u32 {
    256
}

fn default_batch_size() -> u32 {
    32
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            model_path: None,
            dimension: default_dimension(),
            max_tokens: default_max_tokens(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_keep_generations")]
    pub keep_generations: u32,

    #[serde(default = "default_normalization_tolerance")]
    pub normalization_tolerance: f32,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_keep_generations() -> u32 {
    DEFAULT_KEEP_GENERATIONS
}

fn default_normalization_tolerance() -> f32 {
    DEFAULT_NORMALIZATION_TOLERANCE
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            chunk_size: default_chunk_size(),
            keep_generations: default_keep_generations(),
            normalization_tolerance: default_normalization_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    #[serde(default)]
    pub default_format: OutputFormat,
}

fn default_limit() -> u32 {
    50
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_format: OutputFormat::Text,
        }
    }
}

/// Coefficients of the opportunity score.
///
/// Every weight must be non-negative and every scale positive; under those
/// constraints the score never decreases with volume or growth and never
/// increases with competition or CPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_volume_weight")]
    pub volume_weight: f64,

    #[serde(default = "default_growth_weight")]
    pub growth_weight: f64,

    #[serde(default = "default_competition_weight")]
    pub competition_weight: f64,

    #[serde(default = "default_cpc_weight")]
    pub cpc_weight: f64,

    /// Monthly volume at which the volume term saturates.
    #[serde(default = "default_volume_saturation")]
    pub volume_saturation: f64,

    /// Growth percentage mapped to roughly 88% of the growth term.
    #[serde(default = "default_growth_scale")]
    pub growth_scale: f64,

    /// CPC at which the cost term halves.
    #[serde(default = "default_cpc_scale")]
    pub cpc_scale: f64,
}

fn default_volume_weight() -> f64 {
    0.35
}

fn default_growth_weight() -> f64 {
    0.25
}

fn default_competition_weight() -> f64 {
    0.25
}

fn default_cpc_weight() -> f64 {
    0.15
}

fn default_volume_saturation() -> f64 {
    1_000_000.0
}

fn default_growth_scale() -> f64 {
    100.0
}

fn default_cpc_scale() -> f64 {
    5.0
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            volume_weight: default_volume_weight(),
            growth_weight: default_growth_weight(),
            competition_weight: default_competition_weight(),
            cpc_weight: default_cpc_weight(),
            volume_saturation: default_volume_saturation(),
            growth_scale: default_growth_scale(),
            cpc_scale: default_cpc_scale(),
        }
    }
}

impl ScoringConfig {
    pub fn total_weight(&self) -> f64 {
        self.volume_weight + self.growth_weight + self.competition_weight + self.cpc_weight
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("volume_weight", self.volume_weight),
            ("growth_weight", self.growth_weight),
            ("competition_weight", self.competition_weight),
            ("cpc_weight", self.cpc_weight),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "scoring.{name} must be a non-negative number"
                )));
            }
        }
        if self.total_weight() <= 0.0 {
            return Err(ConfigError::ValidationError(
                "scoring weights must not all be zero".into(),
            ));
        }

        let scales = [
            ("volume_saturation", self.volume_saturation),
            ("growth_scale", self.growth_scale),
            ("cpc_scale", self.cpc_scale),
        ];
        for (name, scale) in scales {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "scoring.{name} must be positive"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.embedding.model_id, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.store.chunk_size, 2000);
        assert_eq!(config.search.default_limit, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.is_some());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[store]\nchunk_size = 500\n").unwrap();
        assert_eq!(config.store.chunk_size, 500);
        assert_eq!(config.store.keep_generations, DEFAULT_KEEP_GENERATIONS);
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.scoring, ScoringConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = Config::default();
        config.store.chunk_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_negative_weight() {
        let mut config = Config::default();
        config.scoring.competition_weight = -0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scoring.cpc_scale = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_dir_from_model_id() {
        let config = Config::default();
        if let Ok(dir) = config.model_dir() {
            assert!(dir.ends_with("sentence-transformers--all-MiniLM-L6-v2"));
        }
    }

    #[test]
    fn test_explicit_data_dir() {
        let mut config = Config::default();
        config.store.data_dir = Some(PathBuf::from("/srv/kwscout"));
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/srv/kwscout"));
    }
}

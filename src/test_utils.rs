//! Deterministic encoders and sample records shared by unit tests.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::models::{KeywordRecord, MonthKey};
use crate::services::Encoder;

/// Axes of [`MapEncoder::scenario`]: edit, video, photo, tax, online.
pub const SCENARIO_DIM: usize = 5;

pub fn month(s: &str) -> MonthKey {
    s.parse().unwrap()
}

/// Encoder answering from a fixed table of hand-written vectors.
pub struct MapEncoder {
    model_id: String,
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl MapEncoder {
    pub fn new(model_id: &str, dimension: usize) -> Self {
        Self {
            model_id: model_id.to_string(),
            dimension,
            vectors: HashMap::new(),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    /// "video editor", "photo editor", "tax software" plus the query
    /// "edit photos online".
    pub fn scenario() -> Self {
        Self::new("stub-map", SCENARIO_DIM)
            .with("video editor", vec![0.6, 0.8, 0.0, 0.0, 0.0])
            .with("photo editor", vec![0.6, 0.0, 0.8, 0.0, 0.0])
            .with("tax software", vec![0.0, 0.0, 0.0, 1.0, 0.0])
            .with("edit photos online", vec![0.5, 0.0, 0.7, 0.0, 0.5])
    }
}

#[async_trait]
impl Encoder for MapEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t)
                    .cloned()
                    .ok_or_else(|| EmbeddingError::UnknownText(t.clone()))
            })
            .collect()
    }
}

/// Character-trigram feature hashing (FNV-1a) into `dimension` buckets.
/// Every input yields a non-zero vector.
pub struct HashingEncoder {
    dimension: usize,
}

impl HashingEncoder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let padded: Vec<char> = format!("  {} ", text.to_lowercase()).chars().collect();
        let mut vector = vec![0f32; self.dimension];
        for window in padded.windows(3) {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for c in window {
                for b in (*c as u32).to_le_bytes() {
                    hash ^= u64::from(b);
                    hash = hash.wrapping_mul(0x0100_0000_01b3);
                }
            }
            vector[(hash % self.dimension as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Encoder for HashingEncoder {
    fn model_id(&self) -> &str {
        "stub-trigram"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}

/// Hashing encoder that fails on one chosen text.
pub struct FailingEncoder {
    inner: HashingEncoder,
    fail_on: String,
}

impl FailingEncoder {
    pub fn new(dimension: usize, fail_on: &str) -> Self {
        Self {
            inner: HashingEncoder::new(dimension),
            fail_on: fail_on.to_string(),
        }
    }
}

#[async_trait]
impl Encoder for FailingEncoder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.iter().any(|t| *t == self.fail_on) {
            return Err(EmbeddingError::InferenceError(format!(
                "refusing to encode '{}'",
                self.fail_on
            )));
        }
        self.inner.encode_batch(texts).await
    }
}

/// The three scenario keywords with a year of volumes each.
pub fn scenario_records() -> Vec<KeywordRecord> {
    let months: Vec<MonthKey> = (1..=12)
        .map(|m| MonthKey::new(2024, m).unwrap())
        .collect();
    vec![
        KeywordRecord::new("video editor")
            .with_volumes(months.iter().map(|&m| (m, 5_000 + 100 * u64::from(m.month()))))
            .with_competition(0.7)
            .with_cpc(2.5)
            .with_top_page_bid(4.0)
            .with_growth(5.0, 20.0),
        KeywordRecord::new("photo editor")
            .with_volumes(months.iter().map(|&m| (m, 8_000)))
            .with_competition(0.4)
            .with_cpc(1.2)
            .with_top_page_bid(2.0)
            .with_growth(0.0, 0.0),
        KeywordRecord::new("tax software")
            .with_volumes(months.iter().map(|&m| (m, 20_000)))
            .with_competition(0.9)
            .with_cpc(9.0),
    ]
}

/// `n` records named `keyword 0000`.., with a single month of volume.
pub fn numbered_records(n: usize) -> Vec<KeywordRecord> {
    (0..n)
        .map(|i| {
            KeywordRecord::new(format!("keyword {i:04}"))
                .with_volumes([(month("2024-01"), (i as u64 + 1) * 10)])
                .with_cpc(i as f64 / 10.0)
        })
        .collect()
}

//! Aggregated metrics over a matched keyword set.

use serde::{Deserialize, Serialize};

use super::keyword::MonthKey;

/// One point of the aggregated monthly trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub month: MonthKey,
    pub volume: u64,
}

/// Growth percentages derived from a trend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthRates {
    pub growth_3m_pct: f64,
    pub growth_yoy_pct: f64,
}

/// Similarity-weighted view over a set of matches. Recomputed per query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub avg_volume: f64,
    pub avg_growth_3m: f64,
    pub avg_growth_yoy: f64,
    pub avg_competition: f64,
    pub avg_cpc: f64,
    pub avg_top_page_bid: f64,
    pub volatility: f64,
    pub trend_strength: f64,
    pub bid_efficiency: f64,
    pub tac: f64,
    pub sac: f64,
    pub opportunity_score: f64,
    pub monthly_trend: Vec<TrendPoint>,
}

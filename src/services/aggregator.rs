//! Similarity-weighted metrics aggregation.
//!
//! Every match is weighted by `similarity²`. Scalar metrics are weighted means
//! that skip missing values; the monthly trend is averaged in square-root space
//! and squared back, which damps high-volume outliers while reproducing a single
//! keyword's volumes exactly.

use std::collections::BTreeSet;

use super::growth::{MIN_POINTS_3M, MIN_POINTS_YOY, growth};
use crate::models::{AggregatedMetrics, KeywordRecord, MatchResult, MonthKey, ScoringConfig, TrendPoint};

#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    scoring: ScoringConfig,
}

impl MetricsAggregator {
    pub fn new(scoring: ScoringConfig) -> Self {
        Self { scoring }
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// Aggregate a match set. An empty set, or one whose weights are all zero,
    /// yields [`AggregatedMetrics::default`].
    pub fn aggregate(&self, matches: &[MatchResult]) -> AggregatedMetrics {
        let weighted: Vec<(f64, &KeywordRecord)> = matches
            .iter()
            .map(|m| (f64::from(m.similarity).powi(2), &m.metrics))
            .collect();

        let total_weight: f64 = weighted.iter().map(|(w, _)| w).sum();
        if weighted.is_empty() || total_weight <= 0.0 {
            return AggregatedMetrics::default();
        }

        let mean = |value: fn(&KeywordRecord) -> Option<f64>| weighted_mean(&weighted, value);

        let avg_volume = mean(KeywordRecord::avg_volume).unwrap_or(0.0);
        let avg_competition = mean(|r| r.competition).unwrap_or(0.0);
        let avg_cpc = mean(|r| r.cpc).unwrap_or(0.0);
        let avg_top_page_bid = mean(|r| r.top_page_bid).unwrap_or(0.0);

        let monthly_trend = sqrt_weighted_trend(&weighted);
        let rates = growth(&monthly_trend);
        let avg_growth_3m = if monthly_trend.len() >= MIN_POINTS_3M {
            rates.growth_3m_pct
        } else {
            mean(|r| r.growth_3m_pct).unwrap_or(0.0)
        };
        let avg_growth_yoy = if monthly_trend.len() >= MIN_POINTS_YOY {
            rates.growth_yoy_pct
        } else {
            mean(|r| r.growth_yoy_pct).unwrap_or(0.0)
        };

        let tac = avg_volume * 12.0 * avg_cpc;
        let sac = tac * (1.0 - avg_competition.clamp(0.0, 1.0));

        AggregatedMetrics {
            avg_volume,
            avg_growth_3m,
            avg_growth_yoy,
            avg_competition,
            avg_cpc,
            avg_top_page_bid,
            volatility: volatility(&monthly_trend),
            trend_strength: trend_strength(&monthly_trend),
            bid_efficiency: avg_volume / (1.0 + avg_top_page_bid),
            tac,
            sac,
            opportunity_score: self.opportunity_score(
                avg_volume,
                avg_growth_3m,
                avg_growth_yoy,
                avg_competition,
                avg_cpc,
            ),
            monthly_trend,
        }
    }

    /// Composite score in `[0, 100]`. Non-decreasing in volume and growth,
    /// non-increasing in competition and CPC.
    pub fn opportunity_score(
        &self,
        volume: f64,
        growth_3m: f64,
        growth_yoy: f64,
        competition: f64,
        cpc: f64,
    ) -> f64 {
        let s = &self.scoring;
        let total = s.total_weight();
        if total <= 0.0 {
            return 0.0;
        }

        let volume_term =
            ((1.0 + volume.max(0.0)).ln() / (1.0 + s.volume_saturation).ln()).clamp(0.0, 1.0);
        let growth_term = 0.5 + 0.5 * ((0.4 * growth_3m + 0.6 * growth_yoy) / s.growth_scale).tanh();
        let competition_term = 1.0 - competition.clamp(0.0, 1.0);
        let cpc_term = 1.0 / (1.0 + cpc.max(0.0) / s.cpc_scale);

        let score = s.volume_weight * volume_term
            + s.growth_weight * growth_term
            + s.competition_weight * competition_term
            + s.cpc_weight * cpc_term;
        (100.0 * score / total).clamp(0.0, 100.0)
    }
}

fn weighted_mean(
    weighted: &[(f64, &KeywordRecord)],
    value: impl Fn(&KeywordRecord) -> Option<f64>,
) -> Option<f64> {
    let (sum, weight) = weighted
        .iter()
        .filter_map(|&(w, record)| value(record).map(|v| (w * v, w)))
        .fold((0.0, 0.0), |(s, t), (wv, w)| (s + wv, t + w));
    (weight > 0.0).then(|| sum / weight)
}

/// `round((Σ w·sqrt(v) / Σ w)²)` per month over the union of months. A match
/// without a value for a month is left out of that month entirely.
fn sqrt_weighted_trend(weighted: &[(f64, &KeywordRecord)]) -> Vec<TrendPoint> {
    let months: BTreeSet<MonthKey> = weighted
        .iter()
        .flat_map(|(_, record)| record.monthly_volume.keys().copied())
        .collect();

    months
        .into_iter()
        .map(|month| {
            let (sum, weight) = weighted
                .iter()
                .filter_map(|&(w, record)| {
                    record
                        .volume_at(&month)
                        .map(|v| (w * (v as f64).sqrt(), w))
                })
                .fold((0.0, 0.0), |(s, t), (wv, w)| (s + wv, t + w));
            let avg_sqrt = if weight > 0.0 { sum / weight } else { 0.0 };
            TrendPoint {
                month,
                volume: (avg_sqrt * avg_sqrt).round() as u64,
            }
        })
        .collect()
}

fn trend_stats(trend: &[TrendPoint]) -> Option<(Vec<f64>, f64)> {
    if trend.len() < 2 {
        return None;
    }
    let values: Vec<f64> = trend.iter().map(|p| p.volume as f64).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (mean > 0.0).then_some((values, mean))
}

/// Coefficient of variation (population standard deviation over mean).
fn volatility(trend: &[TrendPoint]) -> f64 {
    let Some((values, mean)) = trend_stats(trend) else {
        return 0.0;
    };
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt() / mean
}

/// Least-squares slope over the month index, scaled to the whole span and
/// expressed relative to the mean volume.
fn trend_strength(trend: &[TrendPoint]) -> f64 {
    let Some((values, mean)) = trend_stats(trend) else {
        return 0.0;
    };
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let (cov, var) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(cov, var), (i, y)| {
            let dx = i as f64 - x_mean;
            (cov + dx * (y - mean), var + dx * dx)
        });
    let slope = cov / var;
    slope * (n - 1.0) / mean
}

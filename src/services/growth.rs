//! Growth rates over a chronological monthly trend.

use crate::models::{GrowthRates, TrendPoint};

/// Points needed for a 3-month change: the last month and the one 3 before it.
pub const MIN_POINTS_3M: usize = 4;

/// Points needed for a year-over-year change.
pub const MIN_POINTS_YOY: usize = 12;

/// Growth percentages of a trend in ascending month order.
///
/// Windows without enough points, or whose base month has zero volume, yield 0.
/// The trend is not re-sorted; see [`is_chronological`].
pub fn growth(trend: &[TrendPoint]) -> GrowthRates {
    let n = trend.len();
    let Some(last) = trend.last() else {
        return GrowthRates::default();
    };

    let growth_3m_pct = if n >= MIN_POINTS_3M {
        percent_change(trend[n - MIN_POINTS_3M].volume, last.volume)
    } else {
        0.0
    };

    let growth_yoy_pct = if n >= MIN_POINTS_YOY {
        percent_change(trend[0].volume, last.volume)
    } else {
        0.0
    };

    GrowthRates {
        growth_3m_pct,
        growth_yoy_pct,
    }
}

fn percent_change(from: u64, to: u64) -> f64 {
    if from == 0 {
        return 0.0;
    }
    (to as f64 - from as f64) / from as f64 * 100.0
}

/// Strictly ascending months.
pub fn is_chronological(trend: &[TrendPoint]) -> bool {
    trend.windows(2).all(|w| w[0].month < w[1].month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MonthKey;

    fn trend(volumes: &[u64]) -> Vec<TrendPoint> {
        volumes
            .iter()
            .enumerate()
            .map(|(i, &volume)| TrendPoint {
                month: MonthKey::new(2023 + (i / 12) as i32, (i % 12) as u32 + 1).unwrap(),
                volume,
            })
            .collect()
    }

    #[test]
    fn test_short_trends_have_no_growth() {
        assert_eq!(growth(&[]), GrowthRates::default());
        assert_eq!(growth(&trend(&[10, 20, 30])), GrowthRates::default());
        let rates = growth(&trend(&[10; 11]));
        assert_eq!(rates.growth_yoy_pct, 0.0);
    }

    #[test]
    fn test_three_month_change() {
        let rates = growth(&trend(&[999, 100, 120, 140, 150]));
        assert!((rates.growth_3m_pct - 50.0).abs() < 1e-9);
        assert_eq!(rates.growth_yoy_pct, 0.0);
    }

    #[test]
    fn test_year_over_year_change() {
        let mut volumes = vec![200; 12];
        volumes[11] = 300;
        let rates = growth(&trend(&volumes));
        assert!((rates.growth_yoy_pct - 50.0).abs() < 1e-9);
        assert!((rates.growth_3m_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_base_is_zero_growth() {
        let mut volumes = vec![0; 12];
        volumes[11] = 500;
        let rates = growth(&trend(&volumes));
        assert_eq!(rates.growth_3m_pct, 0.0);
        assert_eq!(rates.growth_yoy_pct, 0.0);
        assert!(rates.growth_3m_pct.is_finite());
    }

    #[test]
    fn test_decline_is_negative() {
        let rates = growth(&trend(&[400, 300, 200, 100]));
        assert!((rates.growth_3m_pct + 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_is_chronological() {
        let mut points = trend(&[1, 2, 3]);
        assert!(is_chronological(&points));
        points.swap(0, 2);
        assert!(!is_chronological(&points));
    }
}

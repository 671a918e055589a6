//! Keyword corpus records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Calendar month in `YYYY-MM` form.
///
/// Ordering is chronological; the derived ordering on `(year, month)` matches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("invalid month key: {s}"))?;
        if year.len() != 4 || month.len() != 2 {
            return Err(format!("invalid month key: {s}"));
        }
        let year: i32 = year
            .parse()
            .map_err(|_| format!("invalid month key: {s}"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("invalid month key: {s}"))?;
        MonthKey::new(year, month).ok_or_else(|| format!("month out of range: {s}"))
    }
}

impl TryFrom<String> for MonthKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(value: MonthKey) -> Self {
        value.to_string()
    }
}

/// One row of the keyword corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRecord {
    pub keyword: String,

    #[serde(default)]
    pub monthly_volume: BTreeMap<MonthKey, u64>,

    /// Competition index in `[0, 1]`.
    #[serde(default)]
    pub competition: Option<f64>,

    #[serde(default)]
    pub cpc: Option<f64>,

    #[serde(default)]
    pub top_page_bid: Option<f64>,

    #[serde(default)]
    pub growth_3m_pct: Option<f64>,

    #[serde(default)]
    pub growth_yoy_pct: Option<f64>,
}

impl KeywordRecord {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            monthly_volume: BTreeMap::new(),
            competition: None,
            cpc: None,
            top_page_bid: None,
            growth_3m_pct: None,
            growth_yoy_pct: None,
        }
    }

    /// Mean of the monthly volumes, or `None` when no month is recorded.
    pub fn avg_volume(&self) -> Option<f64> {
        if self.monthly_volume.is_empty() {
            return None;
        }
        let total: f64 = self.monthly_volume.values().map(|&v| v as f64).sum();
        Some(total / self.monthly_volume.len() as f64)
    }

    pub fn volume_at(&self, month: &MonthKey) -> Option<u64> {
        self.monthly_volume.get(month).copied()
    }

    pub fn with_volumes(mut self, volumes: impl IntoIterator<Item = (MonthKey, u64)>) -> Self {
        self.monthly_volume.extend(volumes);
        self
    }

    pub fn with_competition(mut self, competition: f64) -> Self {
        self.competition = Some(competition);
        self
    }

    pub fn with_cpc(mut self, cpc: f64) -> Self {
        self.cpc = Some(cpc);
        self
    }

    pub fn with_top_page_bid(mut self, bid: f64) -> Self {
        self.top_page_bid = Some(bid);
        self
    }

    pub fn with_growth(mut self, growth_3m_pct: f64, growth_yoy_pct: f64) -> Self {
        self.growth_3m_pct = Some(growth_3m_pct);
        self.growth_yoy_pct = Some(growth_yoy_pct);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(s: &str) -> MonthKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_month_key_parse() {
        let key = month("2024-03");
        assert_eq!(key.year(), 2024);
        assert_eq!(key.month(), 3);
        assert_eq!(key.to_string(), "2024-03");
    }

    #[test]
    fn test_month_key_rejects_invalid() {
        assert!("2024-13".parse::<MonthKey>().is_err());
        assert!("2024-3".parse::<MonthKey>().is_err());
        assert!("March".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_month_key_ordering() {
        assert!(month("2023-12") < month("2024-01"));
        assert!(month("2024-02") < month("2024-10"));
    }

    #[test]
    fn test_avg_volume() {
        let record = KeywordRecord::new("photo editor")
            .with_volumes([(month("2024-01"), 100), (month("2024-02"), 300)]);
        assert_eq!(record.avg_volume(), Some(200.0));
        assert_eq!(KeywordRecord::new("empty").avg_volume(), None);
    }

    #[test]
    fn test_record_serde_roundtrip_keeps_month_keys() {
        let record = KeywordRecord::new("tax software")
            .with_volumes([(month("2024-01"), 10)])
            .with_cpc(2.5);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"2024-01\":10"));
        let parsed: KeywordRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}

//! Search-related models for queries, filters and results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::keyword::KeywordRecord;
use super::metrics::AggregatedMetrics;
use crate::error::QueryError;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
    /// Documentation-friendly Markdown format
    Markdown,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// Numeric keyword metric that a filter can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    /// Mean of the monthly search volumes
    Volume,
    Competition,
    Cpc,
    TopPageBid,
    Growth3m,
    GrowthYoy,
}

impl FilterField {
    pub fn value_of(&self, record: &KeywordRecord) -> Option<f64> {
        match self {
            FilterField::Volume => record.avg_volume(),
            FilterField::Competition => record.competition,
            FilterField::Cpc => record.cpc,
            FilterField::TopPageBid => record.top_page_bid,
            FilterField::Growth3m => record.growth_3m_pct,
            FilterField::GrowthYoy => record.growth_yoy_pct,
        }
    }
}

impl FromStr for FilterField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "volume" | "avg_volume" => Ok(FilterField::Volume),
            "competition" => Ok(FilterField::Competition),
            "cpc" => Ok(FilterField::Cpc),
            "top_page_bid" => Ok(FilterField::TopPageBid),
            "growth_3m" | "growth_3m_pct" => Ok(FilterField::Growth3m),
            "growth_yoy" | "growth_yoy_pct" => Ok(FilterField::GrowthYoy),
            other => Err(QueryError::UnknownFilterField(other.to_string())),
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterField::Volume => "volume",
            FilterField::Competition => "competition",
            FilterField::Cpc => "cpc",
            FilterField::TopPageBid => "top_page_bid",
            FilterField::Growth3m => "growth_3m",
            FilterField::GrowthYoy => "growth_yoy",
        };
        f.write_str(name)
    }
}

/// Comparison operator of a metric filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "=")]
    Eq,
}

/// Absolute tolerance of the `=` operator.
const EQ_TOLERANCE: f64 = 1e-9;

impl FilterOp {
    pub fn compare(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            FilterOp::Gt => lhs > rhs,
            FilterOp::Lt => lhs < rhs,
            FilterOp::Ge => lhs >= rhs,
            FilterOp::Le => lhs <= rhs,
            FilterOp::Eq => (lhs - rhs).abs() <= EQ_TOLERANCE,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            FilterOp::Gt => ">",
            FilterOp::Lt => "<",
            FilterOp::Ge => ">=",
            FilterOp::Le => "<=",
            FilterOp::Eq => "=",
        }
    }
}

/// `field <op> value` predicate over a keyword's metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFilter {
    pub field: FilterField,
    pub op: FilterOp,
    pub value: f64,
}

impl MetricFilter {
    pub fn new(field: FilterField, op: FilterOp, value: f64) -> Result<Self, QueryError> {
        if !value.is_finite() {
            return Err(QueryError::InvalidFilter(format!(
                "{field} {} {value}: value must be finite",
                op.symbol()
            )));
        }
        Ok(Self { field, op, value })
    }

    /// Null metrics never satisfy a filter.
    pub fn matches(&self, record: &KeywordRecord) -> bool {
        self.field
            .value_of(record)
            .is_some_and(|v| self.op.compare(v, self.value))
    }
}

impl FromStr for MetricFilter {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Two-character operators first so ">=" is not read as ">".
        const OPERATORS: [(&str, FilterOp); 5] = [
            (">=", FilterOp::Ge),
            ("<=", FilterOp::Le),
            (">", FilterOp::Gt),
            ("<", FilterOp::Lt),
            ("=", FilterOp::Eq),
        ];

        let (pos, symbol, op) = OPERATORS
            .iter()
            .filter_map(|(symbol, op)| s.find(symbol).map(|pos| (pos, *symbol, *op)))
            .min_by_key(|(pos, symbol, _)| (*pos, std::cmp::Reverse(symbol.len())))
            .ok_or_else(|| QueryError::InvalidFilter(format!("no operator in '{s}'")))?;

        let field_str = s[..pos].trim();
        let value_str = s[pos + symbol.len()..].trim();
        if field_str.is_empty() || value_str.is_empty() {
            return Err(QueryError::InvalidFilter(format!(
                "expected 'field{symbol}value', got '{s}'"
            )));
        }

        let field: FilterField = field_str.parse()?;
        let value: f64 = value_str
            .parse()
            .map_err(|_| QueryError::InvalidFilter(format!("not a number: '{value_str}'")))?;
        MetricFilter::new(field, op, value)
    }
}

impl fmt::Display for MetricFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.field, self.op.symbol(), self.value)
    }
}

/// One ranked keyword.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub keyword: String,

    /// Cosine similarity in `[-1, 1]`.
    pub similarity: f32,

    pub metrics: KeywordRecord,
}

/// Result of a full search: ranked matches plus their aggregate view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub matches: Vec<MatchResult>,
    pub aggregated: AggregatedMetrics,
    pub duration_ms: u64,
}

impl SearchResponse {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "md".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
    }

    #[test]
    fn test_filter_parse_operators() {
        let f: MetricFilter = "cpc>=1.5".parse().unwrap();
        assert_eq!(f.field, FilterField::Cpc);
        assert_eq!(f.op, FilterOp::Ge);
        assert_eq!(f.value, 1.5);

        let f: MetricFilter = " competition < 0.3 ".parse().unwrap();
        assert_eq!(f.field, FilterField::Competition);
        assert_eq!(f.op, FilterOp::Lt);

        let f: MetricFilter = "growth_yoy_pct=10".parse().unwrap();
        assert_eq!(f.field, FilterField::GrowthYoy);
        assert_eq!(f.op, FilterOp::Eq);
    }

    #[test]
    fn test_filter_unknown_field_is_rejected() {
        let err = "popularity>3".parse::<MetricFilter>().unwrap_err();
        assert!(matches!(err, QueryError::UnknownFilterField(ref f) if f == "popularity"));
    }

    #[test]
    fn test_filter_malformed_value() {
        assert!(matches!(
            "cpc>abc".parse::<MetricFilter>(),
            Err(QueryError::InvalidFilter(_))
        ));
        assert!(matches!(
            "cpc>NaN".parse::<MetricFilter>(),
            Err(QueryError::InvalidFilter(_))
        ));
        assert!(matches!(
            "cpc".parse::<MetricFilter>(),
            Err(QueryError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_filter_null_metric_never_matches() {
        let record = KeywordRecord::new("no cpc");
        let f: MetricFilter = "cpc<100".parse().unwrap();
        assert!(!f.matches(&record));
        assert!(f.matches(&record.with_cpc(2.0)));
    }

    #[test]
    fn test_filter_display() {
        let f: MetricFilter = "top_page_bid <= 4".parse().unwrap();
        assert_eq!(f.to_string(), "top_page_bid<=4");
    }
}

//! Keyword corpus loading (CSV, JSON, JSONL) and validation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use tracing::info;

use crate::error::BuildError;
use crate::models::{KeywordRecord, MonthKey};
use crate::utils::calculate_checksum;

/// A validated corpus, in input order.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub records: Vec<KeywordRecord>,
    pub checksum: String,
    pub source: Option<PathBuf>,
}

impl Corpus {
    /// Validate in-memory records; the checksum covers their JSON form.
    pub fn from_records(records: Vec<KeywordRecord>) -> Result<Self, BuildError> {
        validate_records(&records)?;
        let bytes = serde_json::to_vec(&records)?;
        Ok(Self {
            checksum: calculate_checksum(&bytes),
            records,
            source: None,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Read and validate a corpus file. The format follows the extension:
/// `.csv`, `.json` (array of records) or `.jsonl`/`.ndjson`.
pub fn load_corpus(path: &Path) -> Result<Corpus, BuildError> {
    let bytes = std::fs::read(path).map_err(|source| BuildError::CorpusUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let records = match extension.as_str() {
        "csv" => parse_csv(bytes.as_slice())?,
        "json" => serde_json::from_slice(&bytes)
            .map_err(|e| BuildError::CorpusParse(format!("{}: {e}", path.display())))?,
        "jsonl" | "ndjson" => parse_jsonl(&bytes)?,
        other => {
            return Err(BuildError::CorpusParse(format!(
                "unsupported corpus format '{other}' (expected csv, json or jsonl)"
            )));
        }
    };
    let records = records.into_iter().map(trim_keyword).collect::<Vec<_>>();
    validate_records(&records)?;

    info!(
        path = %path.display(),
        keywords = records.len(),
        "corpus loaded"
    );

    Ok(Corpus {
        records,
        checksum: calculate_checksum(&bytes),
        source: Some(path.to_path_buf()),
    })
}

fn trim_keyword(mut record: KeywordRecord) -> KeywordRecord {
    let trimmed = record.keyword.trim();
    if trimmed.len() != record.keyword.len() {
        record.keyword = trimmed.to_string();
    }
    record
}

/// Reject empty or duplicate keywords and out-of-range metrics.
pub fn validate_records(records: &[KeywordRecord]) -> Result<(), BuildError> {
    let mut seen = HashSet::with_capacity(records.len());

    for (i, record) in records.iter().enumerate() {
        let row = i + 1;
        if record.keyword.trim().is_empty() {
            return Err(BuildError::EmptyKeyword { row });
        }
        if !seen.insert(record.keyword.as_str()) {
            return Err(BuildError::DuplicateKeyword(record.keyword.clone()));
        }
        if let Some(c) = record.competition
            && !(0.0..=1.0).contains(&c)
        {
            return Err(BuildError::InvalidRecord {
                row,
                reason: format!("competition {c} outside [0, 1]"),
            });
        }
        for (name, value) in [("cpc", record.cpc), ("top_page_bid", record.top_page_bid)] {
            if let Some(v) = value
                && !(v.is_finite() && v >= 0.0)
            {
                return Err(BuildError::InvalidRecord {
                    row,
                    reason: format!("{name} must be a non-negative number, got {v}"),
                });
            }
        }
        for (name, value) in [
            ("growth_3m_pct", record.growth_3m_pct),
            ("growth_yoy_pct", record.growth_yoy_pct),
        ] {
            if let Some(v) = value
                && !v.is_finite()
            {
                return Err(BuildError::InvalidRecord {
                    row,
                    reason: format!("{name} must be finite"),
                });
            }
        }
    }
    Ok(())
}

fn parse_jsonl(bytes: &[u8]) -> Result<Vec<KeywordRecord>, BuildError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| BuildError::CorpusParse(format!("corpus is not UTF-8: {e}")))?;

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| BuildError::InvalidRecord {
                row: i + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Column meaning, resolved from the CSV header.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Column {
    Keyword,
    /// Competition, multiplied by the scale to land in `[0, 1]`.
    Competition(f64),
    Cpc,
    TopPageBid,
    Growth3m,
    GrowthYoy,
    Month(MonthKey),
    Ignored,
}

static ISO_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("valid regex"));

static PLANNER_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^searches:\s*([a-z]{3})[a-z]*\s+(\d{4})$").expect("valid regex"));

fn classify_header(header: &str) -> Column {
    let h = header.trim().to_lowercase();
    match h.as_str() {
        "keyword" => return Column::Keyword,
        "competition" => return Column::Competition(1.0),
        "competition (indexed value)" => return Column::Competition(0.01),
        "cpc" | "avg_cpc" | "avg. cpc" => return Column::Cpc,
        "top_page_bid" | "top of page bid (high range)" => return Column::TopPageBid,
        "growth_3m_pct" | "growth_3m" | "three month change" => return Column::Growth3m,
        "growth_yoy_pct" | "growth_yoy" | "yoy change" => return Column::GrowthYoy,
        _ => {}
    }

    if ISO_MONTH.is_match(&h)
        && let Ok(key) = h.parse::<MonthKey>()
    {
        return Column::Month(key);
    }

    if let Some(caps) = PLANNER_MONTH.captures(&h) {
        let candidate = format!("1 {} {}", &caps[1], &caps[2]);
        if let Ok(date) = NaiveDate::parse_from_str(&candidate, "%d %b %Y")
            && let Some(key) = MonthKey::new(date.year(), date.month())
        {
            return Column::Month(key);
        }
    }

    Column::Ignored
}

/// Parse a numeric cell. Empty, `-`, `N/A` and `null` are missing values;
/// `%`, `$` and thousands separators are stripped.
fn parse_number(cell: &str) -> Result<Option<f64>, String> {
    let cell = cell.trim();
    if cell.is_empty()
        || matches!(
            cell.to_lowercase().as_str(),
            "-" | "--" | "n/a" | "na" | "null"
        )
    {
        return Ok(None);
    }

    let cleaned: String = cell
        .trim_end_matches('%')
        .chars()
        .filter(|c| *c != ',' && *c != '$')
        .collect();
    let value: f64 = cleaned
        .trim()
        .parse()
        .map_err(|_| format!("not a number: '{cell}'"))?;
    if !value.is_finite() {
        return Err(format!("not a finite number: '{cell}'"));
    }
    Ok(Some(value))
}

/// Parse a CSV corpus with canonical or Keyword Planner headers.
pub fn parse_csv<R: std::io::Read>(reader: R) -> Result<Vec<KeywordRecord>, BuildError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| BuildError::CorpusParse(e.to_string()))?
        .clone();
    let mut columns: Vec<Column> = headers.iter().map(classify_header).collect();

    // Planner exports carry a text `Competition` level next to the indexed value.
    if columns.contains(&Column::Competition(0.01)) {
        for column in columns.iter_mut() {
            if *column == Column::Competition(1.0) {
                *column = Column::Ignored;
            }
        }
    }

    if !columns.contains(&Column::Keyword) {
        return Err(BuildError::CorpusParse(
            "corpus has no 'keyword' column".to_string(),
        ));
    }

    let mut records = Vec::new();
    for (i, row) in csv_reader.records().enumerate() {
        let row_number = i + 1;
        let row = row.map_err(|e| BuildError::InvalidRecord {
            row: row_number,
            reason: e.to_string(),
        })?;

        let invalid = |reason: String| BuildError::InvalidRecord {
            row: row_number,
            reason,
        };

        let mut record = KeywordRecord::new(String::new());
        for (column, cell) in columns.iter().zip(row.iter()) {
            match *column {
                Column::Keyword => record.keyword = cell.trim().to_string(),
                Column::Competition(scale) => {
                    record.competition = parse_number(cell).map_err(invalid)?.map(|v| v * scale);
                }
                Column::Cpc => record.cpc = parse_number(cell).map_err(invalid)?,
                Column::TopPageBid => record.top_page_bid = parse_number(cell).map_err(invalid)?,
                Column::Growth3m => record.growth_3m_pct = parse_number(cell).map_err(invalid)?,
                Column::GrowthYoy => record.growth_yoy_pct = parse_number(cell).map_err(invalid)?,
                Column::Month(month) => {
                    if let Some(volume) = parse_number(cell).map_err(invalid)? {
                        if volume < 0.0 {
                            return Err(invalid(format!("negative volume for {month}")));
                        }
                        record.monthly_volume.insert(month, volume.round() as u64);
                    }
                }
                Column::Ignored => {}
            }
        }
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn month(s: &str) -> MonthKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_canonical_csv() {
        let csv = "keyword,competition,cpc,top_page_bid,growth_3m_pct,growth_yoy_pct,2024-01,2024-02\n\
                   photo editor,0.4,1.25,3.10,12.5,40,1000,1200\n\
                   tax software,,2.0,-,,,500,\n";
        let records = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);

        let photo = &records[0];
        assert_eq!(photo.keyword, "photo editor");
        assert_eq!(photo.competition, Some(0.4));
        assert_eq!(photo.top_page_bid, Some(3.10));
        assert_eq!(photo.growth_yoy_pct, Some(40.0));
        assert_eq!(photo.volume_at(&month("2024-02")), Some(1200));

        let tax = &records[1];
        assert_eq!(tax.competition, None);
        assert_eq!(tax.top_page_bid, None);
        assert_eq!(tax.monthly_volume.len(), 1);
    }

    #[test]
    fn test_parse_keyword_planner_csv() {
        let csv = "Keyword,Currency,Avg. monthly searches,Three month change,YoY change,Competition,Competition (indexed value),Top of page bid (low range),Top of page bid (high range),Searches: Jan 2024,Searches: Feb 2024\n\
                   video editor,USD,\"1,750\",0%,-10%,High,85,\"$1.10\",\"$4.20\",\"1,500\",\"2,000\"\n";
        let records = parse_csv(csv.as_bytes()).unwrap();
        let record = &records[0];
        assert_eq!(record.keyword, "video editor");
        assert!((record.competition.unwrap() - 0.85).abs() < 1e-12);
        assert_eq!(record.top_page_bid, Some(4.20));
        assert_eq!(record.growth_3m_pct, Some(0.0));
        assert_eq!(record.growth_yoy_pct, Some(-10.0));
        assert_eq!(record.volume_at(&month("2024-01")), Some(1500));
        assert_eq!(record.volume_at(&month("2024-02")), Some(2000));
    }

    #[test]
    fn test_bare_competition_column_is_still_numeric() {
        let csv = "keyword,competition\nfoo,0.3\n";
        let records = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(records[0].competition, Some(0.3));

        let csv = "keyword,competition\nfoo,High\n";
        assert!(matches!(
            parse_csv(csv.as_bytes()),
            Err(BuildError::InvalidRecord { row: 1, .. })
        ));
    }

    #[test]
    fn test_csv_without_keyword_column() {
        let csv = "term,cpc\nfoo,1\n";
        assert!(matches!(
            parse_csv(csv.as_bytes()),
            Err(BuildError::CorpusParse(_))
        ));
    }

    #[test]
    fn test_csv_bad_number_reports_row() {
        let csv = "keyword,cpc\nok,1\nbad,abc\n";
        match parse_csv(csv.as_bytes()) {
            Err(BuildError::InvalidRecord { row, .. }) => assert_eq!(row, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_keyword_is_rejected() {
        let records = vec![KeywordRecord::new("a"), KeywordRecord::new("a")];
        assert!(matches!(
            validate_records(&records),
            Err(BuildError::DuplicateKeyword(ref k)) if k == "a"
        ));
    }

    #[test]
    fn test_competition_out_of_range() {
        let records = vec![KeywordRecord::new("a").with_competition(1.5)];
        assert!(matches!(
            validate_records(&records),
            Err(BuildError::InvalidRecord { row: 1, .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_corpus(Path::new("/definitely/not/here.csv"));
        assert!(matches!(result, Err(BuildError::CorpusUnreadable { .. })));
    }

    #[test]
    fn test_load_jsonl_trims_keywords() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corpus.jsonl");
        std::fs::write(
            &path,
            "{\"keyword\":\" photo editor \",\"cpc\":1.0}\n\n{\"keyword\":\"tax software\"}\n",
        )
        .unwrap();

        let corpus = load_corpus(&path).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.records[0].keyword, "photo editor");
        assert_eq!(corpus.checksum.len(), 64);
    }

    #[test]
    fn test_load_rejects_trimmed_duplicates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corpus.json");
        std::fs::write(&path, r#"[{"keyword":"a"},{"keyword":"a "}]"#).unwrap();
        assert!(matches!(
            load_corpus(&path),
            Err(BuildError::DuplicateKeyword(_))
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corpus.xlsx");
        std::fs::write(&path, "x").unwrap();
        assert!(matches!(load_corpus(&path), Err(BuildError::CorpusParse(_))));
    }
}

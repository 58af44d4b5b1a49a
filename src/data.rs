use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Header names recognised as the row-key column, compared case-insensitively.
const TIMESTAMP_HEADERS: &[&str] = &["time", "timestamp", "datetime", "date"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed delimited input: {0}")]
    Csv(#[from] csv::Error),
    #[error("input has no header row")]
    MissingHeader,
    #[error("input has a header row but no data rows")]
    NoRows,
    #[error("no parseable timestamp column found")]
    MissingTimestampColumn,
    #[error("row {row}: cannot parse timestamp '{value}' in column '{column}'")]
    BadTimestamp {
        row: usize,
        column: String,
        value: String,
    },
    #[error("row {row}: non-numeric weight '{value}' in column '{column}'")]
    NonNumericWeight {
        row: usize,
        column: String,
        value: String,
    },
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
}

// ──────────────────────────────────────────────────────────────────────────────
// Weights
// ──────────────────────────────────────────────────────────────────────────────

/// Insertion-ordered ticker → weight mapping.
///
/// Used for a snapshot row as well as everything derived from one (targets,
/// drift). Order is the column order of the source file, which is what every
/// view iterates in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Weights {
    entries: Vec<(String, f64)>,
}

impl Weights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(t, _)| t == ticker)
            .map(|(_, w)| *w)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.entries.iter().any(|(t, _)| t == ticker)
    }

    /// Sets `ticker` to `weight`, keeping its original position if already present.
    pub fn insert(&mut self, ticker: impl Into<String>, weight: f64) {
        let ticker = ticker.into();
        match self.entries.iter_mut().find(|(t, _)| *t == ticker) {
            Some(entry) => entry.1 = weight,
            None => self.entries.push((ticker, weight)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries.iter().map(|(t, w)| (t.as_str(), *w))
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(_, w)| *w)
    }

    pub fn total(&self) -> f64 {
        self.values().sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for Weights {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut weights = Weights::new();
        for (ticker, weight) in iter {
            weights.insert(ticker, weight);
        }
        weights
    }
}

impl Serialize for Weights {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (ticker, weight) in &self.entries {
            map.serialize_entry(ticker, weight)?;
        }
        map.end()
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// WeightTable
// ──────────────────────────────────────────────────────────────────────────────

/// Time-indexed table of per-ticker weights. Immutable once loaded.
#[derive(Clone, Debug)]
pub struct WeightTable {
    tickers: Vec<String>,
    timestamps: Vec<NaiveDateTime>,
    rows: Vec<Vec<f64>>,
    dates: Vec<NaiveDate>,
}

impl WeightTable {
    /// Builds a table from already-parsed rows. Rows are ordered by timestamp
    /// (stable, so same-timestamp rows keep their input order).
    pub fn from_rows(
        tickers: Vec<String>,
        rows: Vec<(NaiveDateTime, Vec<f64>)>,
    ) -> Result<Self, LoadError> {
        let mut seen = HashSet::new();
        for ticker in &tickers {
            if !seen.insert(ticker.as_str()) {
                return Err(LoadError::DuplicateColumn(ticker.clone()));
            }
        }
        if rows.is_empty() {
            return Err(LoadError::NoRows);
        }

        let mut rows = rows;
        rows.sort_by_key(|(ts, _)| *ts);

        let mut dates: Vec<NaiveDate> = rows.iter().map(|(ts, _)| ts.date()).collect();
        dates.dedup();

        let (timestamps, rows) = rows.into_iter().unzip();
        Ok(Self {
            tickers,
            timestamps,
            rows,
            dates,
        })
    }

    /// Reads a comma-delimited weight file with a header row.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_reader(file)?;
        info!(
            "Loaded {} rows x {} tickers from {} ({} distinct dates, {} .. {})",
            table.len(),
            table.tickers.len(),
            path.display(),
            table.dates.len(),
            table.dates.first().map(|d| d.to_string()).unwrap_or_default(),
            table.dates.last().map(|d| d.to_string()).unwrap_or_default(),
        );
        Ok(table)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, LoadError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(LoadError::MissingHeader);
        }

        let records = rdr.records().collect::<Result<Vec<_>, _>>()?;
        if records.is_empty() {
            return Err(LoadError::NoRows);
        }

        let ts_col = find_timestamp_column(&headers, &records)?;
        debug!("Using column '{}' as the timestamp key", headers[ts_col]);

        let tickers: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != ts_col)
            .map(|(_, h)| h.clone())
            .collect();

        let mut rows = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            let row = idx + 1;
            let raw_ts = record.get(ts_col).unwrap_or_default();
            let ts = parse_timestamp(raw_ts).ok_or_else(|| LoadError::BadTimestamp {
                row,
                column: headers[ts_col].clone(),
                value: raw_ts.to_string(),
            })?;

            let mut weights = Vec::with_capacity(tickers.len());
            for (col, cell) in record.iter().enumerate() {
                if col == ts_col {
                    continue;
                }
                let weight = parse_weight(cell).ok_or_else(|| LoadError::NonNumericWeight {
                    row,
                    column: headers[col].clone(),
                    value: cell.to_string(),
                })?;
                weights.push(weight);
            }
            rows.push((ts, weights));
        }

        Self::from_rows(tickers, rows)
    }

    /// Ticker columns in file order.
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Distinct calendar dates, ascending.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn snapshot_at(&self, row: usize) -> Option<Weights> {
        let values = self.rows.get(row)?;
        Some(
            self.tickers
                .iter()
                .cloned()
                .zip(values.iter().copied())
                .collect(),
        )
    }

    /// Snapshot for a calendar date. When several rows fall on the same date
    /// the latest one wins.
    pub fn snapshot_on(&self, date: NaiveDate) -> Option<Weights> {
        let row = self.timestamps.iter().rposition(|ts| ts.date() == date)?;
        self.snapshot_at(row)
    }

    /// Every row's weight for one ticker, in timestamp order.
    pub fn series(&self, ticker: &str) -> Option<Vec<f64>> {
        let col = self.tickers.iter().position(|t| t == ticker)?;
        Some(self.rows.iter().map(|r| r[col]).collect())
    }
}

fn find_timestamp_column(
    headers: &[String],
    records: &[csv::StringRecord],
) -> Result<usize, LoadError> {
    if let Some(col) = headers
        .iter()
        .position(|h| TIMESTAMP_HEADERS.iter().any(|n| h.eq_ignore_ascii_case(n)))
    {
        return Ok(col);
    }

    (0..headers.len())
        .find(|&col| {
            records
                .iter()
                .all(|r| r.get(col).and_then(parse_timestamp).is_some())
        })
        .ok_or(LoadError::MissingTimestampColumn)
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }
    None
}

fn parse_weight(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|w| w.is_finite())
}

// ──────────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const SAMPLE_CSV: &str = "\
Time,AAA,BBB,Cash
2024-01-02,0.50,0.45,0.05
2024-01-03,0.55,0.40,0.05
2024-01-04,0.60,0.40,0.00
";

    pub(crate) fn sample_table() -> WeightTable {
        WeightTable::from_reader(SAMPLE_CSV.as_bytes()).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.txt");
        let mut file = File::create(&path).unwrap();
        file.write_all(SAMPLE_CSV.as_bytes()).unwrap();

        let table = WeightTable::load(&path).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.tickers(), ["AAA", "BBB", "Cash"]);
        assert_eq!(
            table.dates(),
            [date("2024-01-02"), date("2024-01-03"), date("2024-01-04")]
        );
        assert_eq!(table.latest_date(), Some(date("2024-01-04")));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = WeightTable::load(dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_snapshot_preserves_column_order() {
        let table = sample_table();
        let snap = table.snapshot_on(date("2024-01-04")).unwrap();
        let tickers: Vec<&str> = snap.tickers().collect();
        assert_eq!(tickers, vec!["AAA", "BBB", "Cash"]);
        assert_eq!(snap.get("AAA"), Some(0.60));
        assert_eq!(snap.get("Cash"), Some(0.0));
        assert!(table.snapshot_on(date("2023-12-31")).is_none());
    }

    #[test]
    fn test_rows_sorted_and_last_row_of_day_wins() {
        let csv = "\
Time,AAA,BBB
2024-01-03 16:00:00,0.7,0.3
2024-01-02 09:30:00,0.5,0.5
2024-01-03 09:30:00,0.6,0.4
";
        let table = WeightTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.dates(), [date("2024-01-02"), date("2024-01-03")]);
        assert_eq!(table.series("AAA").unwrap(), vec![0.5, 0.6, 0.7]);

        let snap = table.snapshot_on(date("2024-01-03")).unwrap();
        assert_eq!(snap.get("AAA"), Some(0.7));
    }

    #[test]
    fn test_timestamp_column_detected_without_known_header() {
        let csv = "\
AAA,asof,BBB
0.5,2024-02-01,0.5
0.4,2024-02-02,0.6
";
        let table = WeightTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.tickers(), ["AAA", "BBB"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_no_timestamp_column() {
        let csv = "AAA,BBB\n0.5,0.5\n";
        let err = WeightTable::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::MissingTimestampColumn));
    }

    #[test]
    fn test_bad_timestamp_in_named_column() {
        let csv = "Time,AAA\n2024-01-02,0.5\nyesterday,0.5\n";
        let err = WeightTable::from_reader(csv.as_bytes()).unwrap_err();
        match err {
            LoadError::BadTimestamp { row, value, .. } => {
                assert_eq!(row, 2);
                assert_eq!(value, "yesterday");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_numeric_weight_rejected() {
        let csv = "Time,AAA,BBB\n2024-01-02,0.5,abc\n";
        let err = WeightTable::from_reader(csv.as_bytes()).unwrap_err();
        match err {
            LoadError::NonNumericWeight { column, value, .. } => {
                assert_eq!(column, "BBB");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }

        let csv = "Time,AAA\n2024-01-02,\n";
        assert!(matches!(
            WeightTable::from_reader(csv.as_bytes()).unwrap_err(),
            LoadError::NonNumericWeight { .. }
        ));

        let csv = "Time,AAA\n2024-01-02,NaN\n";
        assert!(matches!(
            WeightTable::from_reader(csv.as_bytes()).unwrap_err(),
            LoadError::NonNumericWeight { .. }
        ));
    }

    #[test]
    fn test_header_only_and_duplicates() {
        let err = WeightTable::from_reader("Time,AAA\n".as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::NoRows));

        let csv = "Time,AAA,AAA\n2024-01-02,0.5,0.5\n";
        let err = WeightTable::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateColumn(ref t) if t == "AAA"));
    }

    #[test]
    fn test_ragged_row_is_csv_error() {
        let csv = "Time,AAA,BBB\n2024-01-02,0.5\n";
        let err = WeightTable::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::Csv(_)));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let midnight = date("2024-01-02").and_time(NaiveTime::MIN);
        assert_eq!(parse_timestamp("2024-01-02"), Some(midnight));
        assert_eq!(parse_timestamp("2024/01/02"), Some(midnight));
        assert_eq!(parse_timestamp("01/02/2024"), Some(midnight));
        assert_eq!(parse_timestamp("2024-01-02 00:00:00"), Some(midnight));
        assert_eq!(parse_timestamp("2024-01-02T00:00:00Z"), Some(midnight));
        assert!(parse_timestamp("0.55").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_weights_insert_keeps_position() {
        let mut w: Weights = [("AAA", 0.1), ("BBB", 0.2)].into_iter().collect();
        w.insert("AAA", 0.3);
        w.insert("CCC", 0.4);
        let items: Vec<(&str, f64)> = w.iter().collect();
        assert_eq!(items, vec![("AAA", 0.3), ("BBB", 0.2), ("CCC", 0.4)]);
        assert!((w.total() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_weights_serialize_as_ordered_map() {
        let w: Weights = [("ZZZ", 0.25), ("AAA", 0.75)].into_iter().collect();
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"ZZZ":0.25,"AAA":0.75}"#);
    }
}

//! Bar loading for the runner.
//!
//! Input is a directory of per-symbol partitions:
//!
//! ```text
//! <data_dir>/symbol=SPY/part-0.parquet
//! <data_dir>/symbol=SPY/part-1.parquet
//! <data_dir>/symbol=QQQ/bars.csv
//! ```
//!
//! Every file of the source's format in a partition is read, rows are
//! concatenated, sorted by date and normalized. Column names are matched
//! case-insensitively; `time` is accepted in place of `date` and any extra
//! columns are ignored.
//!
//! Sources implement [`BarSource`], so the runner can be pointed at Parquet
//! or CSV partitions, or at deterministic synthetic data, without caring which.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wyckoff_core::domain::{normalize, Bar, BarError, RawBar};

use crate::synthetic;

/// Directory prefix marking a symbol partition.
pub const PARTITION_PREFIX: &str = "symbol=";

const REQUIRED: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parquet error in {source_name}: {message}")]
    Parquet { source_name: String, message: String },

    #[error("CSV error in {source_name}: {source}")]
    Csv {
        source_name: String,
        #[source]
        source: csv::Error,
    },

    #[error("{source_name} is missing required columns: {}", missing.join(", "))]
    MissingColumns {
        source_name: String,
        missing: Vec<String>,
    },

    #[error("{source_name} row {row}: cannot parse {column} value '{value}'")]
    BadValue {
        source_name: String,
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("no partition for symbol '{0}'")]
    UnknownSymbol(String),

    #[error("bar error: {0}")]
    Bar(#[from] BarError),
}

/// Something the runner can pull per-symbol bars from.
pub trait BarSource: Sync {
    /// Sorted symbol list.
    fn symbols(&self) -> Result<Vec<String>, LoadError>;

    /// Normalized bars for one symbol, in date order. May be empty.
    fn load(&self, symbol: &str) -> Result<Vec<Bar>, LoadError>;
}

/// On-disk format of the partition files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Parquet,
    Csv,
}

impl DataFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DataFormat::Parquet => "parquet",
            DataFormat::Csv => "csv",
        }
    }

    /// Format implied by a file extension, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("parquet") {
            Some(DataFormat::Parquet)
        } else if ext.eq_ignore_ascii_case("csv") {
            Some(DataFormat::Csv)
        } else {
            None
        }
    }

    /// Read one file of this format.
    pub fn read_file(self, path: &Path) -> Result<Vec<RawBar>, LoadError> {
        match self {
            DataFormat::Parquet => read_parquet_file(path),
            DataFormat::Csv => read_csv_file(path),
        }
    }
}

/// Partition directory of one format under a root directory.
#[derive(Debug, Clone)]
pub struct PartitionedDirectory {
    pub root: PathBuf,
    pub format: DataFormat,
    /// Trailing window in days; 0 keeps every row.
    pub lookback_days: u32,
}

impl PartitionedDirectory {
    pub fn new(root: impl Into<PathBuf>, format: DataFormat, lookback_days: u32) -> Self {
        Self {
            root: root.into(),
            format,
            lookback_days,
        }
    }

    pub fn csv(root: impl Into<PathBuf>, lookback_days: u32) -> Self {
        Self::new(root, DataFormat::Csv, lookback_days)
    }

    pub fn parquet(root: impl Into<PathBuf>, lookback_days: u32) -> Self {
        Self::new(root, DataFormat::Parquet, lookback_days)
    }

    fn partition(&self, symbol: &str) -> PathBuf {
        self.root.join(format!("{PARTITION_PREFIX}{symbol}"))
    }
}

impl BarSource for PartitionedDirectory {
    fn symbols(&self) -> Result<Vec<String>, LoadError> {
        list_symbols(&self.root)
    }

    fn load(&self, symbol: &str) -> Result<Vec<Bar>, LoadError> {
        let dir = self.partition(symbol);
        if !dir.is_dir() {
            return Err(LoadError::UnknownSymbol(symbol.to_string()));
        }
        let mut raws = Vec::new();
        for file in partition_files(&dir, self.format)? {
            raws.extend(self.format.read_file(&file)?);
        }
        let bars = apply_lookback(normalize(raws)?, self.lookback_days);

        let insane = bars.iter().filter(|b| !b.is_sane()).count();
        if insane > 0 {
            log::warn!("{symbol}: {insane} bars fail OHLC sanity checks");
        }
        Ok(bars)
    }
}

/// Deterministic synthetic bars for any requested symbol list.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub bars: usize,
}

impl BarSource for SyntheticSource {
    fn symbols(&self) -> Result<Vec<String>, LoadError> {
        let mut symbols = self.symbols.clone();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }

    fn load(&self, symbol: &str) -> Result<Vec<Bar>, LoadError> {
        Ok(normalize(synthetic::generate(symbol, self.start, self.bars))?)
    }
}

/// Sorted symbols that have a `symbol=<SYM>` directory under `root`.
///
/// A missing root yields an empty list.
pub fn list_symbols(root: &Path) -> Result<Vec<String>, LoadError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(root).map_err(|source| LoadError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let mut symbols = Vec::new();
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(symbol) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.strip_prefix(PARTITION_PREFIX))
        {
            if !symbol.is_empty() {
                symbols.push(symbol.to_string());
            }
        }
    }
    symbols.sort();
    Ok(symbols)
}

fn partition_files(dir: &Path, format: DataFormat) -> Result<Vec<PathBuf>, LoadError> {
    let entries = std::fs::read_dir(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && DataFormat::from_path(p) == Some(format))
        .collect();
    files.sort();
    Ok(files)
}

pub fn read_csv_file(path: &Path) -> Result<Vec<RawBar>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_bars(file, &path.display().to_string())
}

/// Read one Parquet file into raw bars.
///
/// `date` may be stored as a date, a datetime or an ISO string; price and
/// volume columns may be any numeric type.
pub fn read_parquet_file(path: &Path) -> Result<Vec<RawBar>, LoadError> {
    let source_name = path.display().to_string();
    let parquet_err = |what: &str, e: PolarsError| LoadError::Parquet {
        source_name: source_name.clone(),
        message: format!("{what}: {e}"),
    };

    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| parquet_err("read", e))?;

    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let find = |name: &str| {
        let hit = |want: &str| names.iter().find(|n| n.eq_ignore_ascii_case(want));
        hit(name).or_else(|| (name == "date").then(|| hit("time")).flatten())
    };
    let mut cols: Vec<&String> = Vec::with_capacity(REQUIRED.len());
    let mut missing = Vec::new();
    for name in REQUIRED {
        match find(name) {
            Some(col) => cols.push(col),
            None => missing.push(name.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns {
            source_name: source_name.clone(),
            missing,
        });
    }

    let column = |k: usize, dtype: &DataType| -> Result<Column, LoadError> {
        df.column(cols[k].as_str())
            .and_then(|c| c.cast(dtype))
            .map_err(|e| parquet_err(REQUIRED[k], e))
    };
    let dates = column(0, &DataType::Date)?;
    let date_ca = dates.date().map_err(|e| parquet_err("date column type", e))?;
    let floats: Vec<Column> = (1..REQUIRED.len())
        .map(|k| column(k, &DataType::Float64))
        .collect::<Result<_, _>>()?;
    let float_cas = floats
        .iter()
        .enumerate()
        .map(|(k, c)| c.f64().map_err(|e| parquet_err(REQUIRED[k + 1], e)))
        .collect::<Result<Vec<_>, _>>()?;

    // Date columns count days from 1970-01-01, which is NaiveDate's default.
    let epoch = NaiveDate::default();
    let null = |row: usize, column: &'static str| LoadError::BadValue {
        source_name: source_name.clone(),
        row: row + 1,
        column,
        value: "null".into(),
    };
    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let days = date_ca.get(i).ok_or_else(|| null(i, "date"))?;
        let mut values = [0.0f64; 5];
        for (k, v) in values.iter_mut().enumerate() {
            *v = float_cas[k].get(i).ok_or_else(|| null(i, REQUIRED[k + 1]))?;
        }
        let [open, high, low, close, volume] = values;
        out.push(RawBar {
            date: epoch + chrono::Duration::days(days as i64),
            open,
            high,
            low,
            close,
            volume,
        });
    }
    Ok(out)
}

/// Parse OHLCV rows from any CSV reader. `source_name` labels errors.
pub fn parse_bars<R: Read>(reader: R, source_name: &str) -> Result<Vec<RawBar>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        source_name: source_name.to_string(),
        source,
    };
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers().map_err(csv_err)?.clone();

    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .or_else(|| {
                (name == "date")
                    .then(|| headers.iter().position(|h| h.eq_ignore_ascii_case("time")))
                    .flatten()
            })
    };
    let mut cols = [0usize; 6];
    let mut missing = Vec::new();
    for (slot, name) in cols.iter_mut().zip(REQUIRED) {
        match find(name) {
            Some(i) => *slot = i,
            None => missing.push(name.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns {
            source_name: source_name.to_string(),
            missing,
        });
    }

    let mut out = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let field = |k: usize| record.get(cols[k]).unwrap_or("");
        let bad = |column: &'static str, value: &str| LoadError::BadValue {
            source_name: source_name.to_string(),
            row: row + 1,
            column,
            value: value.to_string(),
        };

        let date = parse_date(field(0)).ok_or_else(|| bad("date", field(0)))?;
        let mut values = [0.0f64; 5];
        for (k, v) in values.iter_mut().enumerate() {
            let text = field(k + 1);
            *v = text.parse().map_err(|_| bad(REQUIRED[k + 1], text))?;
        }
        let [open, high, low, close, volume] = values;
        out.push(RawBar {
            date,
            open,
            high,
            low,
            close,
            volume,
        });
    }
    Ok(out)
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part.
fn parse_date(text: &str) -> Option<NaiveDate> {
    let day = text.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Keep rows dated on or after `max_date - lookback_days`.
pub fn apply_lookback(bars: Vec<Bar>, lookback_days: u32) -> Vec<Bar> {
    if lookback_days == 0 {
        return bars;
    }
    let Some(max_date) = bars.iter().map(|b| b.date).max() else {
        return bars;
    };
    let cutoff = max_date - chrono::Duration::days(i64::from(lookback_days));
    bars.into_iter().filter(|b| b.date >= cutoff).collect()
}

/// Deterministic BLAKE3 hash over a symbol's bars.
pub fn dataset_hash(symbol: &str, bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.as_bytes());
    for bar in bars {
        hasher.update(bar.date.to_string().as_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Date,Open,High,Low,Close,Volume,Symbol
2024-01-03,101,103,100,102,1100,SPY
2024-01-02,100,102,99,101,1000,SPY
";

    #[test]
    fn parses_case_insensitive_headers_and_ignores_extras() {
        let raws = parse_bars(SAMPLE.as_bytes(), "sample").unwrap();
        assert_eq!(raws.len(), 2);
        assert_eq!(raws[0].close, 102.0);
        assert_eq!(raws[1].volume, 1000.0);
    }

    #[test]
    fn time_column_stands_in_for_date() {
        let csv = "time,open,high,low,close,volume\n2024-01-02 00:00:00,1,2,0.5,1.5,10\n";
        let raws = parse_bars(csv.as_bytes(), "t").unwrap();
        assert_eq!(raws[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn missing_columns_are_reported() {
        let csv = "date,open,close\n2024-01-02,1,2\n";
        let err = parse_bars(csv.as_bytes(), "m").unwrap_err();
        match err {
            LoadError::MissingColumns { missing, .. } => {
                assert_eq!(missing, vec!["high", "low", "volume"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unparseable_value_names_row_and_column() {
        let csv = "date,open,high,low,close,volume\n2024-01-02,1,2,0.5,abc,10\n";
        let err = parse_bars(csv.as_bytes(), "b").unwrap_err();
        assert!(matches!(
            err,
            LoadError::BadValue {
                row: 1,
                column: "close",
                ..
            }
        ));
    }

    fn epoch_days(date: NaiveDate) -> i32 {
        (date - NaiveDate::default()).num_days() as i32
    }

    fn write_parquet(path: &Path, mut df: DataFrame) {
        let file = std::fs::File::create(path).unwrap();
        ParquetWriter::new(file).finish(&mut df).unwrap();
    }

    #[test]
    fn parquet_partition_accepts_integer_volume_and_mixed_case() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("symbol=SPY");
        std::fs::create_dir(&part).unwrap();
        let jan2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let days = vec![epoch_days(jan2) + 1, epoch_days(jan2)];
        let df = DataFrame::new(vec![
            Column::new("Date".into(), days).cast(&DataType::Date).unwrap(),
            Column::new("Open".into(), vec![101.0, 100.0]),
            Column::new("High".into(), vec![103.0, 102.0]),
            Column::new("Low".into(), vec![100.0, 99.0]),
            Column::new("Close".into(), vec![102.0, 101.0]),
            Column::new("Volume".into(), vec![1100i64, 1000]),
            Column::new("Symbol".into(), vec!["SPY", "SPY"]),
        ])
        .unwrap();
        write_parquet(&part.join("part-0.parquet"), df);
        std::fs::write(part.join("notes.csv"), "not,bars\n").unwrap();

        let src = PartitionedDirectory::parquet(dir.path(), 0);
        assert_eq!(src.symbols().unwrap(), vec!["SPY"]);
        let bars = src.load("SPY").unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, jan2);
        assert_eq!(bars[0].close, 101.0);
        assert_eq!(bars[1].volume, 1100.0);
    }

    #[test]
    fn parquet_missing_columns_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.parquet");
        let jan2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let df = DataFrame::new(vec![
            Column::new("date".into(), vec![epoch_days(jan2)])
                .cast(&DataType::Date)
                .unwrap(),
            Column::new("open".into(), vec![1.0]),
            Column::new("close".into(), vec![2.0]),
        ])
        .unwrap();
        write_parquet(&path, df);

        match read_parquet_file(&path).unwrap_err() {
            LoadError::MissingColumns { missing, .. } => {
                assert_eq!(missing, vec!["high", "low", "volume"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn format_follows_file_extension() {
        assert_eq!(
            DataFormat::from_path(Path::new("a/part-0.PARQUET")),
            Some(DataFormat::Parquet)
        );
        assert_eq!(DataFormat::from_path(Path::new("bars.csv")), Some(DataFormat::Csv));
        assert_eq!(DataFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn lookback_keeps_trailing_window() {
        let raws = (0..10)
            .map(|i| RawBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i),
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 10.0,
            })
            .collect();
        let bars = normalize(raws).unwrap();
        let kept = apply_lookback(bars.clone(), 3);
        assert_eq!(kept.len(), 4);
        assert_eq!(kept[0].date, NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
        assert_eq!(apply_lookback(bars, 0).len(), 10);
    }

    #[test]
    fn synthetic_source_is_deterministic() {
        let src = SyntheticSource {
            symbols: vec!["QQQ".into(), "SPY".into(), "QQQ".into()],
            start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            bars: 50,
        };
        assert_eq!(src.symbols().unwrap(), vec!["QQQ", "SPY"]);
        let a = src.load("SPY").unwrap();
        let b = src.load("SPY").unwrap();
        assert_eq!(a, b);
        assert_eq!(dataset_hash("SPY", &a), dataset_hash("SPY", &b));
        assert_ne!(dataset_hash("SPY", &a), dataset_hash("QQQ", &a));
    }
}

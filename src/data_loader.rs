//! Market data ingestion
//!
//! Reads L2 book deltas and trade prints from CSV (with headers) or JSON Lines
//! into typed event vectors. Per-file timestamps must be non-decreasing.

use crate::backtest::clock::Nanos;
use crate::backtest::events::{BookEvent, BookEventKind, Side, TradeEvent};
use crate::config::{DataConfig, DataFormat};
use crate::error::{DataIngestionError, IngestionErrorKind};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

/// Inclusive event-time window applied after parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start_ns: Option<Nanos>,
    pub end_ns: Option<Nanos>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contains(&self, ts: Nanos) -> bool {
        self.start_ns.map_or(true, |s| ts >= s) && self.end_ns.map_or(true, |e| ts <= e)
    }
}

impl From<&DataConfig> for TimeRange {
    fn from(data: &DataConfig) -> Self {
        Self {
            start_ns: data.start_ts_ns,
            end_ns: data.end_ts_ns,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BookRecord {
    #[serde(alias = "timestamp", alias = "timestamp_ns")]
    ts: Nanos,
    side: String,
    price: f64,
    /// Optional for deletes.
    #[serde(default, alias = "qty", alias = "size")]
    quantity: Option<f64>,
    #[serde(alias = "kind", alias = "event_kind")]
    event: String,
}

#[derive(Debug, Deserialize)]
struct TradeRecord {
    #[serde(alias = "timestamp", alias = "timestamp_ns")]
    ts: Nanos,
    price: f64,
    #[serde(alias = "qty", alias = "size")]
    quantity: f64,
    #[serde(alias = "aggressor_side")]
    side: String,
}

trait Timestamped {
    fn ts(&self) -> Nanos;
}

impl Timestamped for BookRecord {
    fn ts(&self) -> Nanos {
        self.ts
    }
}

impl Timestamped for TradeRecord {
    fn ts(&self) -> Nanos {
        self.ts
    }
}

/// Parse every record of a file, numbering records from 1, and reject
/// timestamps that go backward.
fn read_records<T>(path: &Path, format: DataFormat) -> Result<Vec<(u64, T)>, DataIngestionError>
where
    T: DeserializeOwned + Timestamped,
{
    let file = File::open(path).map_err(|e| DataIngestionError::io(path, e))?;
    let mut records = Vec::new();

    match format {
        DataFormat::Csv => {
            let mut reader = csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .from_reader(BufReader::new(file));
            for (idx, row) in reader.deserialize::<T>().enumerate() {
                let record = idx as u64 + 1;
                let row = row.map_err(|e| DataIngestionError::parse(path, record, e.to_string()))?;
                records.push((record, row));
            }
        }
        DataFormat::Jsonl => {
            let mut record = 0u64;
            for line in BufReader::new(file).lines() {
                let line = line.map_err(|e| DataIngestionError::io(path, e))?;
                if line.trim().is_empty() {
                    continue;
                }
                record += 1;
                let row: T = serde_json::from_str(&line)
                    .map_err(|e| DataIngestionError::parse(path, record, e.to_string()))?;
                records.push((record, row));
            }
        }
    }

    let mut previous: Option<Nanos> = None;
    for (record, row) in &records {
        let ts = row.ts();
        if let Some(prev) = previous {
            if ts < prev {
                return Err(DataIngestionError {
                    path: path.to_path_buf(),
                    record: Some(*record),
                    kind: IngestionErrorKind::OutOfOrder {
                        previous: prev,
                        timestamp: ts,
                    },
                });
            }
        }
        previous = Some(ts);
    }
    Ok(records)
}

/// Load L2 book deltas.
pub fn load_book_events(
    path: &Path,
    format: DataFormat,
    range: TimeRange,
) -> Result<Vec<BookEvent>, DataIngestionError> {
    let records: Vec<(u64, BookRecord)> = read_records(path, format)?;
    let total = records.len();
    let mut events = Vec::with_capacity(total);

    for (record, row) in records {
        let side = Side::parse(&row.side).ok_or_else(|| {
            DataIngestionError::parse(path, record, format!("unknown side `{}`", row.side))
        })?;
        let kind = BookEventKind::parse(&row.event).ok_or_else(|| {
            DataIngestionError::parse(path, record, format!("unknown event `{}`", row.event))
        })?;
        if !range.contains(row.ts) {
            continue;
        }
        events.push(BookEvent {
            timestamp_ns: row.ts,
            side,
            price: row.price,
            quantity: row.quantity.unwrap_or(0.0),
            kind,
        });
    }

    debug!(
        path = %path.display(),
        records = total,
        kept = events.len(),
        "Loaded book events"
    );
    Ok(events)
}

/// Load trade prints. `side` names the aggressor.
pub fn load_trade_events(
    path: &Path,
    format: DataFormat,
    range: TimeRange,
) -> Result<Vec<TradeEvent>, DataIngestionError> {
    let records: Vec<(u64, TradeRecord)> = read_records(path, format)?;
    let total = records.len();
    let mut events = Vec::with_capacity(total);

    for (record, row) in records {
        let aggressor_side = Side::parse(&row.side).ok_or_else(|| {
            DataIngestionError::parse(path, record, format!("unknown side `{}`", row.side))
        })?;
        if !range.contains(row.ts) {
            continue;
        }
        events.push(TradeEvent {
            timestamp_ns: row.ts,
            price: row.price,
            quantity: row.quantity,
            aggressor_side,
        });
    }

    debug!(
        path = %path.display(),
        records = total,
        kept = events.len(),
        "Loaded trade events"
    );
    Ok(events)
}

/// Both input streams for one run.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    pub book: Vec<BookEvent>,
    pub trades: Vec<TradeEvent>,
}

impl MarketData {
    pub fn len(&self) -> usize {
        self.book.len() + self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.book.is_empty() && self.trades.is_empty()
    }
}

/// Load the configured book file and, if set, the trade file.
pub fn load_market_data(data: &DataConfig) -> anyhow::Result<MarketData> {
    let format = data.data_format()?;
    let range = TimeRange::from(data);
    let book = load_book_events(&data.lob_path, format, range)?;
    let trades = match &data.trades_path {
        Some(path) => load_trade_events(path, format, range)?,
        None => Vec::new(),
    };
    info!(
        symbol = %data.symbol,
        book_events = book.len(),
        trade_events = trades.len(),
        "Market data loaded"
    );
    Ok(MarketData { book, trades })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_csv_book_with_aliases() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "lob.csv",
            "timestamp,side,price,qty,kind\n\
             1,bid,99.5,2,add\n\
             2,A,100.5,3,update\n\
             3,sell,100.5,,remove\n",
        );
        let events = load_book_events(&path, DataFormat::Csv, TimeRange::all()).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].side, Side::Buy);
        assert_eq!(events[1].kind, BookEventKind::Modify);
        assert_eq!(events[2].kind, BookEventKind::Delete);
        assert_eq!(events[2].quantity, 0.0);
    }

    #[test]
    fn test_jsonl_trades_with_ts_alias() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "trades.jsonl",
            "{\"ts\": 5, \"price\": 100.0, \"size\": 1.5, \"aggressor_side\": \"buy\"}\n\
             \n\
             {\"timestamp\": 6, \"price\": 99.0, \"quantity\": 0.5, \"side\": \"s\"}\n",
        );
        let events = load_trade_events(&path, DataFormat::Jsonl, TimeRange::all()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].quantity, 1.5);
        assert_eq!(events[0].aggressor_side, Side::Buy);
        assert_eq!(events[1].aggressor_side, Side::Sell);
    }

    #[test]
    fn test_time_filter_is_inclusive() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "lob.csv",
            "ts,side,price,quantity,event\n\
             10,bid,1,1,add\n\
             20,bid,1,2,modify\n\
             30,bid,1,3,modify\n\
             40,bid,1,4,modify\n",
        );
        let range = TimeRange {
            start_ns: Some(20),
            end_ns: Some(30),
        };
        let events = load_book_events(&path, DataFormat::Csv, range).unwrap();
        let ts: Vec<_> = events.iter().map(|e| e.timestamp_ns).collect();
        assert_eq!(ts, vec![20, 30]);
    }

    #[test]
    fn test_out_of_order_names_file_and_record() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "lob.csv",
            "ts,side,price,quantity,event\n\
             20,bid,1,1,add\n\
             20,bid,1,1,modify\n\
             10,bid,1,1,modify\n",
        );
        let err = load_book_events(&path, DataFormat::Csv, TimeRange::all()).unwrap_err();
        assert_eq!(err.record, Some(3));
        assert_eq!(
            err.kind,
            IngestionErrorKind::OutOfOrder {
                previous: 20,
                timestamp: 10
            }
        );
        assert!(err.to_string().contains("lob.csv record 3"));
    }

    #[test]
    fn test_bad_records_are_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "lob.csv",
            "ts,side,price,quantity,event\n1,middle,1,1,add\n",
        );
        let err = load_book_events(&path, DataFormat::Csv, TimeRange::all()).unwrap_err();
        assert_eq!(err.record, Some(1));
        assert!(matches!(err.kind, IngestionErrorKind::Parse(_)));

        let missing = dir.path().join("missing.csv");
        let err = load_book_events(&missing, DataFormat::Csv, TimeRange::all()).unwrap_err();
        assert!(matches!(err.kind, IngestionErrorKind::Io(_)));
    }
}

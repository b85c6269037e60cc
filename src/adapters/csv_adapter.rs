//! CSV file market data adapter.
//!
//! Reads `{TICKER}_{interval}.csv` from a base directory. Columns are
//! matched by header name: a timestamp column (`timestamp`, `datetime` or
//! `date`), `open`, `high`, `low`, `close`, `volume`, and optionally any of
//! the indicator columns. When no indicator column is present the indicators
//! are derived from the OHLCV data.

use crate::domain::error::TraderError;
use crate::domain::indicator::enrich;
use crate::domain::ohlcv::{IndicatorBar, Indicators, OhlcvBar, parse_period};
use crate::ports::data_port::MarketDataPort;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const TIMESTAMP_COLUMNS: [&str; 3] = ["timestamp", "datetime", "date"];

const INDICATOR_COLUMNS: [&str; 10] = [
    "rsi",
    "macd",
    "macd_signal",
    "bollinger_upper",
    "bollinger_lower",
    "sma20",
    "adx",
    "stoch_k",
    "stoch_d",
    "volume_sma",
];

pub struct CsvAdapter {
    base_path: PathBuf,
}

fn data_err(reason: impl Into<String>) -> TraderError {
    TraderError::Data {
        reason: reason.into(),
    }
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, TraderError> {
    let s = raw.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%dT%H:%M:%S%:z"] {
        if let Ok(ts) = DateTime::parse_from_str(s, fmt) {
            return Ok(ts.naive_local());
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.naive_local());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| data_err(format!("invalid timestamp '{}'", raw)))
}

struct Columns {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
    indicators: Vec<Option<usize>>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self, TraderError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let require = |name: &str| find(name).ok_or_else(|| data_err(format!("missing {} column", name)));

        let timestamp = TIMESTAMP_COLUMNS
            .iter()
            .find_map(|&name| find(name))
            .ok_or_else(|| data_err("missing timestamp column"))?;

        Ok(Columns {
            timestamp,
            open: require("open")?,
            high: require("high")?,
            low: require("low")?,
            close: require("close")?,
            volume: require("volume")?,
            indicators: INDICATOR_COLUMNS.iter().map(|&name| find(name)).collect(),
        })
    }

    fn has_indicators(&self) -> bool {
        self.indicators.iter().any(Option::is_some)
    }
}

fn field<'r>(record: &'r StringRecord, idx: usize, name: &str) -> Result<&'r str, TraderError> {
    record
        .get(idx)
        .ok_or_else(|| data_err(format!("missing {} value", name)))
}

/// Required OHLCV cell; `NaN` and infinities are rejected like any other
/// unparseable value.
fn number(record: &StringRecord, idx: usize, name: &str) -> Result<f64, TraderError> {
    let raw = field(record, idx, name)?.trim();
    let value: f64 = raw
        .parse()
        .map_err(|e| data_err(format!("invalid {} value: {}", name, e)))?;
    if !value.is_finite() {
        return Err(data_err(format!("invalid {} value: '{}' is not finite", name, raw)));
    }
    Ok(value)
}

/// Empty or non-numeric cells (`NaN`, blanks) are undefined.
fn optional(record: &StringRecord, idx: Option<usize>) -> Option<f64> {
    let raw = record.get(idx?)?.trim();
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str, interval: &str) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", ticker.to_uppercase(), interval))
    }

    fn read_bars(&self, ticker: &str, interval: &str) -> Result<Vec<IndicatorBar>, TraderError> {
        let path = self.csv_path(ticker, interval);
        let content = fs::read_to_string(&path).map_err(|e| {
            TraderError::no_data(ticker, format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| data_err(format!("CSV header error: {}", e)))?
            .clone();
        let cols = Columns::from_headers(&headers)?;

        let mut raw = Vec::new();
        let mut indicators = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| data_err(format!("CSV parse error: {}", e)))?;

            let bar = OhlcvBar {
                timestamp: parse_timestamp(field(&record, cols.timestamp, "timestamp")?)?,
                open: number(&record, cols.open, "open")?,
                high: number(&record, cols.high, "high")?,
                low: number(&record, cols.low, "low")?,
                close: number(&record, cols.close, "close")?,
                volume: number(&record, cols.volume, "volume")?,
            };
            if bar.close <= 0.0 || bar.volume < 0.0 {
                return Err(data_err(format!(
                    "invalid bar at {}: close must be positive and volume non-negative",
                    bar.timestamp
                )));
            }
            if bar.volume == 0.0 {
                continue;
            }

            let ind = &cols.indicators;
            indicators.push(Indicators {
                rsi: optional(&record, ind[0]),
                macd: optional(&record, ind[1]),
                macd_signal: optional(&record, ind[2]),
                bollinger_upper: optional(&record, ind[3]),
                bollinger_lower: optional(&record, ind[4]),
                sma20: optional(&record, ind[5]),
                adx: optional(&record, ind[6]),
                stoch_k: optional(&record, ind[7]),
                stoch_d: optional(&record, ind[8]),
                volume_sma: optional(&record, ind[9]),
            });
            raw.push(bar);
        }

        let mut order: Vec<usize> = (0..raw.len()).collect();
        order.sort_by_key(|&i| raw[i].timestamp);
        order.dedup_by_key(|i| raw[*i].timestamp);
        let raw: Vec<OhlcvBar> = order.iter().map(|&i| raw[i].clone()).collect();

        if cols.has_indicators() {
            Ok(order
                .iter()
                .zip(&raw)
                .map(|(&i, bar)| IndicatorBar::from_ohlcv(bar, indicators[i].clone()))
                .collect())
        } else {
            debug!(ticker, bars = raw.len(), "deriving indicators from OHLCV");
            Ok(enrich(&raw))
        }
    }
}

impl MarketDataPort for CsvAdapter {
    fn fetch(
        &self,
        ticker: &str,
        period: &str,
        interval: &str,
    ) -> Result<Vec<IndicatorBar>, TraderError> {
        let lookback = parse_period(period)?;
        let mut bars = self.read_bars(ticker, interval)?;

        // A lookback reaching past the earliest representable time keeps everything.
        if let Some(cutoff) = lookback
            .zip(bars.last().map(|b| b.timestamp))
            .and_then(|(lookback, last)| last.checked_sub_signed(lookback))
        {
            bars.retain(|b| b.timestamp > cutoff);
        }
        if bars.is_empty() {
            return Err(TraderError::no_data(ticker, "no bars in requested period"));
        }
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let with_indicators = "timestamp,open,high,low,close,volume,rsi,macd,macd_signal\n\
            2024-01-15 09:30:00,100.0,110.0,90.0,105.0,50000,25.0,,\n\
            2024-01-15 09:45:00,105.0,115.0,100.0,110.0,60000,35.5,0.4,0.3\n\
            2024-01-15 10:00:00,110.0,120.0,105.0,115.0,0,40.0,0.5,0.3\n\
            2024-01-15 09:15:00,99.0,101.0,98.0,100.0,10000,NaN,,\n";
        fs::write(path.join("AAPL_15m.csv"), with_indicators).unwrap();

        let mut plain = String::from("Date,Open,High,Low,Close,Volume\n");
        for i in 0..28 {
            let close = 50.0 + (i as f64 * 0.5).sin() * 3.0;
            plain.push_str(&format!(
                "2024-02-{:02},{c},{h},{l},{c},{v}\n",
                i + 1,
                c = close,
                h = close + 1.0,
                l = close - 1.0,
                v = 1000 + i
            ));
        }
        fs::write(path.join("MSFT_1d.csv"), plain).unwrap();

        fs::write(
            path.join("BAD_15m.csv"),
            "timestamp,open,high,low,close,volume\n2024-01-15 09:30:00,1,1,1,-5,100\n",
        )
        .unwrap();

        (dir, path)
    }

    #[test]
    fn fetch_reads_indicator_columns() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let bars = adapter.fetch("aapl", "max", "15m").unwrap();

        // zero-volume bar dropped, rows sorted
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].close, 100.0);
        assert_eq!(bars[0].indicators.rsi, None);
        assert_eq!(bars[1].indicators.rsi, Some(25.0));
        assert_eq!(bars[1].indicators.macd, None);
        assert_eq!(bars[2].indicators.macd, Some(0.4));
        assert_eq!(bars[2].indicators.adx, None);
    }

    #[test]
    fn fetch_derives_indicators_without_columns() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let bars = adapter.fetch("MSFT", "max", "1d").unwrap();

        assert_eq!(bars.len(), 28);
        assert!(bars[0].indicators.rsi.is_none());
        assert!(bars.last().unwrap().indicators.rsi.is_some());
        assert!(bars.last().unwrap().indicators.sma20.is_some());
    }

    #[test]
    fn fetch_missing_file_is_no_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let result = adapter.fetch("XYZ", "max", "15m");
        assert!(matches!(result, Err(TraderError::NoData { .. })));
    }

    #[test]
    fn fetch_rejects_non_positive_close() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert!(matches!(
            adapter.fetch("BAD", "max", "15m"),
            Err(TraderError::Data { .. })
        ));
    }

    #[test]
    fn period_limits_lookback() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let bars = adapter.fetch("MSFT", "5d", "1d").unwrap();
        assert_eq!(bars.len(), 5);
        assert_eq!(bars[0].timestamp.date(), NaiveDate::from_ymd_opt(2024, 2, 24).unwrap());
    }

    #[test]
    fn huge_period_keeps_every_bar() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let bars = adapter.fetch("MSFT", "100000000y", "1d").unwrap();
        assert_eq!(bars.len(), 28);
    }

    #[test]
    fn overflowing_period_is_invalid_input() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert!(matches!(
            adapter.fetch("MSFT", "9223372036854775807y", "1d"),
            Err(TraderError::InvalidInput { .. })
        ));
    }

    #[test]
    fn non_finite_ohlcv_cells_are_rejected() {
        let dir = TempDir::new().unwrap();
        let header = "timestamp,open,high,low,close,volume\n";
        let cases = [
            ("NANCLOSE", "2024-01-15 09:30:00,1,1,1,NaN,100\n"),
            ("INFCLOSE", "2024-01-15 09:30:00,1,1,1,inf,100\n"),
            ("NANVOL", "2024-01-15 09:30:00,1,1,1,5,NaN\n"),
            ("NANOPEN", "2024-01-15 09:30:00,NaN,1,1,5,100\n"),
            ("TEXTCLOSE", "2024-01-15 09:30:00,1,1,1,five,100\n"),
        ];
        for (ticker, row) in cases {
            fs::write(dir.path().join(format!("{}_15m.csv", ticker)), format!("{}{}", header, row)).unwrap();
        }
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        for (ticker, _) in cases {
            assert!(
                matches!(adapter.fetch(ticker, "max", "15m"), Err(TraderError::Data { .. })),
                "{} should be rejected",
                ticker
            );
        }
    }

    #[test]
    fn parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-01-15 09:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-15T09:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-15 09:30:00-05:00").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2024-01-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert!(parse_timestamp("yesterday").is_err());
    }
}

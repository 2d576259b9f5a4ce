use crate::error::SinkError;
use crate::models::{EventKind, MarketEvent};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

pub fn header(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Liquidation => "Timestamp,Symbol,Side,Size,Price,USD_Value",
        EventKind::Trade => "Event Time, Symbol, Price, Quantity, Trade ID, Trade Time, Side",
        EventKind::Ticker => {
            "Timestamp,Symbol,LastPrice,24hChange%,24hHigh,24hLow,Volume24h,Turnover24h,OpenInterest,FundingRate,Bid1,Ask1"
        }
    }
}

/// Field tuple persisted for one event, in header order. Numbers use the
/// shortest round-trip representation, never display rounding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub kind: EventKind,
    pub fields: Vec<String>,
}

impl From<&MarketEvent> for LogRecord {
    fn from(event: &MarketEvent) -> Self {
        let fields = match event {
            MarketEvent::Liquidation(e) => vec![
                e.timestamp_ms.to_string(),
                e.symbol.clone(),
                e.side.as_str().to_string(),
                e.size.to_string(),
                e.price.to_string(),
                e.usd_notional().to_string(),
            ],
            MarketEvent::Trade(e) => vec![
                e.timestamp_ms.to_string(),
                e.symbol.clone(),
                e.price.to_string(),
                e.quantity.to_string(),
                e.trade_id.clone(),
                e.timestamp_ms.to_string(),
                e.side.as_str().to_string(),
            ],
            MarketEvent::Ticker(e) => vec![
                e.timestamp_ms.to_string(),
                e.symbol.clone(),
                e.last_price.to_string(),
                e.price_change_pct.to_string(),
                e.high_24h.to_string(),
                e.low_24h.to_string(),
                e.volume_24h.to_string(),
                e.turnover_24h.to_string(),
                e.open_interest.to_string(),
                e.funding_rate_pct.to_string(),
                e.bid1.to_string(),
                e.ask1.to_string(),
            ],
        };

        Self {
            kind: event.kind(),
            fields,
        }
    }
}

/// Append-only CSV log for one event kind.
///
/// The file is opened, written and closed inside every `append`, under a
/// lock, so concurrent callers never interleave bytes and nothing is held in
/// memory between calls.
pub struct CsvSink {
    kind: EventKind,
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>, kind: EventKind) -> Result<Self, SinkError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        if let Some(existing) = read_first_line(&path) {
            if existing != header(kind) {
                warn!(
                    "{} already exists with a different header; appending anyway\n  found:    {}\n  expected: {}",
                    path.display(),
                    existing,
                    header(kind)
                );
            }
        }

        Ok(Self {
            kind,
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &LogRecord) -> Result<(), SinkError> {
        let line = self.encode(record)?;

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;

        let is_empty = file
            .metadata()
            .map_err(|source| self.io_error(source))?
            .len()
            == 0;

        let mut buf = Vec::with_capacity(line.len() + 128);
        if is_empty {
            buf.extend_from_slice(header(self.kind).as_bytes());
            buf.push(b'\n');
        }
        buf.extend_from_slice(&line);

        file.write_all(&buf).map_err(|source| self.io_error(source))?;
        file.flush().map_err(|source| self.io_error(source))?;
        Ok(())
    }

    fn encode(&self, record: &LogRecord) -> Result<Vec<u8>, SinkError> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        wtr.write_record(&record.fields)
            .map_err(|source| SinkError::Csv {
                path: self.path.display().to_string(),
                source,
            })?;
        wtr.into_inner()
            .map_err(|e| self.io_error(e.into_error()))
    }

    fn io_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

fn read_first_line(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).ok()?;
    let line = line.trim_end_matches(['\r', '\n']);
    (!line.is_empty()).then(|| line.to_string())
}

use crate::models::EventKind;
use thiserror::Error;

/// A single event inside an envelope could not be turned into a typed event.
/// The event is skipped; siblings and the stream carry on.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("{kind} payload could not be decoded: {source}")]
    Decode {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("field `{field}` is not numeric: {value:?}")]
    NotNumeric { field: &'static str, value: String },

    #[error("field `{field}` is not finite: {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("field `{field}` must not be negative: {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("unknown side {0:?}")]
    UnknownSide(String),

    #[error("no timestamp in payload or envelope")]
    MissingTimestamp,

    #[error("timestamp {0} is out of range")]
    TimestampOutOfRange(i64),
}

/// Appending a record to an on-disk log failed.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// The audible alert could not be played.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("failed to spawn `{player}`: {source}")]
    Spawn {
        player: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sound `{0}` not found and no fallback available")]
    SoundNotFound(String),

    #[error("terminal bell failed: {0}")]
    Bell(#[source] std::io::Error),
}

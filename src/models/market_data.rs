use crate::error::EventError;
use crate::models::events::{
    EventKind, LiquidationEvent, MarketEvent, Side, TickerEvent, TradeEvent,
};
use chrono::DateTime;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

// Bybit sends most numerics as strings, but not all of them, and not always.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::custom("expected string or number")),
    }
}

fn millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| Error::custom(format!("timestamp {} is not an integer", n))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::custom(format!("timestamp {:?} is not an integer", s))),
        _ => Err(Error::custom("expected integer timestamp")),
    }
}

fn option_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    millis(deserializer).map(Some)
}

/// Liquidation payload. Field aliases cover both the legacy `liquidation.*`
/// mapping and the batched `allLiquidation.*` rows.
#[derive(Debug, Clone, Deserialize)]
pub struct LiquidationData {
    #[serde(alias = "s")]
    pub symbol: String,
    #[serde(alias = "S")]
    pub side: String,
    #[serde(alias = "v", deserialize_with = "string_or_number")]
    pub size: String,
    #[serde(alias = "p", deserialize_with = "string_or_number")]
    pub price: String,
    /// Per-row event time on batched rows.
    #[serde(rename = "T", default, deserialize_with = "option_millis")]
    pub event_time: Option<i64>,
    #[serde(rename = "updatedTime", default, deserialize_with = "option_millis")]
    pub updated_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeData {
    #[serde(rename = "T", deserialize_with = "millis")]
    pub trade_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "v", deserialize_with = "string_or_number")]
    pub quantity: String,
    #[serde(rename = "p", deserialize_with = "string_or_number")]
    pub price: String,
    #[serde(rename = "i", deserialize_with = "string_or_number")]
    pub trade_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickerData {
    pub symbol: String,
    #[serde(rename = "lastPrice", deserialize_with = "string_or_number")]
    pub last_price: String,
    #[serde(rename = "price24hPcnt", deserialize_with = "string_or_number")]
    pub price_24h_pcnt: String,
    #[serde(rename = "highPrice24h", deserialize_with = "string_or_number")]
    pub high_price_24h: String,
    #[serde(rename = "lowPrice24h", deserialize_with = "string_or_number")]
    pub low_price_24h: String,
    #[serde(rename = "volume24h", deserialize_with = "string_or_number")]
    pub volume_24h: String,
    #[serde(rename = "turnover24h", deserialize_with = "string_or_number")]
    pub turnover_24h: String,
    #[serde(rename = "openInterest", deserialize_with = "string_or_number")]
    pub open_interest: String,
    #[serde(rename = "fundingRate", deserialize_with = "string_or_number")]
    pub funding_rate: String,
    #[serde(rename = "bid1Price", deserialize_with = "string_or_number")]
    pub bid1: String,
    #[serde(rename = "ask1Price", deserialize_with = "string_or_number")]
    pub ask1: String,
}

fn parse_number(field: &'static str, raw: &str) -> Result<f64, EventError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| EventError::NotNumeric {
            field,
            value: raw.to_string(),
        })?;

    if !value.is_finite() {
        return Err(EventError::NotFinite { field, value });
    }
    Ok(value)
}

fn parse_magnitude(field: &'static str, raw: &str) -> Result<f64, EventError> {
    let value = parse_number(field, raw)?;
    if value < 0.0 {
        return Err(EventError::Negative { field, value });
    }
    Ok(value)
}

fn check_timestamp(ts: i64) -> Result<i64, EventError> {
    DateTime::from_timestamp_millis(ts)
        .map(|_| ts)
        .ok_or(EventError::TimestampOutOfRange(ts))
}

fn decode<T: for<'de> Deserialize<'de>>(kind: EventKind, item: &Value) -> Result<T, EventError> {
    T::deserialize(item).map_err(|source| EventError::Decode { kind, source })
}

/// Turns one payload item into a typed event. Fails closed: any missing or
/// unparseable field rejects the whole event.
pub fn normalize(
    kind: EventKind,
    envelope_ts: Option<i64>,
    item: &Value,
) -> Result<MarketEvent, EventError> {
    match kind {
        EventKind::Liquidation => {
            let data: LiquidationData = decode(kind, item)?;
            // Legacy mappings have no row time of their own and take the push time.
            let timestamp_ms = data
                .event_time
                .or(envelope_ts)
                .or(data.updated_time)
                .ok_or(EventError::MissingTimestamp)?;

            Ok(MarketEvent::Liquidation(LiquidationEvent {
                timestamp_ms: check_timestamp(timestamp_ms)?,
                side: Side::from_wire(&data.side)?,
                size: parse_magnitude("size", &data.size)?,
                price: parse_magnitude("price", &data.price)?,
                symbol: data.symbol,
            }))
        }
        EventKind::Trade => {
            let data: TradeData = decode(kind, item)?;

            Ok(MarketEvent::Trade(TradeEvent {
                timestamp_ms: check_timestamp(data.trade_time)?,
                side: Side::from_wire(&data.side)?,
                price: parse_magnitude("price", &data.price)?,
                quantity: parse_magnitude("quantity", &data.quantity)?,
                trade_id: data.trade_id,
                symbol: data.symbol,
            }))
        }
        EventKind::Ticker => {
            let data: TickerData = decode(kind, item)?;
            let timestamp_ms = envelope_ts.ok_or(EventError::MissingTimestamp)?;

            Ok(MarketEvent::Ticker(TickerEvent {
                timestamp_ms: check_timestamp(timestamp_ms)?,
                last_price: parse_number("lastPrice", &data.last_price)?,
                // Fractions on the wire, percentages everywhere downstream.
                price_change_pct: parse_number("price24hPcnt", &data.price_24h_pcnt)? * 100.0,
                high_24h: parse_number("highPrice24h", &data.high_price_24h)?,
                low_24h: parse_number("lowPrice24h", &data.low_price_24h)?,
                volume_24h: parse_number("volume24h", &data.volume_24h)?,
                turnover_24h: parse_number("turnover24h", &data.turnover_24h)?,
                open_interest: parse_number("openInterest", &data.open_interest)?,
                funding_rate_pct: parse_number("fundingRate", &data.funding_rate)? * 100.0,
                bid1: parse_number("bid1Price", &data.bid1)?,
                ask1: parse_number("ask1Price", &data.ask1)?,
                symbol: data.symbol,
            }))
        }
    }
}

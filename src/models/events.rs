use crate::error::EventError;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Liquidation,
    Trade,
    Ticker,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Liquidation, EventKind::Trade, EventKind::Ticker];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Liquidation => "liquidation",
            EventKind::Trade => "trade",
            EventKind::Ticker => "ticker",
        }
    }

    /// Topic prefixes the exchange uses for this kind.
    pub fn topic_prefixes(self) -> &'static [&'static str] {
        match self {
            EventKind::Liquidation => &["liquidation", "allLiquidation"],
            EventKind::Trade => &["publicTrade"],
            EventKind::Ticker => &["tickers"],
        }
    }

    pub fn default_topic(self) -> &'static str {
        match self {
            EventKind::Liquidation => "allLiquidation",
            EventKind::Trade => "publicTrade",
            EventKind::Ticker => "tickers",
        }
    }

    pub fn matches_topic(self, topic: &str) -> bool {
        self.topic_prefixes().iter().any(|p| topic.starts_with(p))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn from_wire(raw: &str) -> Result<Self, EventError> {
        match raw {
            "Buy" => Ok(Side::Buy),
            "Sell" => Ok(Side::Sell),
            other => Err(EventError::UnknownSide(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }
}

/// Decoded message as delivered by the transport.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope {
    pub topic: String,
    #[serde(default)]
    pub ts: Option<i64>,
    /// `snapshot` or `delta` where the exchange says so.
    #[serde(rename = "type", default)]
    pub frame_type: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl RawEnvelope {
    /// Logical events carried by this envelope: one for a mapping, one per
    /// element for a batch.
    pub fn items(&self) -> Vec<&Value> {
        match &self.data {
            Value::Array(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }
}

/// Forced closure reported by the exchange.
///
/// `price` is the bankruptcy price, so `usd_notional` is an approximation of
/// the liquidated value rather than the executed fill value.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationEvent {
    pub symbol: String,
    pub timestamp_ms: i64,
    pub side: Side,
    pub size: f64,
    pub price: f64,
}

impl LiquidationEvent {
    pub fn usd_notional(&self) -> f64 {
        self.price * self.size
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeEvent {
    pub symbol: String,
    pub timestamp_ms: i64,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub trade_id: String,
}

impl TradeEvent {
    pub fn usd_notional(&self) -> f64 {
        self.price * self.quantity
    }
}

/// 24h ticker snapshot. Change and funding are percentages.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerEvent {
    pub symbol: String,
    pub timestamp_ms: i64,
    pub last_price: f64,
    pub price_change_pct: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub volume_24h: f64,
    pub turnover_24h: f64,
    pub open_interest: f64,
    pub funding_rate_pct: f64,
    pub bid1: f64,
    pub ask1: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Liquidation(LiquidationEvent),
    Trade(TradeEvent),
    Ticker(TickerEvent),
}

impl MarketEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MarketEvent::Liquidation(_) => EventKind::Liquidation,
            MarketEvent::Trade(_) => EventKind::Trade,
            MarketEvent::Ticker(_) => EventKind::Ticker,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Liquidation(e) => &e.symbol,
            MarketEvent::Trade(e) => &e.symbol,
            MarketEvent::Ticker(e) => &e.symbol,
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        match self {
            MarketEvent::Liquidation(e) => e.timestamp_ms,
            MarketEvent::Trade(e) => e.timestamp_ms,
            MarketEvent::Ticker(e) => e.timestamp_ms,
        }
    }

    /// Magnitude used for tiering. Tickers have none.
    pub fn usd_notional(&self) -> Option<f64> {
        match self {
            MarketEvent::Liquidation(e) => Some(e.usd_notional()),
            MarketEvent::Trade(e) => Some(e.usd_notional()),
            MarketEvent::Ticker(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn topic_filtering_by_prefix() {
        assert!(EventKind::Liquidation.matches_topic("liquidation.BTCUSDT"));
        assert!(EventKind::Liquidation.matches_topic("allLiquidation.ETHUSDT"));
        assert!(EventKind::Trade.matches_topic("publicTrade.BTCUSDT"));
        assert!(EventKind::Ticker.matches_topic("tickers.BTCUSDT"));

        assert!(!EventKind::Trade.matches_topic("tickers.BTCUSDT"));
        assert!(!EventKind::Ticker.matches_topic("orderbook.50.BTCUSDT"));
    }

    #[test]
    fn envelope_items_handle_single_and_batched_payloads() {
        let single: RawEnvelope =
            serde_json::from_value(json!({ "topic": "tickers.BTCUSDT", "ts": 1, "data": { "symbol": "BTCUSDT" } }))
                .unwrap();
        assert_eq!(single.items().len(), 1);

        let batch: RawEnvelope =
            serde_json::from_value(json!({ "topic": "publicTrade.BTCUSDT", "data": [{}, {}, {}] })).unwrap();
        assert_eq!(batch.items().len(), 3);
        assert_eq!(batch.ts, None);

        let empty: RawEnvelope = serde_json::from_value(json!({ "topic": "publicTrade.BTCUSDT" })).unwrap();
        assert!(empty.items().is_empty());
    }
}

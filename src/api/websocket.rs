use crate::models::RawEnvelope;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Bybit caps the number of args per subscribe request.
const MAX_ARGS_PER_SUBSCRIBE: usize = 10;

pub struct BybitWebSocketClient {
    ws_url: String,
    topics: Vec<String>,
    ping_interval: Duration,
    max_reconnect_delay: Duration,
}

impl BybitWebSocketClient {
    pub fn new(
        ws_url: String,
        topics: Vec<String>,
        ping_interval: Duration,
        max_reconnect_delay: Duration,
    ) -> Self {
        Self {
            ws_url,
            topics,
            ping_interval,
            max_reconnect_delay,
        }
    }

    pub async fn run(self, event_tx: mpsc::UnboundedSender<RawEnvelope>) -> Result<()> {
        let initial_delay = Duration::from_secs(1);
        let mut reconnect_delay = initial_delay;

        loop {
            info!("Connecting to WebSocket: {}", self.ws_url);

            match self.connect_and_run(&event_tx).await {
                Ok(true) => {
                    warn!("WebSocket connection closed");
                    reconnect_delay = initial_delay;
                }
                Ok(false) => {
                    info!("Event receiver dropped, stopping WebSocket client");
                    return Ok(());
                }
                Err(e) => {
                    error!("WebSocket error: {:?}", e);
                }
            }

            info!("Reconnecting in {:?}...", reconnect_delay);
            sleep(reconnect_delay).await;

            reconnect_delay = std::cmp::min(reconnect_delay * 2, self.max_reconnect_delay);
        }
    }

    /// Returns `Ok(false)` once nobody is listening for envelopes.
    async fn connect_and_run(&self, event_tx: &mpsc::UnboundedSender<RawEnvelope>) -> Result<bool> {
        let (ws_stream, _) = connect_async(&self.ws_url).await?;
        info!("WebSocket connected successfully");

        let (write, mut read) = ws_stream.split();

        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Message>();

        let write_handle = tokio::spawn(async move {
            let mut write = write;
            while let Some(msg) = write_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    error!("Failed to send message: {:?}", e);
                    break;
                }
            }
        });

        for chunk in self.topics.chunks(MAX_ARGS_PER_SUBSCRIBE) {
            let subscribe = json!({
                "op": "subscribe",
                "args": chunk,
            });
            write_tx.send(Message::Text(subscribe.to_string()))?;
        }

        info!("Subscribed to {} topics", self.topics.len());

        let ping_tx = write_tx.clone();
        let ping_interval = self.ping_interval;
        let heartbeat_handle = tokio::spawn(async move {
            let mut ticker = interval(ping_interval);
            loop {
                ticker.tick().await;
                let ping = json!({"op": "ping"});
                if ping_tx.send(Message::Text(ping.to_string())).is_err() {
                    break;
                }
            }
        });

        // Snapshots do not survive a reconnect; the server resends them.
        let mut snapshots = SnapshotCache::default();
        let mut listening = true;
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match decode_envelope(&text) {
                    Ok(Some(envelope)) => {
                        if let Some(envelope) = snapshots.apply(envelope) {
                            if event_tx.send(envelope).is_err() {
                                listening = false;
                                break;
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Failed to decode message: {:?}", e),
                },
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Handled automatically by tungstenite
                }
                Ok(Message::Close(_)) => {
                    warn!("WebSocket closed by server");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {:?}", e);
                    break;
                }
                _ => {}
            }
        }

        heartbeat_handle.abort();
        write_handle.abort();
        Ok(listening)
    }
}

/// Latest full mapping per topic, for streams that push one `snapshot` and
/// then partial `delta` frames (linear tickers). Every envelope leaving the
/// cache carries the complete merged mapping.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    topics: HashMap<String, Map<String, Value>>,
}

impl SnapshotCache {
    /// Returns `None` for a delta that arrives before its topic's snapshot.
    pub fn apply(&mut self, mut envelope: RawEnvelope) -> Option<RawEnvelope> {
        let Value::Object(fields) = &envelope.data else {
            return Some(envelope);
        };

        match envelope.frame_type.as_deref() {
            Some("snapshot") => {
                self.topics.insert(envelope.topic.clone(), fields.clone());
            }
            Some("delta") => {
                let Some(merged) = self.topics.get_mut(&envelope.topic) else {
                    debug!("Dropping delta on {} received before its snapshot", envelope.topic);
                    return None;
                };
                for (key, value) in fields {
                    merged.insert(key.clone(), value.clone());
                }
                envelope.data = Value::Object(merged.clone());
            }
            _ => {}
        }
        Some(envelope)
    }
}

/// Data frames carry a `topic`; everything else is a control frame
/// (subscribe ack, pong) and yields `None`.
pub fn decode_envelope(text: &str) -> Result<Option<RawEnvelope>> {
    let value: Value = serde_json::from_str(text)?;

    if value.get("topic").is_none() {
        match value.get("op").and_then(Value::as_str) {
            Some("subscribe") if value.get("success").and_then(Value::as_bool) == Some(false) => {
                warn!(
                    "Subscription rejected: {}",
                    value.get("ret_msg").and_then(serde_json::Value::as_str).unwrap_or("unknown reason")
                );
            }
            Some(op) => debug!("Control frame: {}", op),
            None => debug!("Ignoring frame without topic"),
        }
        return Ok(None);
    }

    Ok(Some(serde_json::from_value(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_becomes_envelope() {
        let text = r#"{"topic":"publicTrade.BTCUSDT","type":"snapshot","ts":1700000000100,"data":[{"T":1700000000000,"s":"BTCUSDT","S":"Buy","v":"0.25","p":"100.5","i":"abc-123","BT":false}]}"#;
        let envelope = decode_envelope(text).unwrap().unwrap();
        assert_eq!(envelope.topic, "publicTrade.BTCUSDT");
        assert_eq!(envelope.ts, Some(1700000000100));
        assert_eq!(envelope.items().len(), 1);
    }

    #[test]
    fn control_frames_are_skipped() {
        let ack = r#"{"success":true,"ret_msg":"","conn_id":"x","op":"subscribe"}"#;
        let pong = r#"{"success":true,"ret_msg":"pong","conn_id":"x","op":"ping"}"#;
        assert!(decode_envelope(ack).unwrap().is_none());
        assert!(decode_envelope(pong).unwrap().is_none());
    }

    #[test]
    fn ticker_delta_is_merged_into_snapshot() {
        let mut cache = SnapshotCache::default();
        let snapshot = decode_envelope(
            r#"{"topic":"tickers.BTCUSDT","type":"snapshot","ts":1,"data":{"symbol":"BTCUSDT","lastPrice":"43000","fundingRate":"0.0001"}}"#,
        )
        .unwrap()
        .unwrap();
        let delta = decode_envelope(
            r#"{"topic":"tickers.BTCUSDT","type":"delta","ts":2,"data":{"symbol":"BTCUSDT","lastPrice":"43500"}}"#,
        )
        .unwrap()
        .unwrap();

        cache.apply(snapshot).unwrap();
        let merged = cache.apply(delta).unwrap();
        assert_eq!(merged.ts, Some(2));
        assert_eq!(merged.data["lastPrice"], "43500");
        assert_eq!(merged.data["fundingRate"], "0.0001");
    }

    #[test]
    fn delta_before_snapshot_is_dropped() {
        let mut cache = SnapshotCache::default();
        let delta = decode_envelope(
            r#"{"topic":"tickers.ETHUSDT","type":"delta","ts":2,"data":{"symbol":"ETHUSDT","lastPrice":"2100"}}"#,
        )
        .unwrap()
        .unwrap();
        assert!(cache.apply(delta).is_none());
    }

    #[test]
    fn batched_frames_pass_through() {
        let mut cache = SnapshotCache::default();
        let text = r#"{"topic":"allLiquidation.BTCUSDT","type":"snapshot","ts":1,"data":[{"T":1,"s":"BTCUSDT","S":"Buy","v":"1","p":"1"}]}"#;
        let envelope = cache.apply(decode_envelope(text).unwrap().unwrap()).unwrap();
        assert_eq!(envelope.items().len(), 1);
        assert!(cache.topics.is_empty());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_envelope("not json").is_err());
    }
}

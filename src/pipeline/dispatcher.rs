use crate::config::Config;
use crate::export::{CsvSink, LogRecord};
use crate::models::{normalize, EventKind, MarketEvent, RawEnvelope};
use crate::pipeline::alert::AlertDispatcher;
use crate::pipeline::render::LineFormatter;
use crate::pipeline::severity::SeverityTable;
use crate::utils::Console;
use std::collections::HashMap;
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome counts for one or more envelopes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub processed: usize,
    pub malformed: usize,
    pub persist_failures: usize,
    pub alerts: usize,
}

impl AddAssign for DispatchReport {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.malformed += rhs.malformed;
        self.persist_failures += rhs.persist_failures;
        self.alerts += rhs.alerts;
    }
}

/// Entry point the transport calls once per message.
///
/// Holds no per-call state, so it is safe to share across threads; the only
/// cross-call synchronisation is inside each `CsvSink`.
pub struct StreamDispatcher {
    severity: SeverityTable,
    formatter: LineFormatter,
    alerts: AlertDispatcher,
    sinks: HashMap<EventKind, CsvSink>,
    display_floors: HashMap<EventKind, f64>,
    console: Arc<dyn Console>,
}

impl StreamDispatcher {
    pub fn new(
        severity: SeverityTable,
        formatter: LineFormatter,
        alerts: AlertDispatcher,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            severity,
            formatter,
            alerts,
            sinks: HashMap::new(),
            display_floors: HashMap::new(),
            console,
        }
    }

    /// Enables the sink's kind.
    pub fn with_sink(mut self, sink: CsvSink) -> Self {
        self.sinks.insert(sink.kind(), sink);
        self
    }

    /// Hides events of `kind` under `min_usd` from the console only.
    pub fn with_display_floor(mut self, kind: EventKind, min_usd: f64) -> Self {
        self.display_floors.insert(kind, min_usd);
        self
    }

    pub fn from_config(config: &Config, console: Arc<dyn Console>) -> anyhow::Result<Self> {
        let mut dispatcher = Self::new(
            SeverityTable::from_config(config),
            LineFormatter::new(config.timezone()?, &config.display.quote_suffix),
            AlertDispatcher::from_config(config),
            console,
        );

        for kind in &config.stream.kinds {
            dispatcher = dispatcher.with_sink(CsvSink::new(config.log_path_for(*kind), *kind)?);

            let min_usd = config.kind(*kind).min_display_usd;
            if min_usd > 0.0 {
                dispatcher = dispatcher.with_display_floor(*kind, min_usd);
            }
        }
        Ok(dispatcher)
    }

    pub fn kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.sinks.keys().copied()
    }

    pub fn sinks(&self) -> impl Iterator<Item = &CsvSink> + '_ {
        self.sinks.values()
    }

    /// Routes an envelope to whichever enabled kind claims its topic.
    pub fn dispatch(&self, envelope: &RawEnvelope) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut claimed = false;
        for kind in self.kinds() {
            if kind.matches_topic(&envelope.topic) {
                claimed = true;
                report += self.on_event(kind, envelope);
            }
        }
        if !claimed {
            debug!("Ignoring envelope on topic {}", envelope.topic);
        }
        report
    }

    /// Processes every event in `envelope` as `kind`. Envelopes for other
    /// topics are ignored; a bad event never stops its siblings.
    pub fn on_event(&self, kind: EventKind, envelope: &RawEnvelope) -> DispatchReport {
        let mut report = DispatchReport::default();
        if !kind.matches_topic(&envelope.topic) {
            return report;
        }
        let Some(sink) = self.sinks.get(&kind) else {
            return report;
        };

        for item in envelope.items() {
            match normalize(kind, envelope.ts, item) {
                Ok(event) => self.process(&event, sink, &mut report),
                Err(e) => {
                    report.malformed += 1;
                    warn!("Skipping malformed {} event on {}: {}", kind, envelope.topic, e);
                }
            }
        }
        report
    }

    fn process(&self, event: &MarketEvent, sink: &CsvSink, report: &mut DispatchReport) {
        let severity = self.severity.assess(event);
        if self.is_displayed(event) {
            self.console.emit(&self.formatter.format(event, severity));
        }

        if self.alerts.maybe_alert(event.kind(), severity.tier) {
            report.alerts += 1;
        }

        // Best effort: display and alerting have already happened.
        if let Err(e) = sink.append(&LogRecord::from(event)) {
            report.persist_failures += 1;
            warn!("Failed to persist {} event for {}: {}", event.kind(), event.symbol(), e);
        }
        report.processed += 1;
    }

    fn is_displayed(&self, event: &MarketEvent) -> bool {
        match (self.display_floors.get(&event.kind()), event.usd_notional()) {
            (Some(min_usd), Some(usd)) => usd >= *min_usd,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AlertError;
    use crate::pipeline::alert::SoundPlayer;
    use crate::pipeline::render::{DisplayLine, Tint};
    use crate::pipeline::severity::{Breakpoints, Classification, Tier};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Captured {
        lines: Mutex<Vec<DisplayLine>>,
    }

    impl Console for Captured {
        fn emit(&self, line: &DisplayLine) {
            self.lines.lock().unwrap().push(line.clone());
        }
    }

    #[derive(Default)]
    struct Recorder {
        played: Mutex<Vec<String>>,
    }

    impl SoundPlayer for Recorder {
        fn play(&self, sound: &str) -> Result<(), AlertError> {
            self.played.lock().unwrap().push(sound.to_string());
            Ok(())
        }
    }

    struct Harness {
        dispatcher: StreamDispatcher,
        console: Arc<Captured>,
        sounds: Arc<Recorder>,
        dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let console = Arc::new(Captured::default());
        let sounds = Arc::new(Recorder::default());

        let severity = SeverityTable::new()
            .with(EventKind::Liquidation, Classification::Notional(Breakpoints::default()))
            .with(EventKind::Trade, Classification::Notional(Breakpoints::default()))
            .with(EventKind::Ticker, Classification::Move { notable_pct: 2.0 });
        let alerts = AlertDispatcher::new(sounds.clone(), "Sosumi")
            .with_floor(EventKind::Liquidation, Tier::Normal);

        let dispatcher = StreamDispatcher::new(
            severity,
            LineFormatter::new(chrono_tz::America::New_York, "USDT"),
            alerts,
            console.clone(),
        )
        .with_sink(CsvSink::new(dir.path().join("liq.csv"), EventKind::Liquidation).unwrap())
        .with_sink(CsvSink::new(dir.path().join("trades.csv"), EventKind::Trade).unwrap())
        .with_sink(CsvSink::new(dir.path().join("tickers.csv"), EventKind::Ticker).unwrap());

        Harness {
            dispatcher,
            console,
            sounds,
            dir,
        }
    }

    fn envelope(value: serde_json::Value) -> RawEnvelope {
        serde_json::from_value(value).unwrap()
    }

    fn rows(h: &Harness, file: &str) -> Vec<String> {
        std::fs::read_to_string(h.dir.path().join(file))
            .unwrap_or_default()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn large_short_liquidation_alerts_and_persists() {
        let h = harness();
        let report = h.dispatcher.on_event(
            EventKind::Liquidation,
            &envelope(json!({
                "topic": "liquidation.BTCUSDT",
                "ts": 1700000000000i64,
                "data": { "updatedTime": 1700000000000i64, "symbol": "BTCUSDT", "side": "Sell", "size": "12.5", "price": "42000" }
            })),
        );

        assert_eq!(report.processed, 1);
        assert_eq!(report.alerts, 1);

        let lines = h.console.lines.lock().unwrap();
        assert!(lines[0].text.starts_with(" **"));
        assert!(lines[0].text.contains("SHORT"));
        assert_eq!(lines[0].tint, Tint::Red);
        assert_eq!(*h.sounds.played.lock().unwrap(), vec!["Sosumi"]);
        assert_eq!(rows(&h, "liq.csv"), vec!["1700000000000,BTCUSDT,Sell,12.5,42000,525000"]);
    }

    #[test]
    fn small_trade_is_persisted_without_alert() {
        let h = harness();
        let report = h.dispatcher.dispatch(&envelope(json!({
            "topic": "publicTrade.BTCUSDT",
            "ts": 1700000000100i64,
            "data": [{ "T": 1700000000000i64, "s": "BTCUSDT", "S": "Buy", "v": "0.1", "p": "50000", "i": "t-1" }]
        })));

        assert_eq!(report, DispatchReport { processed: 1, alerts: 0, ..Default::default() });
        assert!(h.sounds.played.lock().unwrap().is_empty());
        assert_eq!(
            rows(&h, "trades.csv"),
            vec!["1700000000000,BTCUSDT,50000,0.1,t-1,1700000000000,Buy"]
        );
    }

    #[test]
    fn trades_under_display_floor_are_persisted_but_not_printed() {
        let Harness { dispatcher, console, dir, .. } = harness();
        let dispatcher = dispatcher.with_display_floor(EventKind::Trade, 5000.0);

        let report = dispatcher.dispatch(&envelope(json!({
            "topic": "publicTrade.BTCUSDT",
            "ts": 1700000000100i64,
            "data": [
                { "T": 1700000000000i64, "s": "BTCUSDT", "S": "Buy", "v": "0.01", "p": "50000", "i": "small" },
                { "T": 1700000000001i64, "s": "BTCUSDT", "S": "Sell", "v": "0.1", "p": "50000", "i": "at-floor" }
            ]
        })));

        assert_eq!(report.processed, 2);
        let lines = console.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].text.contains("($5,000.00)"));

        let persisted = std::fs::read_to_string(dir.path().join("trades.csv")).unwrap();
        assert_eq!(persisted.lines().count(), 3);
        assert!(persisted.contains(",small,"));
    }

    #[test]
    fn malformed_event_does_not_stop_siblings() {
        let h = harness();
        let report = h.dispatcher.dispatch(&envelope(json!({
            "topic": "publicTrade.ETHUSDT",
            "data": [
                { "T": 1, "s": "ETHUSDT", "S": "Buy", "v": "1", "p": "2000", "i": "a" },
                { "T": 2, "s": "ETHUSDT", "S": "Sell", "p": "2000", "i": "b" },
                { "T": 3, "s": "ETHUSDT", "S": "Sell", "v": "x", "p": "2000", "i": "c" },
                { "T": 4, "s": "ETHUSDT", "S": "Sell", "v": "2", "p": "2000", "i": "d" }
            ]
        })));

        assert_eq!(report.processed, 2);
        assert_eq!(report.malformed, 2);
        let persisted = rows(&h, "trades.csv");
        assert_eq!(persisted.len(), 2);
        assert!(persisted[0].contains(",a,"));
        assert!(persisted[1].contains(",d,"));
    }

    #[test]
    fn foreign_topics_are_ignored() {
        let h = harness();
        let env = envelope(json!({ "topic": "orderbook.50.BTCUSDT", "data": { "b": [] } }));
        assert_eq!(h.dispatcher.dispatch(&env), DispatchReport::default());
        assert_eq!(
            h.dispatcher.on_event(EventKind::Trade, &envelope(json!({ "topic": "tickers.BTCUSDT", "data": {} }))),
            DispatchReport::default()
        );
        assert!(h.console.lines.lock().unwrap().is_empty());
    }

    #[test]
    fn notable_ticker_move_is_bold_green_without_alert() {
        let h = harness();
        let report = h.dispatcher.dispatch(&envelope(json!({
            "topic": "tickers.BTCUSDT",
            "ts": 1700000000000i64,
            "data": {
                "symbol": "BTCUSDT", "lastPrice": "43000.5", "price24hPcnt": "0.025",
                "highPrice24h": "44000", "lowPrice24h": "41000", "volume24h": "100",
                "turnover24h": "4300000", "openInterest": "55000", "fundingRate": "0.0001",
                "bid1Price": "43000.4", "ask1Price": "43000.6"
            }
        })));

        assert_eq!(report.processed, 1);
        assert_eq!(report.alerts, 0);
        let lines = h.console.lines.lock().unwrap();
        assert_eq!(lines[0].tint, Tint::Green);
        assert!(lines[0].bold);
        assert_eq!(rows(&h, "tickers.csv").len(), 1);
    }

    #[test]
    fn persistence_failure_does_not_block_display_or_alert() {
        let Harness { dispatcher, console, dir, .. } = harness();
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        let dispatcher = dispatcher.with_sink(CsvSink::new(&blocked, EventKind::Liquidation).unwrap());

        let report = dispatcher.dispatch(&envelope(json!({
            "topic": "allLiquidation.BTCUSDT",
            "ts": 1700000000000i64,
            "data": [{ "T": 1700000000000i64, "s": "BTCUSDT", "S": "Buy", "v": "30", "p": "42000" }]
        })));

        assert_eq!(report.processed, 1);
        assert_eq!(report.persist_failures, 1);
        assert_eq!(report.alerts, 1);
        assert_eq!(console.lines.lock().unwrap().len(), 1);
    }
}

use crate::models::EventKind;
use crate::pipeline::Tier;
use anyhow::{anyhow, bail, Context};
use chrono_tz::Tz;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_WS_URL: &str = "wss://stream.bybit.com/v5/public/linear";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub display: DisplayConfig,
    pub alert: AlertConfig,
    pub persistence: PersistenceConfig,
    pub kinds: KindsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub ws_url: String,
    pub symbols: Vec<String>,
    pub kinds: Vec<EventKind>,
    pub ping_interval_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            symbols: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
                "FETUSDT".to_string(),
            ],
            kinds: vec![EventKind::Liquidation],
            ping_interval_secs: 20,
            max_reconnect_delay_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// IANA zone name used for every rendered timestamp.
    pub timezone: String,
    /// Quote currency stripped from symbols on screen.
    pub quote_suffix: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            quote_suffix: "USDT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPlayer {
    /// macOS `afplay` with system sounds.
    Afplay,
    /// Terminal bell on stdout.
    Bell,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    pub player: AlertPlayer,
    pub sound: String,
    pub fallback_sound: String,
    pub sound_dir: String,
    /// Suppress alerts for the same kind within this window. 0 alerts on every
    /// qualifying event.
    pub coalesce_window_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            player: AlertPlayer::Afplay,
            sound: "Sosumi".to_string(),
            fallback_sound: "Ping".to_string(),
            sound_dir: "/System/Library/Sounds".to_string(),
            coalesce_window_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub log_dir: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            log_dir: ".".to_string(),
        }
    }
}

/// Lowest tier that does NOT alert; alerts fire strictly above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertFloor {
    Never,
    Normal,
    Elevated,
    High,
}

impl AlertFloor {
    pub fn tier(self) -> Option<Tier> {
        match self {
            AlertFloor::Never => None,
            AlertFloor::Normal => Some(Tier::Normal),
            AlertFloor::Elevated => Some(Tier::Elevated),
            AlertFloor::High => Some(Tier::High),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KindsConfig {
    pub liquidation: KindConfig,
    pub trade: KindConfig,
    pub ticker: KindConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KindConfig {
    /// Subscription topic prefix; the symbol is appended as `<topic>.<SYMBOL>`.
    pub topic: Option<String>,
    /// Overrides `stream.symbols` for this kind.
    pub symbols: Option<Vec<String>>,
    pub elevated_usd: f64,
    pub high_usd: f64,
    pub extreme_usd: f64,
    pub notable_move_pct: f64,
    /// Events below this USD notional are persisted but not printed.
    pub min_display_usd: f64,
    pub alert_above: Option<AlertFloor>,
    pub log_file: Option<String>,
}

impl Default for KindConfig {
    fn default() -> Self {
        Self {
            topic: None,
            symbols: None,
            elevated_usd: 100_000.0,
            high_usd: 500_000.0,
            extreme_usd: 1_000_000.0,
            notable_move_pct: 2.0,
            min_display_usd: 0.0,
            alert_above: None,
            log_file: None,
        }
    }
}

impl KindConfig {
    pub fn topic_for(&self, kind: EventKind) -> String {
        self.topic
            .clone()
            .unwrap_or_else(|| kind.default_topic().to_string())
    }

    pub fn log_file_for(&self, kind: EventKind) -> String {
        self.log_file.clone().unwrap_or_else(|| {
            let name = match kind {
                EventKind::Liquidation => "bybit_liquidations.csv",
                EventKind::Trade => "bybit_trades.csv",
                EventKind::Ticker => "bybit_tickers.csv",
            };
            name.to_string()
        })
    }

    /// Only liquidations alert unless configured otherwise.
    pub fn alert_floor_for(&self, kind: EventKind) -> Option<Tier> {
        match (self.alert_above, kind) {
            (Some(floor), _) => floor.tier(),
            (None, EventKind::Liquidation) => Some(Tier::Normal),
            (None, _) => None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(tz) = std::env::var("BYBIT_TAPE_TZ") {
            info!("Display time zone overridden by BYBIT_TAPE_TZ: {}", tz);
            self.display.timezone = tz;
        }
        if let Ok(dir) = std::env::var("BYBIT_TAPE_LOG_DIR") {
            info!("Log directory overridden by BYBIT_TAPE_LOG_DIR: {}", dir);
            self.persistence.log_dir = dir;
        }
        if let Ok(url) = std::env::var("BYBIT_TAPE_WS_URL") {
            info!("Stream URL overridden by BYBIT_TAPE_WS_URL: {}", url);
            self.stream.ws_url = url;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.timezone()?;

        let url = url::Url::parse(&self.stream.ws_url)
            .with_context(|| format!("invalid stream.ws_url {:?}", self.stream.ws_url))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            bail!("stream.ws_url must use ws:// or wss://, got {}", url.scheme());
        }

        if self.stream.kinds.is_empty() {
            bail!("stream.kinds must enable at least one event kind");
        }

        for kind in &self.stream.kinds {
            let kc = self.kind(*kind);
            if self.symbols_for(*kind).is_empty() {
                bail!("no symbols configured for {}", kind);
            }

            let breakpoints = [kc.elevated_usd, kc.high_usd, kc.extreme_usd];
            if breakpoints.iter().any(|b| !b.is_finite() || *b < 0.0) {
                bail!("{} thresholds must be finite and non-negative", kind);
            }
            if !(kc.elevated_usd <= kc.high_usd && kc.high_usd <= kc.extreme_usd) {
                bail!(
                    "{} thresholds must be non-decreasing (elevated {} / high {} / extreme {})",
                    kind,
                    kc.elevated_usd,
                    kc.high_usd,
                    kc.extreme_usd
                );
            }
            if !kc.notable_move_pct.is_finite() || kc.notable_move_pct < 0.0 {
                bail!("{} notable_move_pct must be finite and non-negative", kind);
            }
            if !kc.min_display_usd.is_finite() || kc.min_display_usd < 0.0 {
                bail!("{} min_display_usd must be finite and non-negative", kind);
            }
        }

        Ok(())
    }

    pub fn timezone(&self) -> anyhow::Result<Tz> {
        self.display
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("invalid display.timezone {:?}: {}", self.display.timezone, e))
    }

    pub fn kind(&self, kind: EventKind) -> &KindConfig {
        match kind {
            EventKind::Liquidation => &self.kinds.liquidation,
            EventKind::Trade => &self.kinds.trade,
            EventKind::Ticker => &self.kinds.ticker,
        }
    }

    pub fn symbols_for(&self, kind: EventKind) -> &[String] {
        self.kind(kind)
            .symbols
            .as_deref()
            .unwrap_or(self.stream.symbols.as_slice())
    }

    pub fn log_path_for(&self, kind: EventKind) -> PathBuf {
        PathBuf::from(&self.persistence.log_dir).join(self.kind(kind).log_file_for(kind))
    }

    /// `<topic>.<SYMBOL>` for every enabled kind and symbol.
    pub fn subscription_topics(&self) -> Vec<String> {
        self.stream
            .kinds
            .iter()
            .flat_map(|kind| {
                let topic = self.kind(*kind).topic_for(*kind);
                self.symbols_for(*kind)
                    .iter()
                    .map(move |symbol| format!("{}.{}", topic, symbol))
            })
            .collect()
    }
}

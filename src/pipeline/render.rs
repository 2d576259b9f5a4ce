use crate::models::{EventKind, LiquidationEvent, MarketEvent, Side, TickerEvent, TradeEvent};
use crate::pipeline::format::{
    display_symbol, format_grouped, format_number, format_percent, format_timestamp, format_usd,
};
use crate::pipeline::severity::{Severity, Tier};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    Red,
    Green,
    Blue,
    Magenta,
    Cyan,
}

/// One rendered console line with its colour directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    pub text: String,
    pub tint: Tint,
    pub bold: bool,
}

/// Side colour first; only `Extreme` replaces it.
fn side_tint(side: Side, tier: Tier, buy: Tint, extreme_buy: Tint) -> Tint {
    match (tier, side) {
        (Tier::Extreme, Side::Sell) => Tint::Magenta,
        (Tier::Extreme, Side::Buy) => extreme_buy,
        (_, Side::Sell) => Tint::Red,
        (_, Side::Buy) => buy,
    }
}

#[derive(Debug, Clone)]
pub struct LineFormatter {
    tz: Tz,
    quote_suffix: String,
}

impl LineFormatter {
    pub fn new(tz: Tz, quote_suffix: impl Into<String>) -> Self {
        Self {
            tz,
            quote_suffix: quote_suffix.into(),
        }
    }

    pub fn format(&self, event: &MarketEvent, severity: Severity) -> DisplayLine {
        match event {
            MarketEvent::Liquidation(e) => self.liquidation(e, severity.tier),
            MarketEvent::Trade(e) => self.trade(e, severity.tier),
            MarketEvent::Ticker(e) => self.ticker(e, severity.notable),
        }
    }

    fn liquidation(&self, e: &LiquidationEvent, tier: Tier) -> DisplayLine {
        // A Buy liquidation closes a long position.
        let direction = match e.side {
            Side::Buy => "LONG",
            Side::Sell => "SHORT",
        };

        DisplayLine {
            text: format!(
                "{}{} {} LIQUIDATED {} {} contracts ({})",
                tier.marker(),
                format_timestamp(e.timestamp_ms, self.tz),
                display_symbol(&e.symbol, &self.quote_suffix),
                direction,
                format_number(e.size, 3),
                format_usd(e.usd_notional()),
            ),
            tint: side_tint(e.side, tier, Tint::Blue, Tint::Cyan),
            bold: tier > Tier::Normal,
        }
    }

    fn trade(&self, e: &TradeEvent, tier: Tier) -> DisplayLine {
        DisplayLine {
            text: format!(
                "{}{} {} {:<4} {} @{} ({})",
                tier.marker(),
                format_timestamp(e.timestamp_ms, self.tz),
                display_symbol(&e.symbol, &self.quote_suffix),
                e.side.as_str(),
                format_grouped(e.quantity, 6),
                format_number(e.price, 2),
                format_usd(e.usd_notional()),
            ),
            tint: side_tint(e.side, tier, Tint::Green, Tint::Blue),
            bold: tier > Tier::Normal,
        }
    }

    fn ticker(&self, e: &TickerEvent, notable: bool) -> DisplayLine {
        DisplayLine {
            text: format!(
                "{} {} {} ({}) -- OI: {} FR: {}",
                format_timestamp(e.timestamp_ms, self.tz),
                display_symbol(&e.symbol, &self.quote_suffix),
                format_usd(e.last_price),
                format_percent(e.price_change_pct, 2, true),
                format_grouped(e.open_interest, 1),
                format_percent(e.funding_rate_pct, 4, true),
            ),
            tint: if e.price_change_pct >= 0.0 { Tint::Green } else { Tint::Red },
            bold: notable,
        }
    }

    pub fn legend(kind: EventKind) -> &'static str {
        match kind {
            EventKind::Liquidation => "Format: Time Symbol LIQUIDATED SIDE Size (USD Value)",
            EventKind::Trade => "Format: Time Symbol Side Quantity @Price (USD Value)",
            EventKind::Ticker => "Format: Time Symbol Price (24h%) -- OpenInterest FundingRate",
        }
    }
}

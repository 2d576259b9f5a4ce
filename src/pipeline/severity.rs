use crate::config::Config;
use crate::models::{EventKind, MarketEvent};
use std::collections::HashMap;

/// Ordered severity bucket. Comparisons follow declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Normal,
    Elevated,
    High,
    Extreme,
}

impl Tier {
    /// Three-character, left-padded star field.
    pub fn marker(self) -> &'static str {
        match self {
            Tier::Normal => "   ",
            Tier::Elevated => "  *",
            Tier::High => " **",
            Tier::Extreme => "***",
        }
    }
}

/// Inclusive lower bounds, in USD notional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoints {
    pub elevated: f64,
    pub high: f64,
    pub extreme: f64,
}

impl Breakpoints {
    pub fn tier(&self, usd_notional: f64) -> Tier {
        if usd_notional >= self.extreme {
            Tier::Extreme
        } else if usd_notional >= self.high {
            Tier::High
        } else if usd_notional >= self.elevated {
            Tier::Elevated
        } else {
            Tier::Normal
        }
    }

    pub fn legend(&self) -> String {
        format!(
            "*** {}+, ** {}+, * {}+",
            compact_usd(self.extreme),
            compact_usd(self.high),
            compact_usd(self.elevated)
        )
    }
}

impl Default for Breakpoints {
    fn default() -> Self {
        Self {
            elevated: 100_000.0,
            high: 500_000.0,
            extreme: 1_000_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    /// Tiered by USD notional.
    Notional(Breakpoints),
    /// No tier; only flags moves with `|change %| >= notable_pct`.
    Move { notable_pct: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Severity {
    pub tier: Tier,
    pub notable: bool,
}

/// Classification policy keyed by event kind.
#[derive(Debug, Clone, Default)]
pub struct SeverityTable {
    entries: HashMap<EventKind, Classification>,
}

impl SeverityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: EventKind, classification: Classification) -> Self {
        self.entries.insert(kind, classification);
        self
    }

    pub fn from_config(config: &Config) -> Self {
        EventKind::ALL
            .into_iter()
            .fold(Self::new(), |table, kind| {
                let kc = config.kind(kind);
                let classification = match kind {
                    EventKind::Liquidation | EventKind::Trade => Classification::Notional(Breakpoints {
                        elevated: kc.elevated_usd,
                        high: kc.high_usd,
                        extreme: kc.extreme_usd,
                    }),
                    EventKind::Ticker => Classification::Move {
                        notable_pct: kc.notable_move_pct,
                    },
                };
                table.with(kind, classification)
            })
    }

    pub fn get(&self, kind: EventKind) -> Option<&Classification> {
        self.entries.get(&kind)
    }

    /// Kinds without notional breakpoints are always `Normal`.
    pub fn classify(&self, kind: EventKind, usd_notional: f64) -> Tier {
        match self.entries.get(&kind) {
            Some(Classification::Notional(bp)) => bp.tier(usd_notional),
            _ => Tier::Normal,
        }
    }

    pub fn is_notable_move(&self, kind: EventKind, change_pct: f64) -> bool {
        match self.entries.get(&kind) {
            Some(Classification::Move { notable_pct }) => change_pct.abs() >= *notable_pct,
            _ => false,
        }
    }

    pub fn assess(&self, event: &MarketEvent) -> Severity {
        let kind = event.kind();
        match event {
            MarketEvent::Ticker(t) => Severity {
                tier: Tier::Normal,
                notable: self.is_notable_move(kind, t.price_change_pct),
            },
            other => {
                let tier = other
                    .usd_notional()
                    .map(|usd| self.classify(kind, usd))
                    .unwrap_or(Tier::Normal);
                Severity {
                    tier,
                    notable: tier > Tier::Normal,
                }
            }
        }
    }
}

fn compact_usd(value: f64) -> String {
    fn trim(v: f64) -> String {
        let s = format!("{:.1}", v);
        s.strip_suffix(".0").map(str::to_string).unwrap_or(s)
    }

    if value >= 1_000_000.0 {
        format!("${}M", trim(value / 1_000_000.0))
    } else if value >= 1_000.0 {
        format!("${}k", trim(value / 1_000.0))
    } else {
        format!("${}", trim(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SeverityTable {
        SeverityTable::new()
            .with(EventKind::Liquidation, Classification::Notional(Breakpoints::default()))
            .with(EventKind::Ticker, Classification::Move { notable_pct: 2.0 })
    }

    #[test]
    fn breakpoints_are_inclusive_lower_bounds() {
        let t = table();
        let k = EventKind::Liquidation;
        assert_eq!(t.classify(k, 0.0), Tier::Normal);
        assert_eq!(t.classify(k, 99_999.99), Tier::Normal);
        assert_eq!(t.classify(k, 100_000.00), Tier::Elevated);
        assert_eq!(t.classify(k, 499_999.99), Tier::Elevated);
        assert_eq!(t.classify(k, 500_000.00), Tier::High);
        assert_eq!(t.classify(k, 999_999.99), Tier::High);
        assert_eq!(t.classify(k, 1_000_000.00), Tier::Extreme);
        assert_eq!(t.classify(k, 1e12), Tier::Extreme);
    }

    #[test]
    fn tier_is_monotonic_in_notional() {
        let t = table();
        let mut previous = Tier::Normal;
        let mut usd = 0.0;
        while usd < 2_000_000.0 {
            let tier = t.classify(EventKind::Liquidation, usd);
            assert!(tier >= previous, "tier dropped at {}", usd);
            previous = tier;
            usd += 1_234.5;
        }
    }

    #[test]
    fn unconfigured_kind_is_normal() {
        assert_eq!(table().classify(EventKind::Trade, 5e9), Tier::Normal);
        assert_eq!(table().classify(EventKind::Ticker, 5e9), Tier::Normal);
    }

    #[test]
    fn ticker_flags_notable_moves_either_direction() {
        let t = table();
        assert!(t.is_notable_move(EventKind::Ticker, 2.5));
        assert!(t.is_notable_move(EventKind::Ticker, -2.0));
        assert!(!t.is_notable_move(EventKind::Ticker, 1.99));
        assert!(!t.is_notable_move(EventKind::Liquidation, 50.0));
    }

    #[test]
    fn markers_are_three_chars() {
        for tier in [Tier::Normal, Tier::Elevated, Tier::High, Tier::Extreme] {
            assert_eq!(tier.marker().len(), 3);
        }
        assert_eq!(Tier::High.marker(), " **");
    }

    #[test]
    fn legend_matches_default_breakpoints() {
        assert_eq!(Breakpoints::default().legend(), "*** $1M+, ** $500k+, * $100k+");
    }
}

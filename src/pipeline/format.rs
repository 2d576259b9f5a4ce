//! Display helpers for numbers and timestamps. Persisted values never pass
//! through here.

use chrono::DateTime;
use chrono_tz::Tz;

/// Wall-clock `HH:MM:SS` in `tz`. The host time zone is never consulted.
pub fn format_timestamp(epoch_millis: i64, tz: Tz) -> String {
    match DateTime::from_timestamp_millis(epoch_millis) {
        Some(utc) => utc.with_timezone(&tz).format("%H:%M:%S").to_string(),
        None => "--:--:--".to_string(),
    }
}

/// Fixed precision, no grouping.
pub fn format_number(value: f64, precision: usize) -> String {
    format!("{:.*}", precision, value)
}

/// Fixed precision with `,` thousands separators.
pub fn format_grouped(value: f64, precision: usize) -> String {
    let fixed = format!("{:.*}", precision, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(fixed.len() + int_part.len() / 3 + 1);
    // Only show a sign when the rounded value is not zero.
    if value.is_sign_negative() && fixed.bytes().any(|b| matches!(b, b'1'..=b'9')) {
        grouped.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }
    grouped
}

pub fn format_usd(value: f64) -> String {
    let grouped = format_grouped(value, 2);
    match grouped.strip_prefix('-') {
        Some(abs) => format!("-${}", abs),
        None => format!("${}", grouped),
    }
}

/// Percentage with a trailing `%`; `signed` forces a leading `+` on
/// non-negative values.
pub fn format_percent(value: f64, precision: usize, signed: bool) -> String {
    if signed {
        format!("{:+.*}%", precision, value)
    } else {
        format!("{:.*}%", precision, value)
    }
}

/// Strips the quote currency suffix for display ("BTCUSDT" -> "BTC").
pub fn display_symbol<'a>(symbol: &'a str, quote_suffix: &str) -> &'a str {
    if quote_suffix.is_empty() {
        return symbol;
    }
    match symbol.strip_suffix(quote_suffix) {
        Some(base) if !base.is_empty() => base,
        _ => symbol,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2023-11-14T22:13:20Z
    const TS: i64 = 1_700_000_000_000;

    #[test]
    fn timestamp_follows_explicit_zone() {
        assert_eq!(format_timestamp(TS, chrono_tz::UTC), "22:13:20");
        assert_eq!(format_timestamp(TS, chrono_tz::America::New_York), "17:13:20");
        assert_eq!(format_timestamp(TS, chrono_tz::Asia::Tokyo), "07:13:20");
    }

    #[test]
    fn timestamp_tracks_daylight_saving() {
        // 2023-07-01T12:00:00Z, New York is on EDT (UTC-4).
        assert_eq!(format_timestamp(1_688_212_800_000, chrono_tz::America::New_York), "08:00:00");
    }

    #[test]
    fn grouping() {
        assert_eq!(format_grouped(0.0, 2), "0.00");
        assert_eq!(format_grouped(999.994, 2), "999.99");
        assert_eq!(format_grouped(1000.0, 2), "1,000.00");
        assert_eq!(format_grouped(525_000.0, 2), "525,000.00");
        assert_eq!(format_grouped(1_234_567.891, 1), "1,234,567.9");
        assert_eq!(format_grouped(-1234.5, 0), "-1,234");
        assert_eq!(format_grouped(-0.001, 2), "0.00");
        assert_eq!(format_grouped(0.1, 6), "0.100000");
    }

    #[test]
    fn usd_and_percent() {
        assert_eq!(format_usd(525_000.0), "$525,000.00");
        assert_eq!(format_usd(-12.5), "-$12.50");
        assert_eq!(format_percent(0.01, 4, true), "+0.0100%");
        assert_eq!(format_percent(-2.5, 2, true), "-2.50%");
        assert_eq!(format_percent(2.5, 2, false), "2.50%");
        assert_eq!(format_number(12.5, 3), "12.500");
    }

    #[test]
    fn quote_suffix_is_stripped() {
        assert_eq!(display_symbol("BTCUSDT", "USDT"), "BTC");
        assert_eq!(display_symbol("1000PEPEUSDT", "USDT"), "1000PEPE");
        assert_eq!(display_symbol("BTCPERP", "USDT"), "BTCPERP");
        assert_eq!(display_symbol("USDT", "USDT"), "USDT");
    }
}

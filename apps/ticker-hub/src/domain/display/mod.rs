//! Display Formatting
//!
//! Presentation policy for the ticker line. Nothing here feeds back into the
//! data path; the wire always carries full-precision decimals.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::fallback::{FallbackTier, TieredSnapshot};
use crate::domain::quote::{AssetClass, Quote};

/// Viewer language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    /// Traditional Chinese.
    #[default]
    Zh,
    /// English.
    En,
}

impl Locale {
    /// Parse a locale tag such as `zh`, `zh-TW` or `en-US`.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        let lang = tag.split(['-', '_']).next()?.to_ascii_lowercase();
        match lang.as_str() {
            "zh" => Some(Self::Zh),
            "en" => Some(Self::En),
            _ => None,
        }
    }
}

fn fixed(value: Decimal, places: u32) -> String {
    let rounded = value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.prec$}", prec = places as usize)
}

fn signed(value: Decimal, places: u32) -> String {
    let text = fixed(value, places);
    if value > Decimal::ZERO {
        format!("+{text}")
    } else {
        text
    }
}

/// Format a price: four decimals for currency pairs, two otherwise.
#[must_use]
pub fn format_price(price: Decimal, asset_class: AssetClass) -> String {
    match asset_class {
        AssetClass::Forex => fixed(price, 4),
        AssetClass::Index | AssetClass::Commodity => fixed(price, 2),
    }
}

/// Format the change column, e.g. `+55.96 (+0.11%)`.
#[must_use]
pub fn format_change(quote: &Quote) -> String {
    format!(
        "{} ({}%)",
        signed(quote.absolute_change, 2),
        signed(quote.percent_change, 2)
    )
}

/// Relative freshness label for the capture time.
///
/// Returns an empty string for capture times in the future.
#[must_use]
pub fn freshness_label(captured_at: DateTime<Utc>, now: DateTime<Utc>, locale: Locale) -> String {
    let elapsed = now - captured_at;
    if elapsed < chrono::TimeDelta::zero() {
        return String::new();
    }

    let minutes = elapsed.num_minutes();
    match (minutes, locale) {
        (0, Locale::Zh) => "剛剛更新".to_string(),
        (0, Locale::En) => "Just now".to_string(),
        (1..=59, Locale::Zh) => format!("{minutes}分鐘前更新"),
        (1..=59, Locale::En) => format!("Updated {minutes}m ago"),
        (_, Locale::Zh) => format!("{}小時前更新", minutes / 60),
        (_, Locale::En) => format!("Updated {}h ago", minutes / 60),
    }
}

fn tier_badge(tier: FallbackTier, locale: Locale) -> Option<&'static str> {
    match (tier, locale) {
        (FallbackTier::Live, _) => None,
        (FallbackTier::Cached, Locale::Zh) => Some("[快取]"),
        (FallbackTier::Cached, Locale::En) => Some("[cached]"),
        (FallbackTier::Bootstrap, Locale::Zh) => Some("[參考數據]"),
        (FallbackTier::Bootstrap, Locale::En) => Some("[reference]"),
    }
}

/// Render one quote, e.g. `Dow Jones 49071.56 +55.96 (+0.11%)`.
#[must_use]
pub fn format_quote(quote: &Quote, locale: Locale) -> String {
    let name = match locale {
        Locale::Zh => &quote.display_name.primary,
        Locale::En => &quote.display_name.secondary,
    };
    format!(
        "{name} {} {}",
        format_price(quote.price, quote.asset_class),
        format_change(quote)
    )
}

/// Render the whole ticker line with freshness label and tier badge.
#[must_use]
pub fn ticker_line(tiered: &TieredSnapshot, now: DateTime<Utc>, locale: Locale) -> String {
    let mut parts = Vec::with_capacity(tiered.snapshot.len() + 2);
    parts.push(freshness_label(tiered.snapshot.captured_at, now, locale));
    if let Some(badge) = tier_badge(tiered.tier, locale) {
        parts.push(badge.to_string());
    }
    let quotes: Vec<String> = tiered
        .snapshot
        .quotes
        .iter()
        .map(|q| format_quote(q, locale))
        .collect();
    parts.push(quotes.join(" | "));
    parts.retain(|p| !p.is_empty());
    parts.join("  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fallback::bootstrap_snapshot;
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    #[test_case(dec!(1.19354), AssetClass::Forex, "1.1935" ; "forex four places")]
    #[test_case(dec!(49071.555), AssetClass::Index, "49071.56" ; "index rounds half up")]
    #[test_case(dec!(5375.5), AssetClass::Commodity, "5375.50" ; "commodity pads")]
    fn price(value: Decimal, class: AssetClass, expected: &str) {
        assert_eq!(format_price(value, class), expected);
    }

    #[test_case(0, Locale::En, "Just now")]
    #[test_case(59, Locale::En, "Just now")]
    #[test_case(60, Locale::En, "Updated 1m ago")]
    #[test_case(59 * 60, Locale::En, "Updated 59m ago")]
    #[test_case(2 * 3600 + 5, Locale::En, "Updated 2h ago")]
    #[test_case(30, Locale::Zh, "剛剛更新")]
    #[test_case(5 * 60, Locale::Zh, "5分鐘前更新")]
    #[test_case(3 * 3600, Locale::Zh, "3小時前更新")]
    fn freshness(elapsed_secs: i64, locale: Locale, expected: &str) {
        let captured = at(1_000_000);
        let now = captured + TimeDelta::seconds(elapsed_secs);
        assert_eq!(freshness_label(captured, now, locale), expected);
    }

    #[test]
    fn future_capture_has_no_label() {
        assert_eq!(freshness_label(at(100), at(50), Locale::En), "");
    }

    #[test]
    fn change_column_is_signed() {
        let snapshot = bootstrap_snapshot();
        assert_eq!(format_change(snapshot.quote("^DJI").unwrap()), "+55.96 (+0.11%)");
        assert_eq!(format_change(snapshot.quote("^IXIC").unwrap()), "-172.33 (-0.72%)");
    }

    #[test_case("zh-TW", Some(Locale::Zh))]
    #[test_case("en_US", Some(Locale::En))]
    #[test_case("EN", Some(Locale::En))]
    #[test_case("fr", None)]
    fn locale_tags(tag: &str, expected: Option<Locale>) {
        assert_eq!(Locale::parse(tag), expected);
    }

    #[test]
    fn ticker_line_marks_bootstrap() {
        let tiered = TieredSnapshot::new(FallbackTier::Bootstrap, bootstrap_snapshot());
        let now = tiered.snapshot.captured_at + TimeDelta::hours(5);
        let line = ticker_line(&tiered, now, Locale::En);

        assert!(line.starts_with("Updated 5h ago  [reference]  Dow Jones 49071.56"));
        assert!(line.contains("EUR/USD 1.1935 "));
        assert!(line.contains("(-0.31%)"));
    }

    #[test]
    fn ticker_line_live_has_no_badge() {
        let tiered = TieredSnapshot::new(FallbackTier::Live, bootstrap_snapshot());
        let line = ticker_line(&tiered, tiered.snapshot.captured_at, Locale::Zh);
        assert!(line.starts_with("剛剛更新  道瓊斯"));
    }
}

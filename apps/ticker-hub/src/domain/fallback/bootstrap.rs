//! Compiled-in reference snapshot, captured 2026-01-29.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::quote::Quote;
use crate::domain::snapshot::Snapshot;
use crate::domain::symbols::{TrackedSymbol, catalog};

/// 2026-01-29T00:00:00Z
const CAPTURED_AT_SECS: i64 = 1_769_644_800;

// (symbol, price, change, change percent, currency)
const REFERENCE: &[(&str, Decimal, Decimal, Decimal, &str)] = &[
    ("^DJI", dec!(49071.56), dec!(55.96), dec!(0.11), "USD"),
    ("^IXIC", dec!(23685.12), dec!(-172.33), dec!(-0.72), "USD"),
    ("^GSPC", dec!(6969.01), dec!(-9.02), dec!(-0.13), "USD"),
    ("000001.SS", dec!(4132.61), dec!(-0.09), dec!(-0.002), "CNY"),
    ("^HSI", dec!(27325.89), dec!(462.74), dec!(1.72), "HKD"),
    ("CNY=X", dec!(6.9495), dec!(0.002), dec!(0.03), "CNY"),
    ("EURUSD=X", dec!(1.1935), dec!(-0.0037), dec!(-0.31), "USD"),
    ("JPY=X", dec!(153.55), dec!(0.54), dec!(0.35), "JPY"),
    ("GBPUSD=X", dec!(1.3769), dec!(-0.0042), dec!(-0.30), "USD"),
    ("GC=F", dec!(5375.50), dec!(20.70), dec!(0.39), "USD"),
    ("SI=F", dec!(115.58), dec!(1.15), dec!(1.01), "USD"),
];

/// Reference snapshot for the full catalog.
#[must_use]
pub fn bootstrap_snapshot() -> Snapshot {
    bootstrap_snapshot_for(&catalog())
}

/// Reference snapshot narrowed to `tracked`, in the given order.
///
/// Symbols without reference data are left out.
#[must_use]
pub fn bootstrap_snapshot_for(tracked: &[TrackedSymbol]) -> Snapshot {
    let quotes = tracked
        .iter()
        .filter_map(|symbol| {
            REFERENCE
                .iter()
                .find(|(s, ..)| *s == symbol.symbol)
                .map(|&(_, price, change, percent, currency)| Quote {
                    symbol: symbol.symbol.clone(),
                    asset_class: symbol.asset_class,
                    display_name: symbol.display_name.clone(),
                    price,
                    absolute_change: change,
                    percent_change: percent,
                    currency_code: currency.to_string(),
                })
        })
        .collect();

    let captured_at = DateTime::<Utc>::from_timestamp(CAPTURED_AT_SECS, 0).unwrap_or_default();
    Snapshot::new(quotes, captured_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::symbols::select;

    #[test]
    fn covers_catalog_in_order() {
        let snapshot = bootstrap_snapshot();
        let symbols: Vec<_> = snapshot.quotes.iter().map(|q| q.symbol.clone()).collect();
        let expected: Vec<_> = catalog().into_iter().map(|t| t.symbol).collect();
        assert_eq!(symbols, expected);
    }

    #[test]
    fn captured_on_reference_date() {
        let snapshot = bootstrap_snapshot();
        assert_eq!(snapshot.captured_at.to_rfc3339(), "2026-01-29T00:00:00+00:00");
    }

    #[test]
    fn narrows_to_tracked_set() {
        let tracked = select(&["GC=F", "^HSI"]).unwrap();
        let snapshot = bootstrap_snapshot_for(&tracked);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.quotes[0].symbol, "^HSI");
        assert_eq!(snapshot.quote("GC=F").unwrap().price, dec!(5375.50));
    }

    #[test]
    fn change_signs_match_percent_signs() {
        for quote in bootstrap_snapshot().quotes {
            assert_eq!(
                quote.absolute_change.is_sign_negative(),
                quote.percent_change.is_sign_negative(),
                "{}",
                quote.symbol
            );
        }
    }
}

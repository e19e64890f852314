//! Quote Types
//!
//! Core domain types for a single tracked instrument. The serde layout of
//! [`Quote`] is the wire layout used by the market data channel and the pull
//! endpoint, so field renames here are protocol changes.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::symbols::TrackedSymbol;

// =============================================================================
// Asset Class
// =============================================================================

/// Instrument category, used for grouping and price formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    /// Equity index (Dow Jones, Hang Seng, ...).
    Index,
    /// Currency pair.
    Forex,
    /// Commodity future (gold, silver).
    Commodity,
}

impl AssetClass {
    /// Get the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Forex => "forex",
            Self::Commodity => "commodity",
        }
    }
}

// =============================================================================
// Display Name
// =============================================================================

/// Pair of localized labels for an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayName {
    /// Primary locale label (Traditional Chinese).
    #[serde(rename = "nameZh")]
    pub primary: String,
    /// Secondary locale label (English).
    #[serde(rename = "nameEn")]
    pub secondary: String,
}

impl DisplayName {
    /// Create a display name.
    #[must_use]
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }
}

// =============================================================================
// Quote
// =============================================================================

/// Current state of one tracked instrument.
///
/// Decimal fields travel as JSON numbers to stay compatible with existing
/// viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Provider-specific symbol, unique within a snapshot.
    pub symbol: String,
    /// Instrument category.
    #[serde(rename = "type")]
    pub asset_class: AssetClass,
    /// Localized labels.
    #[serde(flatten)]
    pub display_name: DisplayName,
    /// Last traded or quoted value.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// `price - previous_close`.
    #[serde(rename = "change", with = "rust_decimal::serde::float")]
    pub absolute_change: Decimal,
    /// `absolute_change / previous_close * 100`, or zero without a close.
    #[serde(rename = "changePercent", with = "rust_decimal::serde::float")]
    pub percent_change: Decimal,
    /// Currency or unit code.
    #[serde(rename = "currency")]
    pub currency_code: String,
}

impl Quote {
    /// Build a quote from a price and the provider's previous close.
    ///
    /// The change fields are derived here so their sign always agrees with
    /// `price - previous_close`.
    #[must_use]
    pub fn from_prices(
        symbol: &TrackedSymbol,
        price: Decimal,
        previous_close: Decimal,
        currency_code: impl Into<String>,
    ) -> Self {
        let absolute_change = price - previous_close;
        let percent_change = if previous_close.is_zero() {
            Decimal::ZERO
        } else {
            absolute_change
                .checked_div(previous_close)
                .and_then(|ratio| ratio.checked_mul(dec!(100)))
                .unwrap_or(Decimal::ZERO)
        };

        Self {
            symbol: symbol.symbol.clone(),
            asset_class: symbol.asset_class,
            display_name: symbol.display_name.clone(),
            price,
            absolute_change,
            percent_change,
            currency_code: currency_code.into(),
        }
    }

    /// Whether the instrument is up since the previous close.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.absolute_change.is_sign_positive() && !self.absolute_change.is_zero()
    }

    /// Whether the instrument is down since the previous close.
    #[must_use]
    pub fn is_down(&self) -> bool {
        self.absolute_change.is_sign_negative() && !self.absolute_change.is_zero()
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Tracked Symbol Catalog
//!
//! The fixed set of instruments the hub knows how to track, with asset class
//! and bilingual display names. Deployments may narrow the set, but changing
//! it is a configuration change rather than a runtime operation.

use crate::domain::quote::{AssetClass, DisplayName};

// =============================================================================
// Types
// =============================================================================

/// A symbol string as understood by the upstream provider.
pub type Symbol = String;

/// One instrument the refresh cycle fetches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackedSymbol {
    /// Provider symbol.
    pub symbol: Symbol,
    /// Instrument category.
    pub asset_class: AssetClass,
    /// Localized labels.
    pub display_name: DisplayName,
}

impl TrackedSymbol {
    /// Create a tracked symbol.
    #[must_use]
    pub fn new(
        symbol: impl Into<Symbol>,
        asset_class: AssetClass,
        primary_name: impl Into<String>,
        secondary_name: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class,
            display_name: DisplayName::new(primary_name, secondary_name),
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

const CATALOG: &[(&str, AssetClass, &str, &str)] = &[
    ("^DJI", AssetClass::Index, "道瓊斯", "Dow Jones"),
    ("^IXIC", AssetClass::Index, "納斯達克", "NASDAQ"),
    ("^GSPC", AssetClass::Index, "標普500", "S&P 500"),
    ("000001.SS", AssetClass::Index, "上證綜指", "Shanghai"),
    ("^HSI", AssetClass::Index, "恆生指數", "Hang Seng"),
    ("CNY=X", AssetClass::Forex, "美元/人民幣", "USD/CNY"),
    ("EURUSD=X", AssetClass::Forex, "歐元/美元", "EUR/USD"),
    ("JPY=X", AssetClass::Forex, "美元/日元", "USD/JPY"),
    ("GBPUSD=X", AssetClass::Forex, "英鎊/美元", "GBP/USD"),
    ("GC=F", AssetClass::Commodity, "黃金", "Gold"),
    ("SI=F", AssetClass::Commodity, "白銀", "Silver"),
];

/// Every instrument the hub can track, in display order.
#[must_use]
pub fn catalog() -> Vec<TrackedSymbol> {
    CATALOG
        .iter()
        .map(|&(symbol, class, zh, en)| TrackedSymbol::new(symbol, class, zh, en))
        .collect()
}

/// Narrow the catalog to the given symbols, keeping catalog order.
///
/// # Errors
///
/// Returns the first requested symbol that is not in the catalog.
pub fn select<S: AsRef<str>>(requested: &[S]) -> Result<Vec<TrackedSymbol>, Symbol> {
    let all = catalog();

    if let Some(unknown) = requested
        .iter()
        .map(AsRef::as_ref)
        .find(|wanted| !all.iter().any(|t| t.symbol == *wanted))
    {
        return Err(unknown.to_string());
    }

    Ok(all
        .into_iter()
        .filter(|t| requested.iter().any(|wanted| wanted.as_ref() == t.symbol))
        .collect())
}

// =============================================================================
// Tests
// =============================================================================

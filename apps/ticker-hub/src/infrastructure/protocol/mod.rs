//! Market Data Channel Protocol
//!
//! JSON text frames exchanged over `/ws/market-data`:
//!
//! ```json
//! {"type":"market_data","data":[...],"timestamp":1769644800000,"tier":"live"}
//! {"type":"ping","timestamp":1769644800000}
//! {"type":"pong","timestamp":1769644800000}
//! {"type":"error","message":"..."}
//! ```
//!
//! Every field except `type` is optional. Viewers that predate `tier` ignore
//! it; frames without `tier` are treated as live.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::fallback::{FallbackTier, TieredSnapshot};
use crate::domain::quote::Quote;
use crate::domain::snapshot::Snapshot;

/// Envelope discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Full snapshot.
    MarketData,
    /// Liveness probe.
    Ping,
    /// Liveness reply.
    Pong,
    /// Server-side error notice.
    Error,
}

/// Codec error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame is not a valid envelope.
    #[error("Invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    /// A `market_data` frame arrived without `data`.
    #[error("market_data frame without data")]
    MissingData,
}

/// One frame on the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Frame type.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Quotes, for `market_data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Quote>>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Freshness tier, for `market_data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<FallbackTier>,
    /// Human-readable detail, for `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    const fn bare(kind: MessageKind, timestamp: Option<i64>) -> Self {
        Self {
            kind,
            data: None,
            timestamp,
            tier: None,
            message: None,
        }
    }

    /// Snapshot frame. The timestamp is the snapshot's capture time.
    #[must_use]
    pub fn market_data(tiered: &TieredSnapshot) -> Self {
        Self {
            kind: MessageKind::MarketData,
            data: Some(tiered.snapshot.quotes.clone()),
            timestamp: Some(tiered.snapshot.timestamp_millis()),
            tier: Some(tiered.tier),
            message: None,
        }
    }

    /// Liveness probe stamped with the current time.
    #[must_use]
    pub fn ping() -> Self {
        Self::bare(MessageKind::Ping, Some(Utc::now().timestamp_millis()))
    }

    /// Liveness reply stamped with the current time.
    #[must_use]
    pub fn pong() -> Self {
        Self::bare(MessageKind::Pong, Some(Utc::now().timestamp_millis()))
    }

    /// Error notice.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::bare(MessageKind::Error, Some(Utc::now().timestamp_millis()))
        }
    }

    /// Serialize to a text frame.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// Returns error if the frame is not a valid envelope.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Extract the tiered snapshot carried by a `market_data` frame.
    ///
    /// A missing `tier` reads as live; a missing or unparseable timestamp
    /// reads as the receive time.
    ///
    /// # Errors
    ///
    /// Returns error if the frame carries no data.
    pub fn snapshot(&self) -> Result<TieredSnapshot, ProtocolError> {
        let quotes = self.data.clone().ok_or(ProtocolError::MissingData)?;
        let captured_at = self
            .timestamp
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        Ok(TieredSnapshot::new(
            self.tier.unwrap_or(FallbackTier::Live),
            Snapshot::new(quotes, captured_at),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fallback::bootstrap_snapshot;

    #[test]
    fn ping_layout() {
        let json = Envelope::ping().encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "ping");
        assert!(value["timestamp"].is_i64());
        assert!(value.get("data").is_none());
        assert!(value.get("tier").is_none());
    }

    #[test]
    fn market_data_carries_tier() {
        let tiered = TieredSnapshot::new(FallbackTier::Bootstrap, bootstrap_snapshot());
        let json = Envelope::market_data(&tiered).encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "market_data");
        assert_eq!(value["tier"], "bootstrap");
        assert_eq!(value["timestamp"], 1_769_644_800_000_i64);
        assert_eq!(value["data"].as_array().unwrap().len(), 11);
    }

    #[test]
    fn snapshot_round_trips_through_frame() {
        let tiered = TieredSnapshot::new(FallbackTier::Cached, bootstrap_snapshot());
        let text = Envelope::market_data(&tiered).encode().unwrap();
        let decoded = Envelope::decode(&text).unwrap().snapshot().unwrap();
        assert_eq!(decoded, tiered);
    }

    #[test]
    fn legacy_frame_without_tier_is_live() {
        let text = r#"{"type":"market_data","data":[],"timestamp":1000}"#;
        let tiered = Envelope::decode(text).unwrap().snapshot().unwrap();
        assert_eq!(tiered.tier, FallbackTier::Live);
        assert_eq!(tiered.snapshot.timestamp_millis(), 1000);
    }

    #[test]
    fn market_data_without_data_is_rejected() {
        let envelope = Envelope::decode(r#"{"type":"market_data"}"#).unwrap();
        assert!(matches!(envelope.snapshot(), Err(ProtocolError::MissingData)));
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(Envelope::decode(r#"{"type":"subscribe"}"#).is_err());
        assert!(Envelope::decode("not json").is_err());
    }

    #[test]
    fn error_frame() {
        let envelope = Envelope::error("upstream unavailable");
        assert_eq!(envelope.kind, MessageKind::Error);
        assert_eq!(envelope.message.as_deref(), Some("upstream unavailable"));
    }
}

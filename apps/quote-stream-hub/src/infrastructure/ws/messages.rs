//! Dashboard WebSocket Protocol
//!
//! Wire format for the client-facing WebSocket. Every frame is a JSON
//! object tagged by a `type` field.
//!
//! # Inbound
//!
//! ```json
//! {"type": "subscribe:prices", "symbols": ["AAPL", "MSFT"]}
//! {"type": "unsubscribe:prices", "symbols": ["AAPL"]}
//! {"type": "subscribe:alerts"}
//! {"type": "subscribe:portfolio"}
//! ```
//!
//! # Outbound
//!
//! ```json
//! {"type": "connected", "connectionId": "…", "authenticated": true, "userId": "…"}
//! {"type": "subscribed:prices", "symbols": ["AAPL"]}
//! {"type": "price:update", "symbol": "AAPL", "price": "205.31", …}
//! {"type": "alert:triggered", "id": "…", "symbol": "AAPL", …}
//! {"type": "notification", "notification": {"type": "alert_triggered", …}}
//! {"type": "portfolio:update", "totalValue": "125000.00", …}
//! {"type": "error", "message": "…"}
//! ```
//!
//! The generic notification body nests under a `notification` key because
//! the frame's `type` tag is already taken; the body keeps its own
//! `{type, title, message, data}` fields.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::alert::{AlertCondition, AlertId, AlertTriggered, UserId};
use crate::domain::quote::{Quote, Symbol};
use crate::domain::subscription::ConnectionId;

// =============================================================================
// Inbound Frames
// =============================================================================

/// A request frame sent by a dashboard client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Subscribe to price updates for a list of symbols.
    #[serde(rename = "subscribe:prices")]
    SubscribePrices {
        /// Raw symbols; normalized server-side.
        symbols: Vec<String>,
    },
    /// Unsubscribe from price updates for a list of symbols.
    #[serde(rename = "unsubscribe:prices")]
    UnsubscribePrices {
        /// Raw symbols; normalized server-side.
        symbols: Vec<String>,
    },
    /// Join the per-user alerts channel. Requires identity.
    #[serde(rename = "subscribe:alerts")]
    SubscribeAlerts,
    /// Join the per-user portfolio channel. Requires identity.
    #[serde(rename = "subscribe:portfolio")]
    SubscribePortfolio,
}

// =============================================================================
// Outbound Payloads
// =============================================================================

/// Price update payload.
///
/// Session statistics (`high`, `low`, `open`, `previousClose`) are present
/// only on the first (immediate) delivery for a newly activated symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    /// Normalized symbol.
    pub symbol: Symbol,
    /// Last traded price.
    pub price: Decimal,
    /// Absolute change since previous close.
    pub change: Decimal,
    /// Percentage change since previous close.
    pub change_percent: Decimal,
    /// Session volume.
    pub volume: u64,
    /// Provider timestamp.
    pub timestamp: DateTime<Utc>,
    /// Session high (initial delivery only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,
    /// Session low (initial delivery only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,
    /// Session open (initial delivery only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,
    /// Previous session close (initial delivery only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<Decimal>,
}

impl PriceUpdate {
    /// Build an update from a quote, optionally carrying session stats.
    #[must_use]
    pub fn from_quote(quote: &Quote, include_session: bool) -> Self {
        let session = if include_session { quote.session } else { None };
        Self {
            symbol: quote.symbol.clone(),
            price: quote.price,
            change: quote.change,
            change_percent: quote.change_percent,
            volume: quote.volume,
            timestamp: quote.timestamp,
            high: session.map(|s| s.high),
            low: session.map(|s| s.low),
            open: session.map(|s| s.open),
            previous_close: session.map(|s| s.previous_close),
        }
    }
}

/// Alert trigger payload for the alerts channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertTriggeredUpdate {
    /// Alert identifier.
    pub id: AlertId,
    /// Symbol the alert watched.
    pub symbol: Symbol,
    /// Condition that was met.
    pub condition: AlertCondition,
    /// Target price of the alert.
    pub target_price: Decimal,
    /// Price that met the condition.
    pub current_price: Decimal,
    /// Transition timestamp.
    pub triggered_at: DateTime<Utc>,
}

impl From<&AlertTriggered> for AlertTriggeredUpdate {
    fn from(event: &AlertTriggered) -> Self {
        Self {
            id: event.alert_id,
            symbol: event.symbol.clone(),
            condition: event.condition,
            target_price: event.target_price,
            current_price: event.current_price,
            triggered_at: event.triggered_at,
        }
    }
}

/// Generic notification body delivered to every connection of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationBody {
    /// Notification kind, e.g. `alert_triggered`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Short headline.
    pub title: String,
    /// Human-readable message.
    pub message: String,
    /// Kind-specific payload.
    pub data: serde_json::Value,
}

/// Portfolio valuation payload for the portfolio channel.
///
/// Computed by the analytics layer; this core only fans it out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioUpdate {
    /// Total portfolio value.
    pub total_value: Decimal,
    /// Total unrealized gain.
    pub total_gain: Decimal,
    /// Total unrealized gain, percent.
    pub total_gain_percent: Decimal,
    /// Change since previous session close.
    pub day_change: Decimal,
    /// Change since previous session close, percent.
    pub day_change_percent: Decimal,
    /// Valuation timestamp.
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Outbound Frames
// =============================================================================

/// An event frame sent to a dashboard client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Handshake acknowledgment.
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected {
        /// Identifier of this session.
        connection_id: ConnectionId,
        /// Whether a valid credential was presented.
        authenticated: bool,
        /// Identity attached to the session, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<UserId>,
    },
    /// Price subscription confirmation with the normalized symbols applied.
    #[serde(rename = "subscribed:prices")]
    SubscribedPrices {
        /// Normalized symbols actually applied.
        symbols: Vec<Symbol>,
    },
    /// Price unsubscription confirmation.
    #[serde(rename = "unsubscribed:prices")]
    UnsubscribedPrices {
        /// Normalized symbols requested.
        symbols: Vec<Symbol>,
    },
    /// Alerts channel join confirmation.
    #[serde(rename = "subscribed:alerts")]
    SubscribedAlerts,
    /// Portfolio channel join confirmation.
    #[serde(rename = "subscribed:portfolio")]
    SubscribedPortfolio,
    /// Price update for a subscribed symbol.
    #[serde(rename = "price:update")]
    PriceUpdate(PriceUpdate),
    /// Alert trigger for the alerts channel.
    #[serde(rename = "alert:triggered")]
    AlertTriggered(AlertTriggeredUpdate),
    /// Generic notification for every connection of a user.
    #[serde(rename = "notification")]
    Notification {
        /// Notification body.
        notification: NotificationBody,
    },
    /// Portfolio valuation for the portfolio channel.
    #[serde(rename = "portfolio:update")]
    PortfolioUpdate(PortfolioUpdate),
    /// Request rejection. The connection stays open.
    #[serde(rename = "error")]
    Error {
        /// Why the request was rejected.
        message: String,
    },
}

impl ServerMessage {
    /// Price update frame from a quote.
    #[must_use]
    pub fn price_update(quote: &Quote, include_session: bool) -> Self {
        Self::PriceUpdate(PriceUpdate::from_quote(quote, include_session))
    }

    /// Alert trigger frame from a domain event.
    #[must_use]
    pub fn alert_triggered(event: &AlertTriggered) -> Self {
        Self::AlertTriggered(AlertTriggeredUpdate::from(event))
    }

    /// Generic notification frame from a trigger event.
    #[must_use]
    pub fn alert_notification(event: &AlertTriggered) -> Self {
        Self::Notification {
            notification: NotificationBody {
                kind: "alert_triggered".to_string(),
                title: "Price alert triggered".to_string(),
                message: format!(
                    "{} is now {} ({} {})",
                    event.symbol,
                    event.current_price,
                    event.condition.as_str(),
                    event.target_price
                ),
                data: serde_json::json!({
                    "alertId": event.alert_id,
                    "symbol": event.symbol,
                    "price": event.current_price,
                }),
            },
        }
    }

    /// Error frame.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::domain::quote::SessionStats;

    fn quote_with_session() -> Quote {
        Quote {
            symbol: "AAPL".to_string(),
            price: Decimal::from_str("205.31").unwrap(),
            change: Decimal::from_str("2.11").unwrap(),
            change_percent: Decimal::from_str("1.04").unwrap(),
            volume: 48_123_901,
            timestamp: Utc::now(),
            session: Some(SessionStats {
                high: Decimal::from_str("206.10").unwrap(),
                low: Decimal::from_str("202.55").unwrap(),
                open: Decimal::from_str("203.00").unwrap(),
                previous_close: Decimal::from_str("203.20").unwrap(),
            }),
        }
    }

    #[test]
    fn subscribe_frame_deserializes() {
        let frame: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe:prices","symbols":["aapl","MSFT"]}"#)
                .unwrap();

        assert_eq!(
            frame,
            ClientMessage::SubscribePrices {
                symbols: vec!["aapl".to_string(), "MSFT".to_string()]
            }
        );
    }

    #[test]
    fn channel_join_frames_deserialize() {
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe:alerts"}"#).unwrap(),
            ClientMessage::SubscribeAlerts
        );
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe:portfolio"}"#).unwrap(),
            ClientMessage::SubscribePortfolio
        );
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"trade:submit"}"#).is_err());
    }

    #[test]
    fn connected_frame_omits_user_id_when_anonymous() {
        let frame = ServerMessage::Connected {
            connection_id: ConnectionId::new(),
            authenticated: false,
            user_id: None,
        };

        let value = serde_json::to_value(&frame).unwrap();

        assert_eq!(value["type"], "connected");
        assert_eq!(value["authenticated"], false);
        assert!(value.get("userId").is_none());
        assert!(value.get("connectionId").is_some());
    }

    #[test]
    fn connected_frame_carries_user_id_when_authenticated() {
        let frame = ServerMessage::Connected {
            connection_id: ConnectionId::new(),
            authenticated: true,
            user_id: Some("user-1".to_string()),
        };

        let value = serde_json::to_value(&frame).unwrap();

        assert_eq!(value["userId"], "user-1");
    }

    #[test]
    fn initial_price_update_carries_session_stats() {
        let frame = ServerMessage::price_update(&quote_with_session(), true);

        let value = serde_json::to_value(&frame).unwrap();

        assert_eq!(value["type"], "price:update");
        assert_eq!(value["symbol"], "AAPL");
        assert_eq!(value["previousClose"], "203.20");
        assert_eq!(value["changePercent"], "1.04");
    }

    #[test]
    fn subsequent_price_update_omits_session_stats() {
        let frame = ServerMessage::price_update(&quote_with_session(), false);

        let value = serde_json::to_value(&frame).unwrap();

        assert!(value.get("high").is_none());
        assert!(value.get("low").is_none());
        assert!(value.get("open").is_none());
        assert!(value.get("previousClose").is_none());
    }

    #[test]
    fn alert_frames_serialize_with_expected_shape() {
        let event = AlertTriggered {
            alert_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            symbol: "AAPL".to_string(),
            condition: AlertCondition::Above,
            target_price: Decimal::from_str("200").unwrap(),
            current_price: Decimal::from_str("205").unwrap(),
            triggered_at: Utc::now(),
        };

        let trigger = serde_json::to_value(ServerMessage::alert_triggered(&event)).unwrap();
        assert_eq!(trigger["type"], "alert:triggered");
        assert_eq!(trigger["condition"], "ABOVE");
        assert_eq!(trigger["targetPrice"], "200");
        assert_eq!(trigger["currentPrice"], "205");

        let note = serde_json::to_value(ServerMessage::alert_notification(&event)).unwrap();
        assert_eq!(note["type"], "notification");
        assert_eq!(note["notification"]["type"], "alert_triggered");
        assert_eq!(note["notification"]["data"]["symbol"], "AAPL");
    }

    #[test]
    fn portfolio_update_serializes_camel_case() {
        let frame = ServerMessage::PortfolioUpdate(PortfolioUpdate {
            total_value: Decimal::from_str("125000.00").unwrap(),
            total_gain: Decimal::from_str("5000.00").unwrap(),
            total_gain_percent: Decimal::from_str("4.17").unwrap(),
            day_change: Decimal::from_str("-250.00").unwrap(),
            day_change_percent: Decimal::from_str("-0.20").unwrap(),
            timestamp: Utc::now(),
        });

        let value = serde_json::to_value(&frame).unwrap();

        assert_eq!(value["type"], "portfolio:update");
        assert_eq!(value["totalValue"], "125000.00");
        assert_eq!(value["dayChangePercent"], "-0.20");
    }

    #[test]
    fn error_frame_serializes_message() {
        let value = serde_json::to_value(ServerMessage::error("nope")).unwrap();

        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "nope");
    }

    #[test]
    fn price_update_round_trips() {
        let frame = ServerMessage::price_update(&quote_with_session(), true);

        let json = serde_json::to_string(&frame).unwrap();
        let parsed: ServerMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, frame);
    }
}

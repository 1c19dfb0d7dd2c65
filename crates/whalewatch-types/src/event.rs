//! Market events delivered by a feed source.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggressor side of a trade, or the order side of a liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn label(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What kind of market event this is, with the fields only that kind carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Trade {
        trade_id: u64,
    },
    Liquidation {
        /// Average fill price of the forced order, when reported.
        average_price: Option<f64>,
        /// Order status as reported by the venue (e.g. `FILLED`).
        status: String,
    },
}

impl EventKind {
    /// Short label used in the type column.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Trade { .. } => "TRADE",
            EventKind::Liquidation { .. } => "LIQUIDATION",
        }
    }

    pub fn is_liquidation(&self) -> bool {
        matches!(self, EventKind::Liquidation { .. })
    }
}

/// A single decoded trade or liquidation.
///
/// Immutable once created; the pipeline shares it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
    pub side: Side,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl MarketEvent {
    /// Notional value in quote currency: `price × quantity`.
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}

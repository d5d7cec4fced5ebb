//! Immutable trade log entries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(format!("unknown trade side '{other}'")),
        }
    }
}

/// A trade to append to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrade {
    pub user_id: i64,
    pub instrument_id: i64,
    pub side: Side,
    pub quantity: i64,
    /// Execution price in instrument currency.
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub id: i64,
    pub user_id: i64,
    pub instrument_id: i64,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl TradeRecord {
    pub fn notional(&self) -> f64 {
        self.quantity as f64 * self.price
    }
}

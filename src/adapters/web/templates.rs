//! HTML templates using Askama.

use askama::Template;
use serde::{Deserialize, Serialize};

use crate::domain::exchange_rate::ExchangeRate;
use crate::domain::instrument::Instrument;
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::trade::TradeRecord;

/// One-shot message carried across a redirect in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flash {
    /// `success` or `error`, used as a CSS class suffix.
    pub kind: String,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: "error".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate<'a> {
    pub instruments: &'a [Instrument],
    pub starting_cash: f64,
    pub flash: Option<Flash>,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate<'a> {
    pub error: Option<&'a str>,
    pub email: &'a str,
    pub next: &'a str,
    pub flash: Option<Flash>,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate<'a> {
    pub error: Option<&'a str>,
    pub username: &'a str,
    pub email: &'a str,
    pub flash: Option<Flash>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate<'a> {
    pub username: &'a str,
    pub snapshot: &'a PortfolioSnapshot,
    pub instruments: &'a [Instrument],
    pub trades: &'a [TradeRecord],
    pub rate: ExchangeRate,
    pub base_currency: &'a str,
    pub home_currency: &'a str,
    pub flash: Option<Flash>,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate<'a> {
    pub message: &'a str,
    pub status: u16,
}

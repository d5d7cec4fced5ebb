//! The trading desk: the operations the web and CLI layers call.
//!
//! Wires a [`StoragePort`] and the shared [`ExchangeRateCell`] into buy/sell
//! settlement, portfolio snapshots, registration and login.

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;

use super::error::BolsaError;
use super::exchange_rate::{ExchangeRate, ExchangeRateCell};
use super::holding::Holding;
use super::instrument::{DEFAULT_CATALOG, Instrument, normalize_symbol};
use super::portfolio::{PortfolioSnapshot, build_snapshot};
use super::settlement::{Settlement, check_quantity, plan_buy, plan_sell};
use super::trade::{Side, TradeRecord};
use super::user::{Registration, User, normalize_email, verify_password};
use crate::ports::StoragePort;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::market_port::MarketPort;

/// How many times an order is re-planned when its commit finds stale state.
pub const MAX_SETTLE_ATTEMPTS: usize = 3;

type Planner = fn(
    &User,
    &Instrument,
    Option<&Holding>,
    i64,
    f64,
    chrono::DateTime<Utc>,
) -> Result<Settlement, BolsaError>;

/// Outcome of a settled order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeReceipt {
    pub trade_id: i64,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub price: f64,
    pub exchange_rate: f64,
    /// Cost or proceeds in the home currency.
    pub amount: f64,
    pub cash_balance: f64,
}

/// Insert the default catalog when the store has no instruments.
/// Returns how many instruments were inserted.
pub fn seed_catalog<M, R>(market: &M, rng: &mut R) -> Result<usize, BolsaError>
where
    M: MarketPort + ?Sized,
    R: Rng,
{
    if market.instrument_count()? > 0 {
        return Ok(0);
    }
    let rows: Vec<_> = DEFAULT_CATALOG
        .iter()
        .map(|entry| entry.to_new_instrument(rng))
        .collect();
    market.insert_instruments(&rows)?;
    tracing::info!(count = rows.len(), "seeded instrument catalog");
    Ok(rows.len())
}

pub struct TradingDesk {
    store: Arc<dyn StoragePort>,
    rates: Arc<ExchangeRateCell>,
    initial_cash: f64,
}

impl TradingDesk {
    pub fn new(store: Arc<dyn StoragePort>, rates: Arc<ExchangeRateCell>, initial_cash: f64) -> Self {
        Self {
            store,
            rates,
            initial_cash,
        }
    }

    pub fn rates(&self) -> Arc<ExchangeRateCell> {
        Arc::clone(&self.rates)
    }

    pub fn register(&self, registration: Registration) -> Result<User, BolsaError> {
        registration.validate()?;
        if self
            .store
            .find_user_by_username(registration.username.trim())?
            .is_some()
        {
            return Err(BolsaError::Registration {
                reason: "username is already taken".to_string(),
            });
        }
        if self
            .store
            .find_user_by_email(&normalize_email(&registration.email))?
            .is_some()
        {
            return Err(BolsaError::Registration {
                reason: "email is already registered".to_string(),
            });
        }
        let new_user = registration.into_new_user(self.initial_cash)?;
        let user = self.store.create_user(&new_user)?;
        tracing::info!(user_id = user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Look up by email and verify the password hash.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, BolsaError> {
        let user = match self.store.find_user_by_email(&normalize_email(email))? {
            Some(u) => u,
            None => return Ok(None),
        };
        if verify_password(password, &user.password_hash) {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    pub fn user(&self, user_id: i64) -> Result<User, BolsaError> {
        self.store
            .find_user(user_id)?
            .ok_or_else(|| BolsaError::not_found(format!("user {user_id}")))
    }

    pub fn buy(&self, user_id: i64, symbol: &str, quantity: i64) -> Result<TradeReceipt, BolsaError> {
        self.settle(user_id, symbol, quantity, plan_buy)
    }

    pub fn sell(&self, user_id: i64, symbol: &str, quantity: i64) -> Result<TradeReceipt, BolsaError> {
        self.settle(user_id, symbol, quantity, plan_sell)
    }

    fn settle(
        &self,
        user_id: i64,
        symbol: &str,
        quantity: i64,
        plan: Planner,
    ) -> Result<TradeReceipt, BolsaError> {
        check_quantity(quantity)?;
        let symbol = normalize_symbol(symbol);

        for attempt in 1..=MAX_SETTLE_ATTEMPTS {
            let user = self.user(user_id)?;
            let instrument = self
                .store
                .find_instrument(&symbol)?
                .ok_or_else(|| BolsaError::not_found(format!("instrument {symbol}")))?;
            let holding = self.store.holding(user_id, instrument.id)?;
            let rate = self.rates.rate();

            let settlement = plan(&user, &instrument, holding.as_ref(), quantity, rate, Utc::now())?;

            match self.store.commit_settlement(&settlement) {
                Ok(trade_id) => {
                    tracing::info!(
                        user_id,
                        symbol = %instrument.symbol,
                        side = %settlement.trade.side,
                        quantity,
                        price = settlement.trade.price,
                        rate,
                        amount = settlement.amount,
                        "trade settled"
                    );
                    return Ok(TradeReceipt {
                        trade_id,
                        symbol: instrument.symbol,
                        side: settlement.trade.side,
                        quantity,
                        price: settlement.trade.price,
                        exchange_rate: rate,
                        amount: settlement.amount,
                        cash_balance: settlement.new_cash,
                    });
                }
                Err(BolsaError::Conflict) => {
                    tracing::debug!(user_id, attempt, "stale account state, re-planning");
                }
                Err(e) => return Err(e),
            }
        }

        Err(BolsaError::Conflict)
    }

    pub fn portfolio_snapshot(&self, user_id: i64) -> Result<PortfolioSnapshot, BolsaError> {
        let user = self.user(user_id)?;
        let holdings = self.store.holdings(user_id)?;
        let instruments = self.store.list_instruments()?;
        build_snapshot(&holdings, &instruments, user.cash_balance, self.rates.rate())
    }

    pub fn exchange_rate(&self) -> ExchangeRate {
        self.rates.get()
    }

    pub fn list_instruments(&self) -> Result<Vec<Instrument>, BolsaError> {
        self.store.list_instruments()
    }

    pub fn recent_trades(&self, user_id: i64, limit: usize) -> Result<Vec<TradeRecord>, BolsaError> {
        self.store.recent_trades(user_id, limit)
    }
}

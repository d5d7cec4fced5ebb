//! Buy/sell settlement planning.
//!
//! Planning is pure: it reads the user, instrument, existing holding and the
//! exchange rate and produces a [`Settlement`] describing every mutation. The
//! ledger applies a settlement all-or-nothing, and only if the cash balance and
//! held quantity it was planned from are still current.

use chrono::{DateTime, Utc};

use super::error::BolsaError;
use super::holding::Holding;
use super::instrument::Instrument;
use super::trade::{NewTrade, Side};
use super::user::User;

#[derive(Debug, Clone, PartialEq)]
pub enum HoldingChange {
    Open(Holding),
    Update(Holding),
    Remove { user_id: i64, instrument_id: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub user_id: i64,
    /// Cash balance the plan was computed from.
    pub expected_cash: f64,
    pub new_cash: f64,
    /// Held quantity the plan was computed from, 0 when nothing was held.
    pub expected_quantity: i64,
    pub holding: HoldingChange,
    pub trade: NewTrade,
    /// Cost (buy) or proceeds (sell) in the home currency.
    pub amount: f64,
}

pub fn check_quantity(quantity: i64) -> Result<(), BolsaError> {
    if quantity <= 0 {
        return Err(BolsaError::InvalidQuantity { quantity });
    }
    Ok(())
}

/// Home-currency value of `quantity` units at `price`, converted at `rate`.
pub fn converted_amount(price: f64, quantity: i64, rate: f64) -> f64 {
    price * quantity as f64 * rate
}

pub fn plan_buy(
    user: &User,
    instrument: &Instrument,
    existing: Option<&Holding>,
    quantity: i64,
    rate: f64,
    now: DateTime<Utc>,
) -> Result<Settlement, BolsaError> {
    check_quantity(quantity)?;

    let price = instrument.current_price;
    let cost = converted_amount(price, quantity, rate);
    if user.cash_balance < cost {
        return Err(BolsaError::InsufficientFunds {
            required: cost,
            available: user.cash_balance,
        });
    }

    let (holding, expected_quantity) = match existing {
        Some(h) => (HoldingChange::Update(h.merge_lot(quantity, price)), h.quantity),
        None => (
            HoldingChange::Open(Holding::open(user.id, instrument.id, quantity, price)),
            0,
        ),
    };

    Ok(Settlement {
        user_id: user.id,
        expected_cash: user.cash_balance,
        new_cash: user.cash_balance - cost,
        expected_quantity,
        holding,
        trade: NewTrade {
            user_id: user.id,
            instrument_id: instrument.id,
            side: Side::Buy,
            quantity,
            price,
            timestamp: now,
        },
        amount: cost,
    })
}

pub fn plan_sell(
    user: &User,
    instrument: &Instrument,
    existing: Option<&Holding>,
    quantity: i64,
    rate: f64,
    now: DateTime<Utc>,
) -> Result<Settlement, BolsaError> {
    check_quantity(quantity)?;

    let held = existing
        .ok_or_else(|| BolsaError::not_found(format!("holding of {}", instrument.symbol)))?;
    if held.quantity < quantity {
        return Err(BolsaError::InsufficientShares {
            symbol: instrument.symbol.clone(),
            requested: quantity,
            held: held.quantity,
        });
    }

    let price = instrument.current_price;
    let proceeds = converted_amount(price, quantity, rate);

    let holding = if held.quantity == quantity {
        HoldingChange::Remove {
            user_id: user.id,
            instrument_id: instrument.id,
        }
    } else {
        HoldingChange::Update(Holding {
            quantity: held.quantity - quantity,
            ..held.clone()
        })
    };

    Ok(Settlement {
        user_id: user.id,
        expected_cash: user.cash_balance,
        new_cash: user.cash_balance + proceeds,
        expected_quantity: held.quantity,
        holding,
        trade: NewTrade {
            user_id: user.id,
            instrument_id: instrument.id,
            side: Side::Sell,
            quantity,
            price,
            timestamp: now,
        },
        amount: proceeds,
    })
}

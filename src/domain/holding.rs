//! Holdings: a user's open position in one instrument.

/// Invariant: `quantity > 0` while the record exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub user_id: i64,
    pub instrument_id: i64,
    pub quantity: i64,
    /// Quantity-weighted average purchase price, in instrument currency.
    pub cost_basis: f64,
}

impl Holding {
    pub fn open(user_id: i64, instrument_id: i64, quantity: i64, price: f64) -> Self {
        Holding {
            user_id,
            instrument_id,
            quantity,
            cost_basis: price,
        }
    }

    /// Merge a new lot, recomputing the weighted average cost basis.
    pub fn merge_lot(&self, quantity: i64, price: f64) -> Holding {
        let total = self.quantity + quantity;
        let cost = self.quantity as f64 * self.cost_basis + quantity as f64 * price;
        Holding {
            quantity: total,
            cost_basis: cost / total as f64,
            ..self.clone()
        }
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity as f64 * (price - self.cost_basis)
    }
}

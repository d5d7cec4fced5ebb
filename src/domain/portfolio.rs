//! Read-only portfolio valuation.

use serde::Serialize;
use std::collections::HashMap;

use super::error::BolsaError;
use super::holding::Holding;
use super::instrument::Instrument;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioLine {
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    /// Percent change since the instrument's previous close.
    pub change_today_pct: f64,
    pub quantity: i64,
    pub market_value: f64,
    pub cost_basis: f64,
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    /// Ordered by symbol.
    pub lines: Vec<PortfolioLine>,
    /// Sum of line market values, in instrument currency.
    pub total_value: f64,
    pub cash_balance: f64,
    pub exchange_rate: f64,
}

impl PortfolioSnapshot {
    /// Holdings value converted to the home currency.
    pub fn total_value_home(&self) -> f64 {
        self.total_value * self.exchange_rate
    }

    /// Cash plus converted holdings.
    pub fn net_worth(&self) -> f64 {
        self.cash_balance + self.total_value_home()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

pub fn build_snapshot(
    holdings: &[Holding],
    instruments: &[Instrument],
    cash_balance: f64,
    exchange_rate: f64,
) -> Result<PortfolioSnapshot, BolsaError> {
    let by_id: HashMap<i64, &Instrument> = instruments.iter().map(|i| (i.id, i)).collect();

    let mut lines = Vec::with_capacity(holdings.len());
    for holding in holdings {
        let inst = by_id.get(&holding.instrument_id).ok_or_else(|| {
            BolsaError::not_found(format!("instrument id {}", holding.instrument_id))
        })?;
        lines.push(PortfolioLine {
            symbol: inst.symbol.clone(),
            name: inst.name.clone(),
            current_price: inst.current_price,
            change_today_pct: inst.change_pct(),
            quantity: holding.quantity,
            market_value: holding.market_value(inst.current_price),
            cost_basis: holding.cost_basis,
            unrealized_pnl: holding.unrealized_pnl(inst.current_price),
        });
    }
    lines.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let total_value = lines.iter().map(|l| l.market_value).sum();

    Ok(PortfolioSnapshot {
        lines,
        total_value,
        cash_balance,
        exchange_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument(id: i64, symbol: &str, price: f64, previous_close: f64) -> Instrument {
        Instrument {
            id,
            symbol: symbol.to_string(),
            name: format!("{symbol} Corp."),
            current_price: price,
            previous_close,
            market: "NASDAQ".into(),
            currency: "USD".into(),
        }
    }

    #[test]
    fn empty_portfolio() {
        let snap = build_snapshot(&[], &[], 10_000.0, 18.0).unwrap();
        assert!(snap.is_empty());
        assert_eq!(snap.total_value, 0.0);
        assert_eq!(snap.cash_balance, 10_000.0);
        assert_eq!(snap.net_worth(), 10_000.0);
    }

    #[test]
    fn lines_valued_at_current_price_and_sorted() {
        let instruments = vec![
            instrument(1, "TSLA", 200.0, 250.0),
            instrument(2, "AAPL", 110.0, 100.0),
        ];
        let holdings = vec![Holding::open(9, 1, 2, 180.0), Holding::open(9, 2, 10, 100.0)];

        let snap = build_snapshot(&holdings, &instruments, 500.0, 18.0).unwrap();

        assert_eq!(snap.lines.len(), 2);
        assert_eq!(snap.lines[0].symbol, "AAPL");
        assert!((snap.lines[0].market_value - 1100.0).abs() < 1e-9);
        assert!((snap.lines[0].change_today_pct - 10.0).abs() < 1e-9);
        assert!((snap.lines[0].unrealized_pnl - 100.0).abs() < 1e-9);
        assert_eq!(snap.lines[1].symbol, "TSLA");
        assert!((snap.lines[1].change_today_pct + 20.0).abs() < 1e-9);
        assert!((snap.total_value - 1500.0).abs() < 1e-9);
        assert!((snap.total_value_home() - 27_000.0).abs() < 1e-9);
        assert!((snap.net_worth() - 27_500.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_instrument_is_not_found() {
        let holdings = vec![Holding::open(9, 99, 1, 1.0)];
        let err = build_snapshot(&holdings, &[], 0.0, 1.0).unwrap_err();
        assert!(matches!(err, BolsaError::NotFound { .. }));
    }
}

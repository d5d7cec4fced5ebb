//! Tradable instruments and the seed catalog.

use rand::Rng;
use serde::Serialize;

/// A listed instrument with a simulated market price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instrument {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    /// Reference price that daily change is measured against.
    pub previous_close: f64,
    pub market: String,
    pub currency: String,
}

impl Instrument {
    /// Percentage change of the current price against the previous close.
    pub fn change_pct(&self) -> f64 {
        if self.previous_close == 0.0 {
            return 0.0;
        }
        (self.current_price - self.previous_close) / self.previous_close * 100.0
    }
}

/// An instrument to be inserted, before it has a store id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInstrument {
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub previous_close: f64,
    pub market: String,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogEntry {
    pub symbol: &'static str,
    pub name: &'static str,
    pub price: f64,
    pub market: &'static str,
}

pub const CATALOG_CURRENCY: &str = "USD";

/// Instruments loaded into an empty store at startup.
pub const DEFAULT_CATALOG: &[CatalogEntry] = &[
    CatalogEntry { symbol: "AAPL", name: "Apple Inc.", price: 150.25, market: "NASDAQ" },
    CatalogEntry { symbol: "TSLA", name: "Tesla Inc.", price: 245.80, market: "NASDAQ" },
    CatalogEntry { symbol: "MSFT", name: "Microsoft Corp.", price: 330.45, market: "NASDAQ" },
    CatalogEntry { symbol: "GOOGL", name: "Alphabet Inc.", price: 135.10, market: "NASDAQ" },
    CatalogEntry { symbol: "AMZN", name: "Amazon.com Inc.", price: 145.75, market: "NASDAQ" },
    CatalogEntry { symbol: "META", name: "Meta Platforms Inc.", price: 315.60, market: "NASDAQ" },
    CatalogEntry { symbol: "NVDA", name: "NVIDIA Corp.", price: 485.20, market: "NASDAQ" },
    CatalogEntry { symbol: "AMD", name: "Advanced Micro Devices", price: 112.35, market: "NASDAQ" },
    CatalogEntry { symbol: "AMX", name: "América Móvil", price: 15.80, market: "MBV" },
    CatalogEntry { symbol: "WALMEX", name: "Walmart México", price: 65.30, market: "MBV" },
    CatalogEntry { symbol: "FEMSA", name: "FEMSA", price: 185.45, market: "MBV" },
    CatalogEntry { symbol: "GFNORTE", name: "Grupo Financiero Banorte", price: 142.20, market: "MBV" },
    CatalogEntry { symbol: "CEMEX", name: "CEMEX", price: 9.85, market: "MBV" },
];

impl CatalogEntry {
    /// Build the row to insert. The previous close is jittered by up to 2%
    /// so the dashboard shows a non-zero change from the first render.
    pub fn to_new_instrument<R: Rng>(&self, rng: &mut R) -> NewInstrument {
        NewInstrument {
            symbol: self.symbol.to_string(),
            name: self.name.to_string(),
            current_price: self.price,
            previous_close: self.price * rng.gen_range(0.98..=1.02),
            market: self.market.to_string(),
            currency: CATALOG_CURRENCY.to_string(),
        }
    }
}

/// Normalize a user-entered symbol for lookup.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample(price: f64, previous_close: f64) -> Instrument {
        Instrument {
            id: 1,
            symbol: "AAPL".into(),
            name: "Apple Inc.".into(),
            current_price: price,
            previous_close,
            market: "NASDAQ".into(),
            currency: "USD".into(),
        }
    }

    #[test]
    fn change_pct_positive() {
        let inst = sample(110.0, 100.0);
        assert!((inst.change_pct() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn change_pct_negative() {
        let inst = sample(95.0, 100.0);
        assert!((inst.change_pct() + 5.0).abs() < 1e-9);
    }

    #[test]
    fn change_pct_zero_reference() {
        assert_eq!(sample(10.0, 0.0).change_pct(), 0.0);
    }

    #[test]
    fn catalog_symbols_are_unique() {
        let mut symbols: Vec<_> = DEFAULT_CATALOG.iter().map(|e| e.symbol).collect();
        symbols.sort();
        symbols.dedup();
        assert_eq!(symbols.len(), DEFAULT_CATALOG.len());
        assert_eq!(DEFAULT_CATALOG.len(), 13);
    }

    #[test]
    fn seeded_previous_close_within_two_percent() {
        let mut rng = StdRng::seed_from_u64(7);
        for entry in DEFAULT_CATALOG {
            let row = entry.to_new_instrument(&mut rng);
            assert_eq!(row.current_price, entry.price);
            assert!(row.previous_close >= entry.price * 0.98 - 1e-9);
            assert!(row.previous_close <= entry.price * 1.02 + 1e-9);
            assert_eq!(row.currency, "USD");
        }
    }

    #[test]
    fn normalize_symbol_trims_and_uppercases() {
        assert_eq!(normalize_symbol("  aapl "), "AAPL");
    }
}

//! Bounded random-walk price simulation.

use rand::Rng;
use std::sync::Arc;

use super::error::BolsaError;
use crate::ports::market_port::MarketPort;

pub const DEFAULT_PRICE_BAND: f64 = 0.02;
pub const DEFAULT_PRICE_FLOOR: f64 = 0.01;

/// Round to whole cents.
pub fn round_price(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

/// Apply one uniform percentage change in `[-band, band]`, rounded to cents
/// and clamped to `floor`.
pub fn perturb_price<R: Rng>(price: f64, band: f64, floor: f64, rng: &mut R) -> f64 {
    let change = rng.gen_range(-band..=band);
    round_price(price * (1.0 + change)).max(floor)
}

pub struct PriceSimulator<M: MarketPort + ?Sized> {
    market: Arc<M>,
    band: f64,
    floor: f64,
}

impl<M: MarketPort + ?Sized> PriceSimulator<M> {
    pub fn new(market: Arc<M>, band: f64, floor: f64) -> Self {
        Self {
            market,
            band,
            floor,
        }
    }

    /// Perturb every instrument's price once and persist. Returns the number
    /// of instruments updated.
    pub fn tick<R: Rng>(&self, rng: &mut R) -> Result<usize, BolsaError> {
        let instruments = self.market.list_instruments()?;
        let prices: Vec<(i64, f64)> = instruments
            .iter()
            .map(|inst| {
                (
                    inst.id,
                    perturb_price(inst.current_price, self.band, self.floor, rng),
                )
            })
            .collect();
        self.market.update_prices(&prices)?;
        Ok(prices.len())
    }
}

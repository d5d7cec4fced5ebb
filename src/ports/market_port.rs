//! Instrument catalog and price storage port.

use crate::domain::error::BolsaError;
use crate::domain::instrument::{Instrument, NewInstrument};

pub trait MarketPort {
    /// All instruments ordered by symbol.
    fn list_instruments(&self) -> Result<Vec<Instrument>, BolsaError>;

    fn find_instrument(&self, symbol: &str) -> Result<Option<Instrument>, BolsaError>;

    fn instrument_count(&self) -> Result<usize, BolsaError>;

    fn insert_instruments(&self, rows: &[NewInstrument]) -> Result<(), BolsaError>;

    /// Overwrite current prices, keyed by instrument id. Unknown ids are ignored.
    fn update_prices(&self, prices: &[(i64, f64)]) -> Result<(), BolsaError>;
}

//! External exchange-rate source port.

use async_trait::async_trait;

use crate::domain::error::BolsaError;

#[async_trait]
pub trait RateSourcePort: Send + Sync {
    /// Fetch home-currency units per instrument-currency unit.
    ///
    /// Any failure is reported as `ExternalSourceUnavailable`.
    async fn fetch_rate(&self) -> Result<f64, BolsaError>;
}

//! The shared exchange rate and its updater.
//!
//! The rate lives in an [`ExchangeRateCell`] owned by whoever builds the
//! application. The [`ExchangeRateUpdater`] is its only writer; settlement and
//! portfolio views read it. Readers racing an update see either the old or the
//! new value.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::{Arc, RwLock};

use crate::ports::rate_source_port::RateSourcePort;

pub const DEFAULT_INITIAL_RATE: f64 = 18.35;
pub const DEFAULT_RATE_BAND: f64 = 0.02;
/// Lowest rate the random walk may produce.
pub const RATE_FLOOR: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateOrigin {
    Initial,
    Live,
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExchangeRate {
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
    pub origin: RateOrigin,
}

#[derive(Debug)]
pub struct ExchangeRateCell {
    inner: RwLock<ExchangeRate>,
}

impl ExchangeRateCell {
    pub fn new(rate: f64) -> Self {
        Self {
            inner: RwLock::new(ExchangeRate {
                rate,
                updated_at: Utc::now(),
                origin: RateOrigin::Initial,
            }),
        }
    }

    pub fn get(&self) -> ExchangeRate {
        *self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn rate(&self) -> f64 {
        self.get().rate
    }

    pub fn set(&self, rate: f64, origin: RateOrigin) -> ExchangeRate {
        let next = ExchangeRate {
            rate,
            updated_at: Utc::now(),
            origin,
        };
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = next;
        next
    }
}

pub fn round_rate(rate: f64) -> f64 {
    (rate * 100.0).round() / 100.0
}

/// Fallback step: move the rate by a uniform change in `[-band, band]`.
pub fn random_walk<R: Rng>(rate: f64, band: f64, rng: &mut R) -> f64 {
    let change = rng.gen_range(-band..=band);
    round_rate(rate * (1.0 + change)).max(RATE_FLOOR)
}

pub struct ExchangeRateUpdater {
    cell: Arc<ExchangeRateCell>,
    source: Arc<dyn RateSourcePort>,
    band: f64,
}

impl ExchangeRateUpdater {
    pub fn new(cell: Arc<ExchangeRateCell>, source: Arc<dyn RateSourcePort>, band: f64) -> Self {
        Self { cell, source, band }
    }

    /// Refresh the shared rate once: the live value when the source answers,
    /// a random walk of the current value otherwise.
    pub async fn tick<R: Rng + Send>(&self, rng: &mut R) -> ExchangeRate {
        match self.source.fetch_rate().await {
            Ok(rate) if rate.is_finite() && rate > 0.0 => {
                let updated = self.cell.set(round_rate(rate), RateOrigin::Live);
                tracing::info!(rate = updated.rate, "exchange rate updated from live source");
                updated
            }
            Ok(rate) => {
                tracing::warn!(rate, "live source returned an unusable rate, simulating");
                self.simulate(rng)
            }
            Err(e) => {
                tracing::warn!(error = %e, "live source unavailable, simulating");
                self.simulate(rng)
            }
        }
    }

    fn simulate<R: Rng>(&self, rng: &mut R) -> ExchangeRate {
        let next = random_walk(self.cell.rate(), self.band, rng);
        let updated = self.cell.set(next, RateOrigin::Simulated);
        tracing::info!(rate = updated.rate, "exchange rate simulated");
        updated
    }
}

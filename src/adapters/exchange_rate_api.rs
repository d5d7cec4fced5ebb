//! Live exchange rate over HTTP.
//!
//! Expects a `latest` endpoint answering `{"base": "USD", "rates": {"MXN": 18.4, ...}}`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::error::BolsaError;
use crate::domain::settings::{ExchangeRateSettings, TradingSettings};
use crate::ports::rate_source_port::RateSourcePort;

#[derive(Debug, Deserialize)]
pub struct LatestRatesDto {
    #[serde(default)]
    pub base: Option<String>,
    pub rates: HashMap<String, f64>,
}

pub struct HttpRateSource {
    client: Client,
    url: String,
    currency: String,
}

fn unavailable(reason: impl std::fmt::Display) -> BolsaError {
    BolsaError::ExternalSourceUnavailable {
        reason: reason.to_string(),
    }
}

/// Pull `rates[currency]` out of a decoded response body.
pub fn parse_rate(data: Value, currency: &str) -> Result<f64, BolsaError> {
    let dto = match data {
        Value::Object(obj) => serde_json::from_value::<LatestRatesDto>(Value::Object(obj))
            .map_err(|e| unavailable(format!("malformed rate response: {e}")))?,
        _ => return Err(unavailable("unexpected rate response: not an object")),
    };
    dto.rates
        .get(currency)
        .copied()
        .ok_or_else(|| unavailable(format!("no {currency} rate in response")))
}

impl HttpRateSource {
    pub fn new(url: impl Into<String>, currency: impl Into<String>, timeout: Duration) -> Result<Self, BolsaError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(unavailable)?;
        Ok(Self {
            client,
            url: url.into(),
            currency: currency.into(),
        })
    }

    pub fn from_settings(
        rate: &ExchangeRateSettings,
        trading: &TradingSettings,
    ) -> Result<Self, BolsaError> {
        Self::new(rate.url.clone(), trading.home_currency.clone(), rate.timeout)
    }
}

#[async_trait]
impl RateSourcePort for HttpRateSource {
    async fn fetch_rate(&self) -> Result<f64, BolsaError> {
        let res = self.client.get(&self.url).send().await.map_err(unavailable)?;

        if !res.status().is_success() {
            return Err(unavailable(format!("request failed: {}", res.status())));
        }

        let data = res.json::<Value>().await.map_err(unavailable)?;
        parse_rate(data, &self.currency)
    }
}

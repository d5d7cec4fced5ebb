//! Typed, validated settings read from a [`ConfigPort`].

use std::net::SocketAddr;
use std::time::Duration;

use super::error::BolsaError;
use super::exchange_rate::{DEFAULT_INITIAL_RATE, DEFAULT_RATE_BAND};
use super::simulator::{DEFAULT_PRICE_BAND, DEFAULT_PRICE_FLOOR};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_INITIAL_CASH: f64 = 10_000.0;
pub const DEFAULT_RATE_URL: &str = "https://api.exchangerate-api.com/v4/latest/USD";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct TradingSettings {
    pub initial_cash: f64,
    pub initial_exchange_rate: f64,
    /// Currency instruments are quoted in.
    pub base_currency: String,
    /// Currency user cash is held in.
    pub home_currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorSettings {
    pub interval: Duration,
    pub backoff: Duration,
    pub band: f64,
    pub price_floor: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRateSettings {
    pub url: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub band: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebSettings {
    pub listen: SocketAddr,
    pub static_dir: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub trading: TradingSettings,
    pub simulator: SimulatorSettings,
    pub exchange_rate: ExchangeRateSettings,
    pub web: WebSettings,
}

impl Settings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BolsaError> {
        Ok(Settings {
            trading: TradingSettings::from_config(config)?,
            simulator: SimulatorSettings::from_config(config)?,
            exchange_rate: ExchangeRateSettings::from_config(config)?,
            web: WebSettings::from_config(config)?,
        })
    }
}

impl TradingSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BolsaError> {
        let initial_cash = config.get_double("trading", "initial_cash", DEFAULT_INITIAL_CASH);
        if initial_cash < 0.0 || !initial_cash.is_finite() {
            return Err(invalid("trading", "initial_cash", "initial_cash must be non-negative"));
        }
        let initial_exchange_rate =
            config.get_double("trading", "initial_exchange_rate", DEFAULT_INITIAL_RATE);
        positive("trading", "initial_exchange_rate", initial_exchange_rate)?;

        Ok(TradingSettings {
            initial_cash,
            initial_exchange_rate,
            base_currency: config.get_string_or("trading", "base_currency", "USD"),
            home_currency: config.get_string_or("trading", "home_currency", "MXN"),
        })
    }
}

impl SimulatorSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BolsaError> {
        let band = config.get_double("simulator", "band", DEFAULT_PRICE_BAND);
        fraction("simulator", "band", band)?;
        let price_floor = config.get_double("simulator", "price_floor", DEFAULT_PRICE_FLOOR);
        positive("simulator", "price_floor", price_floor)?;

        Ok(SimulatorSettings {
            interval: seconds(config, "simulator", "interval_secs", 30)?,
            backoff: seconds(config, "simulator", "backoff_secs", 10)?,
            band,
            price_floor,
        })
    }
}

impl ExchangeRateSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BolsaError> {
        let band = config.get_double("exchange_rate", "band", DEFAULT_RATE_BAND);
        fraction("exchange_rate", "band", band)?;
        let url = config.get_string_or("exchange_rate", "url", DEFAULT_RATE_URL);
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("exchange_rate", "url", "url must be http or https"));
        }

        Ok(ExchangeRateSettings {
            url,
            interval: seconds(config, "exchange_rate", "interval_secs", 300)?,
            timeout: seconds(config, "exchange_rate", "timeout_secs", 10)?,
            band,
        })
    }
}

impl WebSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BolsaError> {
        let listen = config.get_string_or("web", "listen", DEFAULT_LISTEN);
        let listen = listen
            .parse()
            .map_err(|_| invalid("web", "listen", "listen must be host:port"))?;
        Ok(WebSettings {
            listen,
            static_dir: config.get_string_or("web", "static_dir", "static"),
        })
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> BolsaError {
    BolsaError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn positive(section: &str, key: &str, value: f64) -> Result<(), BolsaError> {
    if value <= 0.0 || !value.is_finite() {
        return Err(invalid(section, key, &format!("{key} must be positive")));
    }
    Ok(())
}

fn fraction(section: &str, key: &str, value: f64) -> Result<(), BolsaError> {
    if !(value > 0.0 && value < 1.0) {
        return Err(invalid(section, key, &format!("{key} must be between 0 and 1")));
    }
    Ok(())
}

fn seconds(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<Duration, BolsaError> {
    let value = config.get_int(section, key, default);
    if value <= 0 {
        return Err(invalid(section, key, &format!("{key} must be positive")));
    }
    Ok(Duration::from_secs(value as u64))
}

//! bolsa: a simulated stock trading desk.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. The perpetual price and
//! exchange-rate loops live in [`background`].

pub mod adapters;
pub mod background;
pub mod cli;
pub mod domain;
pub mod ports;

//! Core domain types and logic.

pub mod desk;
pub mod error;
pub mod exchange_rate;
pub mod holding;
pub mod instrument;
pub mod portfolio;
pub mod settings;
pub mod settlement;
pub mod simulator;
pub mod trade;
pub mod user;

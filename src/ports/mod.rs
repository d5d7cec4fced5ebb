//! Port traits at the storage, configuration and rate-source seams.

pub mod config_port;
pub mod ledger_port;
pub mod market_port;
pub mod rate_source_port;

use ledger_port::LedgerPort;
use market_port::MarketPort;

/// A store that serves both the instrument catalog and user ledgers.
pub trait StoragePort: MarketPort + LedgerPort + Send + Sync {}

impl<T: MarketPort + LedgerPort + Send + Sync> StoragePort for T {}

//! User accounts, holdings and trade log storage port.

use crate::domain::error::BolsaError;
use crate::domain::holding::Holding;
use crate::domain::settlement::Settlement;
use crate::domain::trade::TradeRecord;
use crate::domain::user::{NewUser, User};

pub trait LedgerPort {
    /// Insert a user. A duplicate username or email yields `Registration`.
    fn create_user(&self, user: &NewUser) -> Result<User, BolsaError>;

    fn find_user(&self, id: i64) -> Result<Option<User>, BolsaError>;

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, BolsaError>;

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, BolsaError>;

    fn holdings(&self, user_id: i64) -> Result<Vec<Holding>, BolsaError>;

    fn holding(&self, user_id: i64, instrument_id: i64) -> Result<Option<Holding>, BolsaError>;

    /// Apply every mutation of a settlement atomically and return the new trade id.
    ///
    /// Fails with `Conflict`, changing nothing, when the user's cash balance or
    /// held quantity no longer match `expected_cash` / `expected_quantity`.
    fn commit_settlement(&self, settlement: &Settlement) -> Result<i64, BolsaError>;

    /// Most recent trades first, with the instrument symbol resolved.
    fn recent_trades(&self, user_id: i64, limit: usize) -> Result<Vec<TradeRecord>, BolsaError>;
}

//! PostgreSQL storage adapter.

use crate::domain::error::BolsaError;
use crate::domain::holding::Holding;
use crate::domain::instrument::{Instrument, NewInstrument};
use crate::domain::settlement::{HoldingChange, Settlement};
use crate::domain::trade::{Side, TradeRecord};
use crate::domain::user::{NewUser, User};
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::market_port::MarketPort;
use chrono::{DateTime, Utc};
use postgres::error::SqlState;
use postgres::types::ToSql;
use postgres::{NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;

type Manager = PostgresConnectionManager<NoTls>;

pub struct PostgresAdapter {
    pool: Pool<Manager>,
}

fn query_err(e: postgres::Error) -> BolsaError {
    BolsaError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn user_from_row(row: &Row) -> User {
    User {
        id: row.get(0),
        username: row.get(1),
        email: row.get(2),
        password_hash: row.get(3),
        cash_balance: row.get(4),
    }
}

fn instrument_from_row(row: &Row) -> Instrument {
    Instrument {
        id: row.get(0),
        symbol: row.get(1),
        name: row.get(2),
        current_price: row.get(3),
        previous_close: row.get(4),
        market: row.get(5),
        currency: row.get(6),
    }
}

fn holding_from_row(row: &Row) -> Holding {
    Holding {
        user_id: row.get(0),
        instrument_id: row.get(1),
        quantity: row.get(2),
        cost_basis: row.get(3),
    }
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BolsaError> {
        // Try [postgres] connection_string first, fall back to [database] conninfo
        let connection_string = config
            .get_string("postgres", "connection_string")
            .or_else(|| config.get_string("database", "conninfo"))
            .ok_or_else(|| BolsaError::ConfigMissing {
                section: "database".into(),
                key: "conninfo".into(),
            })?;

        let pg_config = connection_string
            .parse::<postgres::Config>()
            .map_err(|e| BolsaError::ConfigInvalid {
                section: "postgres".into(),
                key: "connection_string".into(),
                reason: e.to_string(),
            })?;

        let pool_size = config.get_int("postgres", "pool_size", 4).max(1) as u32;
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(PostgresConnectionManager::new(pg_config, NoTls))
            .map_err(|e| BolsaError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<Manager>, BolsaError> {
        self.pool.get().map_err(|e| BolsaError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), BolsaError> {
        let mut client = self.conn()?;
        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS users (
                    id BIGSERIAL PRIMARY KEY,
                    username TEXT NOT NULL UNIQUE,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    cash_balance DOUBLE PRECISION NOT NULL
                );
                CREATE TABLE IF NOT EXISTS instruments (
                    id BIGSERIAL PRIMARY KEY,
                    symbol TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    current_price DOUBLE PRECISION NOT NULL,
                    previous_close DOUBLE PRECISION NOT NULL,
                    market TEXT NOT NULL,
                    currency TEXT NOT NULL DEFAULT 'USD'
                );
                CREATE TABLE IF NOT EXISTS holdings (
                    user_id BIGINT NOT NULL REFERENCES users(id),
                    instrument_id BIGINT NOT NULL REFERENCES instruments(id),
                    quantity BIGINT NOT NULL CHECK (quantity > 0),
                    cost_basis DOUBLE PRECISION NOT NULL,
                    PRIMARY KEY (user_id, instrument_id)
                );
                CREATE TABLE IF NOT EXISTS trades (
                    id BIGSERIAL PRIMARY KEY,
                    user_id BIGINT NOT NULL REFERENCES users(id),
                    instrument_id BIGINT NOT NULL REFERENCES instruments(id),
                    side TEXT NOT NULL CHECK (side IN ('BUY', 'SELL')),
                    quantity BIGINT NOT NULL,
                    price DOUBLE PRECISION NOT NULL,
                    timestamp TIMESTAMPTZ NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_trades_user ON trades(user_id, id);",
            )
            .map_err(query_err)
    }

    fn find_user_where(
        &self,
        clause: &str,
        value: &(dyn ToSql + Sync),
    ) -> Result<Option<User>, BolsaError> {
        let query = format!(
            "SELECT id, username, email, password_hash, cash_balance FROM users WHERE {clause}"
        );
        let row = self
            .conn()?
            .query_opt(query.as_str(), &[value])
            .map_err(query_err)?;
        Ok(row.as_ref().map(user_from_row))
    }
}

impl MarketPort for PostgresAdapter {
    fn list_instruments(&self) -> Result<Vec<Instrument>, BolsaError> {
        let rows = self
            .conn()?
            .query(
                "SELECT id, symbol, name, current_price, previous_close, market, currency \
                 FROM instruments ORDER BY symbol",
                &[],
            )
            .map_err(query_err)?;
        Ok(rows.iter().map(instrument_from_row).collect())
    }

    fn find_instrument(&self, symbol: &str) -> Result<Option<Instrument>, BolsaError> {
        let row = self
            .conn()?
            .query_opt(
                "SELECT id, symbol, name, current_price, previous_close, market, currency \
                 FROM instruments WHERE symbol = $1",
                &[&symbol],
            )
            .map_err(query_err)?;
        Ok(row.as_ref().map(instrument_from_row))
    }

    fn instrument_count(&self) -> Result<usize, BolsaError> {
        let row = self
            .conn()?
            .query_one("SELECT COUNT(*) FROM instruments", &[])
            .map_err(query_err)?;
        let count: i64 = row.get(0);
        Ok(count as usize)
    }

    fn insert_instruments(&self, rows: &[NewInstrument]) -> Result<(), BolsaError> {
        let mut client = self.conn()?;
        let mut tx = client.transaction().map_err(query_err)?;
        for inst in rows {
            tx.execute(
                "INSERT INTO instruments (symbol, name, current_price, previous_close, market, currency) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &inst.symbol,
                    &inst.name,
                    &inst.current_price,
                    &inst.previous_close,
                    &inst.market,
                    &inst.currency,
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }

    fn update_prices(&self, prices: &[(i64, f64)]) -> Result<(), BolsaError> {
        let mut client = self.conn()?;
        let mut tx = client.transaction().map_err(query_err)?;
        for (id, price) in prices {
            tx.execute(
                "UPDATE instruments SET current_price = $1 WHERE id = $2",
                &[price, id],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }
}

impl LedgerPort for PostgresAdapter {
    fn create_user(&self, user: &NewUser) -> Result<User, BolsaError> {
        let row = self
            .conn()?
            .query_one(
                "INSERT INTO users (username, email, password_hash, cash_balance) \
                 VALUES ($1, $2, $3, $4) RETURNING id",
                &[
                    &user.username,
                    &user.email,
                    &user.password_hash,
                    &user.cash_balance,
                ],
            )
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    BolsaError::Registration {
                        reason: "username or email is already registered".to_string(),
                    }
                } else {
                    query_err(e)
                }
            })?;

        Ok(User {
            id: row.get(0),
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            cash_balance: user.cash_balance,
        })
    }

    fn find_user(&self, id: i64) -> Result<Option<User>, BolsaError> {
        self.find_user_where("id = $1", &id)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, BolsaError> {
        self.find_user_where("email = $1", &email)
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, BolsaError> {
        self.find_user_where("username = $1", &username)
    }

    fn holdings(&self, user_id: i64) -> Result<Vec<Holding>, BolsaError> {
        let rows = self
            .conn()?
            .query(
                "SELECT user_id, instrument_id, quantity, cost_basis \
                 FROM holdings WHERE user_id = $1 ORDER BY instrument_id",
                &[&user_id],
            )
            .map_err(query_err)?;
        Ok(rows.iter().map(holding_from_row).collect())
    }

    fn holding(&self, user_id: i64, instrument_id: i64) -> Result<Option<Holding>, BolsaError> {
        let row = self
            .conn()?
            .query_opt(
                "SELECT user_id, instrument_id, quantity, cost_basis \
                 FROM holdings WHERE user_id = $1 AND instrument_id = $2",
                &[&user_id, &instrument_id],
            )
            .map_err(query_err)?;
        Ok(row.as_ref().map(holding_from_row))
    }

    fn commit_settlement(&self, settlement: &Settlement) -> Result<i64, BolsaError> {
        let mut client = self.conn()?;
        let mut tx = client.transaction().map_err(query_err)?;

        let updated = tx
            .execute(
                "UPDATE users SET cash_balance = $1 WHERE id = $2 AND cash_balance = $3",
                &[
                    &settlement.new_cash,
                    &settlement.user_id,
                    &settlement.expected_cash,
                ],
            )
            .map_err(query_err)?;
        if updated != 1 {
            return Err(BolsaError::Conflict);
        }

        let changed = match &settlement.holding {
            HoldingChange::Open(h) => tx.execute(
                "INSERT INTO holdings (user_id, instrument_id, quantity, cost_basis) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (user_id, instrument_id) DO NOTHING",
                &[&h.user_id, &h.instrument_id, &h.quantity, &h.cost_basis],
            ),
            HoldingChange::Update(h) => tx.execute(
                "UPDATE holdings SET quantity = $1, cost_basis = $2 \
                 WHERE user_id = $3 AND instrument_id = $4 AND quantity = $5",
                &[
                    &h.quantity,
                    &h.cost_basis,
                    &h.user_id,
                    &h.instrument_id,
                    &settlement.expected_quantity,
                ],
            ),
            HoldingChange::Remove {
                user_id,
                instrument_id,
            } => tx.execute(
                "DELETE FROM holdings WHERE user_id = $1 AND instrument_id = $2 AND quantity = $3",
                &[user_id, instrument_id, &settlement.expected_quantity],
            ),
        }
        .map_err(query_err)?;
        if changed != 1 {
            return Err(BolsaError::Conflict);
        }

        let trade = &settlement.trade;
        let row = tx
            .query_one(
                "INSERT INTO trades (user_id, instrument_id, side, quantity, price, timestamp) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
                &[
                    &trade.user_id,
                    &trade.instrument_id,
                    &trade.side.as_str(),
                    &trade.quantity,
                    &trade.price,
                    &trade.timestamp,
                ],
            )
            .map_err(query_err)?;
        let trade_id: i64 = row.get(0);

        tx.commit().map_err(query_err)?;
        Ok(trade_id)
    }

    fn recent_trades(&self, user_id: i64, limit: usize) -> Result<Vec<TradeRecord>, BolsaError> {
        let rows = self
            .conn()?
            .query(
                "SELECT t.id, t.user_id, t.instrument_id, i.symbol, t.side, t.quantity, t.price, t.timestamp \
                 FROM trades t JOIN instruments i ON i.id = t.instrument_id \
                 WHERE t.user_id = $1 \
                 ORDER BY t.id DESC \
                 LIMIT $2",
                &[&user_id, &(limit as i64)],
            )
            .map_err(query_err)?;

        let mut trades = Vec::with_capacity(rows.len());
        for row in rows {
            let side_str: String = row.get(4);
            let side = side_str
                .parse::<Side>()
                .map_err(|reason| BolsaError::DatabaseQuery { reason })?;
            let timestamp: DateTime<Utc> = row.get(7);
            trades.push(TradeRecord {
                id: row.get(0),
                user_id: row.get(1),
                instrument_id: row.get(2),
                symbol: row.get(3),
                side,
                quantity: row.get(5),
                price: row.get(6),
                timestamp,
            });
        }
        Ok(trades)
    }
}

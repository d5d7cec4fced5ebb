//! SQLite storage adapter.

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
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, Row, params};

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

const USER_COLUMNS: &str = "id, username, email, password_hash, cash_balance";
const INSTRUMENT_COLUMNS: &str =
    "id, symbol, name, current_price, previous_close, market, currency";

fn pool_err(e: r2d2::Error) -> BolsaError {
    BolsaError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> BolsaError {
    BolsaError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        cash_balance: row.get(4)?,
    })
}

fn instrument_from_row(row: &Row<'_>) -> rusqlite::Result<Instrument> {
    Ok(Instrument {
        id: row.get(0)?,
        symbol: row.get(1)?,
        name: row.get(2)?,
        current_price: row.get(3)?,
        previous_close: row.get(4)?,
        market: row.get(5)?,
        currency: row.get(6)?,
    })
}

fn holding_from_row(row: &Row<'_>) -> rusqlite::Result<Holding> {
    Ok(Holding {
        user_id: row.get(0)?,
        instrument_id: row.get(1)?,
        quantity: row.get(2)?,
        cost_basis: row.get(3)?,
    })
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<TradeRecord> {
    let side_str: String = row.get(4)?;
    let side = side_str.parse::<Side>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;
    let ts_str: String = row.get(7)?;
    let timestamp = DateTime::parse_from_rfc3339(&ts_str)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?
        .with_timezone(&Utc);
    Ok(TradeRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        instrument_id: row.get(2)?,
        symbol: row.get(3)?,
        side,
        quantity: row.get(5)?,
        price: row.get(6)?,
        timestamp,
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BolsaError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| BolsaError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;"));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, BolsaError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        // A single connection: every in-memory connection is its own database.
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, BolsaError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), BolsaError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                cash_balance REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS instruments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                current_price REAL NOT NULL,
                previous_close REAL NOT NULL,
                market TEXT NOT NULL,
                currency TEXT NOT NULL DEFAULT 'USD'
            );
            CREATE TABLE IF NOT EXISTS holdings (
                user_id INTEGER NOT NULL REFERENCES users(id),
                instrument_id INTEGER NOT NULL REFERENCES instruments(id),
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                cost_basis REAL NOT NULL,
                PRIMARY KEY (user_id, instrument_id)
            );
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                instrument_id INTEGER NOT NULL REFERENCES instruments(id),
                side TEXT NOT NULL CHECK (side IN ('BUY', 'SELL')),
                quantity INTEGER NOT NULL,
                price REAL NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trades_user ON trades(user_id, id);",
        )
        .map_err(query_err)?;

        Ok(())
    }

    fn find_user_where(&self, clause: &str, value: &dyn rusqlite::ToSql) -> Result<Option<User>, BolsaError> {
        let conn = self.conn()?;
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause}");
        conn.query_row(&query, [value], user_from_row)
            .optional()
            .map_err(query_err)
    }
}

impl MarketPort for SqliteAdapter {
    fn list_instruments(&self) -> Result<Vec<Instrument>, BolsaError> {
        let conn = self.conn()?;
        let query = format!("SELECT {INSTRUMENT_COLUMNS} FROM instruments ORDER BY symbol");
        let mut stmt = conn.prepare(&query).map_err(query_err)?;
        let rows = stmt.query_map([], instrument_from_row).map_err(query_err)?;

        let mut instruments = Vec::new();
        for row in rows {
            instruments.push(row.map_err(query_err)?);
        }
        Ok(instruments)
    }

    fn find_instrument(&self, symbol: &str) -> Result<Option<Instrument>, BolsaError> {
        let conn = self.conn()?;
        let query = format!("SELECT {INSTRUMENT_COLUMNS} FROM instruments WHERE symbol = ?1");
        conn.query_row(&query, params![symbol], instrument_from_row)
            .optional()
            .map_err(query_err)
    }

    fn instrument_count(&self) -> Result<usize, BolsaError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM instruments", [], |row| row.get(0))
            .map_err(query_err)?;
        Ok(count as usize)
    }

    fn insert_instruments(&self, rows: &[NewInstrument]) -> Result<(), BolsaError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for inst in rows {
            tx.execute(
                "INSERT INTO instruments (symbol, name, current_price, previous_close, market, currency)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    inst.symbol,
                    inst.name,
                    inst.current_price,
                    inst.previous_close,
                    inst.market,
                    inst.currency
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    fn update_prices(&self, prices: &[(i64, f64)]) -> Result<(), BolsaError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for (id, price) in prices {
            tx.execute(
                "UPDATE instruments SET current_price = ?1 WHERE id = ?2",
                params![price, id],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }
}

impl LedgerPort for SqliteAdapter {
    fn create_user(&self, user: &NewUser) -> Result<User, BolsaError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (username, email, password_hash, cash_balance) VALUES (?1, ?2, ?3, ?4)",
            params![user.username, user.email, user.password_hash, user.cash_balance],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                BolsaError::Registration {
                    reason: "username or email is already registered".to_string(),
                }
            } else {
                query_err(e)
            }
        })?;

        Ok(User {
            id: conn.last_insert_rowid(),
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            cash_balance: user.cash_balance,
        })
    }

    fn find_user(&self, id: i64) -> Result<Option<User>, BolsaError> {
        self.find_user_where("id = ?1", &id)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, BolsaError> {
        self.find_user_where("email = ?1", &email)
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, BolsaError> {
        self.find_user_where("username = ?1", &username)
    }

    fn holdings(&self, user_id: i64) -> Result<Vec<Holding>, BolsaError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, instrument_id, quantity, cost_basis
                 FROM holdings WHERE user_id = ?1 ORDER BY instrument_id",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![user_id], holding_from_row)
            .map_err(query_err)?;

        let mut holdings = Vec::new();
        for row in rows {
            holdings.push(row.map_err(query_err)?);
        }
        Ok(holdings)
    }

    fn holding(&self, user_id: i64, instrument_id: i64) -> Result<Option<Holding>, BolsaError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT user_id, instrument_id, quantity, cost_basis
             FROM holdings WHERE user_id = ?1 AND instrument_id = ?2",
            params![user_id, instrument_id],
            holding_from_row,
        )
        .optional()
        .map_err(query_err)
    }

    fn commit_settlement(&self, settlement: &Settlement) -> Result<i64, BolsaError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        let updated = tx
            .execute(
                "UPDATE users SET cash_balance = ?1 WHERE id = ?2 AND cash_balance = ?3",
                params![settlement.new_cash, settlement.user_id, settlement.expected_cash],
            )
            .map_err(query_err)?;
        if updated != 1 {
            return Err(BolsaError::Conflict);
        }

        let changed = match &settlement.holding {
            HoldingChange::Open(h) => tx.execute(
                "INSERT INTO holdings (user_id, instrument_id, quantity, cost_basis)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user_id, instrument_id) DO NOTHING",
                params![h.user_id, h.instrument_id, h.quantity, h.cost_basis],
            ),
            HoldingChange::Update(h) => tx.execute(
                "UPDATE holdings SET quantity = ?1, cost_basis = ?2
                 WHERE user_id = ?3 AND instrument_id = ?4 AND quantity = ?5",
                params![
                    h.quantity,
                    h.cost_basis,
                    h.user_id,
                    h.instrument_id,
                    settlement.expected_quantity
                ],
            ),
            HoldingChange::Remove {
                user_id,
                instrument_id,
            } => tx.execute(
                "DELETE FROM holdings WHERE user_id = ?1 AND instrument_id = ?2 AND quantity = ?3",
                params![user_id, instrument_id, settlement.expected_quantity],
            ),
        }
        .map_err(query_err)?;
        if changed != 1 {
            return Err(BolsaError::Conflict);
        }

        let trade = &settlement.trade;
        tx.execute(
            "INSERT INTO trades (user_id, instrument_id, side, quantity, price, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                trade.user_id,
                trade.instrument_id,
                trade.side.as_str(),
                trade.quantity,
                trade.price,
                trade.timestamp.to_rfc3339()
            ],
        )
        .map_err(query_err)?;
        let trade_id = tx.last_insert_rowid();

        tx.commit().map_err(query_err)?;
        Ok(trade_id)
    }

    fn recent_trades(&self, user_id: i64, limit: usize) -> Result<Vec<TradeRecord>, BolsaError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT t.id, t.user_id, t.instrument_id, i.symbol, t.side, t.quantity, t.price, t.timestamp
                 FROM trades t JOIN instruments i ON i.id = t.instrument_id
                 WHERE t.user_id = ?1
                 ORDER BY t.id DESC
                 LIMIT ?2",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], trade_from_row)
            .map_err(query_err)?;

        let mut trades = Vec::new();
        for row in rows {
            trades.push(row.map_err(query_err)?);
        }
        Ok(trades)
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use bolsa::domain::desk::TradingDesk;
use bolsa::domain::error::BolsaError;
use bolsa::domain::exchange_rate::ExchangeRateCell;
use bolsa::domain::holding::Holding;
use bolsa::domain::instrument::{Instrument, NewInstrument};
use bolsa::domain::settlement::{HoldingChange, Settlement};
use bolsa::domain::trade::TradeRecord;
use bolsa::domain::user::{NewUser, Registration, User};
use bolsa::ports::ledger_port::LedgerPort;
use bolsa::ports::market_port::MarketPort;
use bolsa::ports::rate_source_port::RateSourcePort;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct StoreState {
    instruments: BTreeMap<i64, Instrument>,
    users: BTreeMap<i64, User>,
    holdings: BTreeMap<(i64, i64), Holding>,
    trades: Vec<TradeRecord>,
    next_id: i64,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory store with the same commit semantics as the SQL adapters.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<StoreState>,
    pub fail_reads: AtomicBool,
    /// Number of upcoming commits to reject with `Conflict`.
    pub forced_conflicts: AtomicUsize,
    pub commits: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instruments(self, rows: &[NewInstrument]) -> Self {
        self.insert_instruments(rows).unwrap();
        self
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        let mut state = self.state.lock().unwrap();
        for inst in state.instruments.values_mut() {
            if inst.symbol == symbol {
                inst.current_price = price;
            }
        }
    }

    pub fn trade_count(&self) -> usize {
        self.state.lock().unwrap().trades.len()
    }

    fn check_reads(&self) -> Result<(), BolsaError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BolsaError::Database {
                reason: "mock store unavailable".into(),
            });
        }
        Ok(())
    }
}

impl MarketPort for MockStore {
    fn list_instruments(&self) -> Result<Vec<Instrument>, BolsaError> {
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        let mut rows: Vec<Instrument> = state.instruments.values().cloned().collect();
        rows.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(rows)
    }

    fn find_instrument(&self, symbol: &str) -> Result<Option<Instrument>, BolsaError> {
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        Ok(state.instruments.values().find(|i| i.symbol == symbol).cloned())
    }

    fn instrument_count(&self) -> Result<usize, BolsaError> {
        Ok(self.state.lock().unwrap().instruments.len())
    }

    fn insert_instruments(&self, rows: &[NewInstrument]) -> Result<(), BolsaError> {
        let mut state = self.state.lock().unwrap();
        for row in rows {
            let id = state.next_id();
            state.instruments.insert(
                id,
                Instrument {
                    id,
                    symbol: row.symbol.clone(),
                    name: row.name.clone(),
                    current_price: row.current_price,
                    previous_close: row.previous_close,
                    market: row.market.clone(),
                    currency: row.currency.clone(),
                },
            );
        }
        Ok(())
    }

    fn update_prices(&self, prices: &[(i64, f64)]) -> Result<(), BolsaError> {
        let mut state = self.state.lock().unwrap();
        for (id, price) in prices {
            if let Some(inst) = state.instruments.get_mut(id) {
                inst.current_price = *price;
            }
        }
        Ok(())
    }
}

impl LedgerPort for MockStore {
    fn create_user(&self, user: &NewUser) -> Result<User, BolsaError> {
        let mut state = self.state.lock().unwrap();
        if state
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(BolsaError::Registration {
                reason: "username or email is already registered".into(),
            });
        }
        let id = state.next_id();
        let created = User {
            id,
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            cash_balance: user.cash_balance,
        };
        state.users.insert(id, created.clone());
        Ok(created)
    }

    fn find_user(&self, id: i64) -> Result<Option<User>, BolsaError> {
        self.check_reads()?;
        Ok(self.state.lock().unwrap().users.get(&id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, BolsaError> {
        let state = self.state.lock().unwrap();
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, BolsaError> {
        let state = self.state.lock().unwrap();
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    fn holdings(&self, user_id: i64) -> Result<Vec<Holding>, BolsaError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .holdings
            .values()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect())
    }

    fn holding(&self, user_id: i64, instrument_id: i64) -> Result<Option<Holding>, BolsaError> {
        let state = self.state.lock().unwrap();
        Ok(state.holdings.get(&(user_id, instrument_id)).cloned())
    }

    fn commit_settlement(&self, settlement: &Settlement) -> Result<i64, BolsaError> {
        if self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BolsaError::Conflict);
        }

        let mut state = self.state.lock().unwrap();

        let cash = state
            .users
            .get(&settlement.user_id)
            .map(|u| u.cash_balance)
            .ok_or(BolsaError::Conflict)?;
        if cash != settlement.expected_cash {
            return Err(BolsaError::Conflict);
        }
        let key = (settlement.trade.user_id, settlement.trade.instrument_id);
        let held = state.holdings.get(&key).map(|h| h.quantity).unwrap_or(0);
        if held != settlement.expected_quantity {
            return Err(BolsaError::Conflict);
        }

        if let Some(user) = state.users.get_mut(&settlement.user_id) {
            user.cash_balance = settlement.new_cash;
        }
        match &settlement.holding {
            HoldingChange::Open(h) | HoldingChange::Update(h) => {
                state.holdings.insert((h.user_id, h.instrument_id), h.clone());
            }
            HoldingChange::Remove {
                user_id,
                instrument_id,
            } => {
                state.holdings.remove(&(*user_id, *instrument_id));
            }
        }

        let id = state.next_id();
        let trade = &settlement.trade;
        let symbol = state
            .instruments
            .get(&trade.instrument_id)
            .map(|i| i.symbol.clone())
            .unwrap_or_default();
        state.trades.push(TradeRecord {
            id,
            user_id: trade.user_id,
            instrument_id: trade.instrument_id,
            symbol,
            side: trade.side,
            quantity: trade.quantity,
            price: trade.price,
            timestamp: trade.timestamp,
        });
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn recent_trades(&self, user_id: i64, limit: usize) -> Result<Vec<TradeRecord>, BolsaError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .trades
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

pub fn instrument(symbol: &str, price: f64, previous_close: f64) -> NewInstrument {
    NewInstrument {
        symbol: symbol.to_string(),
        name: format!("{symbol} Corp."),
        current_price: price,
        previous_close,
        market: "NASDAQ".to_string(),
        currency: "USD".to_string(),
    }
}

pub fn sample_instruments() -> Vec<NewInstrument> {
    vec![
        instrument("AAPL", 150.0, 148.0),
        instrument("TSLA", 200.0, 210.0),
        instrument("AMX", 17.5, 17.5),
    ]
}

pub fn registration(username: &str) -> Registration {
    Registration {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password: "secret123".to_string(),
        confirm_password: "secret123".to_string(),
    }
}

pub fn desk_over(store: Arc<MockStore>, rate: f64, initial_cash: f64) -> TradingDesk {
    TradingDesk::new(store, Arc::new(ExchangeRateCell::new(rate)), initial_cash)
}

/// Always answers with the same rate.
pub struct FixedRateSource(pub f64);

#[async_trait]
impl RateSourcePort for FixedRateSource {
    async fn fetch_rate(&self) -> Result<f64, BolsaError> {
        Ok(self.0)
    }
}

/// Always unavailable.
pub struct FailingRateSource;

#[async_trait]
impl RateSourcePort for FailingRateSource {
    async fn fetch_rate(&self) -> Result<f64, BolsaError> {
        Err(BolsaError::ExternalSourceUnavailable {
            reason: "connection refused".into(),
        })
    }
}

/// Plays back a fixed list of answers, then fails.
pub struct ScriptedRateSource {
    answers: Mutex<VecDeque<Result<f64, String>>>,
}

impl ScriptedRateSource {
    pub fn new(answers: Vec<Result<f64, String>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
        }
    }
}

#[async_trait]
impl RateSourcePort for ScriptedRateSource {
    async fn fetch_rate(&self) -> Result<f64, BolsaError> {
        let next = self.answers.lock().unwrap().pop_front();
        match next {
            Some(Ok(rate)) => Ok(rate),
            Some(Err(reason)) => Err(BolsaError::ExternalSourceUnavailable { reason }),
            None => Err(BolsaError::ExternalSourceUnavailable {
                reason: "script exhausted".into(),
            }),
        }
    }
}

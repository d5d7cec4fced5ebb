//! Web server adapter.
//!
//! Axum router with server-rendered askama pages, session login via
//! axum-login and a small JSON API for the dashboard.

mod auth;
mod error;
mod handlers;
mod templates;

pub use auth::{Backend, Credentials, SessionUser};
pub use error::{WebError, status_from_error};
pub use handlers::LOGIN_FAILED;
pub use templates::Flash;

use axum::{
    Router,
    routing::{get, post},
};
use axum_login::{AuthManagerLayerBuilder, login_required};
use std::sync::Arc;
use time::Duration;
use tower_http::services::ServeDir;
use tower_sessions::cookie::Key;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, SessionStore};

use crate::domain::desk::TradingDesk;
use crate::domain::error::BolsaError;
use crate::domain::settings::TradingSettings;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_SESSION_LIFETIME: i64 = 86_400;

pub struct AppState {
    pub desk: Arc<TradingDesk>,
    pub trading: TradingSettings,
    pub config: Arc<dyn ConfigPort + Send + Sync>,
}

fn auth_invalid(key: &str, reason: impl Into<String>) -> BolsaError {
    BolsaError::ConfigInvalid {
        section: "auth".into(),
        key: key.into(),
        reason: reason.into(),
    }
}

/// Cookie signing key from `[auth] session_secret` (128 hex characters).
/// Without one, a random key is used and sessions end with the process.
pub fn session_key(config: &dyn ConfigPort) -> Result<Key, BolsaError> {
    let secret = config.get_string_or("auth", "session_secret", "");
    if secret.is_empty() {
        tracing::warn!("no [auth] session_secret configured, using a random signing key");
        return Ok(Key::generate());
    }
    let bytes = hex::decode(&secret).map_err(|e| auth_invalid("session_secret", e.to_string()))?;
    if bytes.len() < 64 {
        return Err(auth_invalid(
            "session_secret",
            "session_secret must be 128 hex characters",
        ));
    }
    Ok(Key::from(bytes.as_slice()))
}

pub async fn build_router(state: AppState) -> Result<Router, BolsaError> {
    let key = session_key(&*state.config)?;
    let lifetime = state
        .config
        .get_int("auth", "session_lifetime", DEFAULT_SESSION_LIFETIME);
    if lifetime <= 0 {
        return Err(auth_invalid(
            "session_lifetime",
            "session_lifetime must be positive",
        ));
    }
    let expiry = Expiry::OnInactivity(Duration::seconds(lifetime));
    let static_dir = state.config.get_string_or("web", "static_dir", "static");

    #[cfg(feature = "web-sqlite")]
    {
        let session_db = state.config.get_string_or("auth", "session_db", "");
        if !session_db.is_empty() {
            let store = sqlite_session_store(&session_db).await?;
            return Ok(assemble(state, store, key, expiry, &static_dir));
        }
    }

    Ok(assemble(state, MemoryStore::default(), key, expiry, &static_dir))
}

#[cfg(feature = "web-sqlite")]
async fn sqlite_session_store(
    path: &str,
) -> Result<tower_sessions_rusqlite_store::RusqliteStore, BolsaError> {
    fn db_err(e: impl std::fmt::Display) -> BolsaError {
        BolsaError::Database {
            reason: e.to_string(),
        }
    }
    let conn = if path == ":memory:" {
        tokio_rusqlite::Connection::open_in_memory().await
    } else {
        tokio_rusqlite::Connection::open(path).await
    }
    .map_err(db_err)?;

    let store = tower_sessions_rusqlite_store::RusqliteStore::new(conn);
    store.migrate().await.map_err(db_err)?;
    Ok(store)
}

fn assemble<S>(state: AppState, store: S, key: Key, expiry: Expiry, static_dir: &str) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = SessionManagerLayer::new(store)
        .with_secure(false)
        .with_expiry(expiry)
        .with_signed(key);
    let backend = Backend::new(Arc::clone(&state.desk));
    let auth_layer = AuthManagerLayerBuilder::new(backend, session_layer).build();

    let protected = Router::new()
        .route("/dashboard", get(handlers::dashboard))
        .route("/buy", post(handlers::buy))
        .route("/sell", post(handlers::sell))
        .route("/api/exchange-rate", get(handlers::api_exchange_rate))
        .route("/api/instruments", get(handlers::api_instruments))
        .route("/api/portfolio", get(handlers::api_portfolio))
        .route_layer(login_required!(Backend, login_url = "/login"));

    Router::new()
        .merge(protected)
        .route("/", get(handlers::index))
        .route("/home", get(handlers::home))
        .route("/login", get(handlers::login_form).post(handlers::login))
        .route("/register", get(handlers::register_form).post(handlers::register))
        .route("/registro", get(handlers::registro))
        .route("/logout", get(handlers::logout).post(handlers::logout))
        .nest_service("/static", ServeDir::new(static_dir))
        .fallback(handlers::not_found)
        .layer(auth_layer)
        .with_state(Arc::new(state))
}

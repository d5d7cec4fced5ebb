//! HTTP request handlers for web adapter.

use askama::Template;
use axum::{
    Form, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use crate::domain::desk::TradeReceipt;
use crate::domain::error::BolsaError;
use crate::domain::instrument::Instrument;
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::trade::Side;
use crate::domain::user::Registration;

use super::auth::{Backend, Credentials};
use super::templates::{
    DashboardTemplate, Flash, IndexTemplate, LoginTemplate, RegisterTemplate,
};
use super::{AppState, WebError};

pub type AuthSession = axum_login::AuthSession<Backend>;

const FLASH_KEY: &str = "flash";
const RECENT_TRADES: usize = 20;
pub const LOGIN_FAILED: &str = "Invalid email or password";

fn auth_err(err: axum_login::Error<Backend>) -> WebError {
    match err {
        axum_login::Error::Session(e) => e.into(),
        axum_login::Error::Backend(e) => e.into(),
    }
}

async fn set_flash(session: &Session, flash: Flash) -> Result<(), WebError> {
    session.insert(FLASH_KEY, flash).await?;
    Ok(())
}

async fn take_flash(session: &Session) -> Result<Option<Flash>, WebError> {
    Ok(session.remove::<Flash>(FLASH_KEY).await?)
}

/// Only same-site absolute paths are followed after login.
fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
}

fn render<T: Template>(template: &T) -> Result<Response, WebError> {
    Ok(Html(template.render()?).into_response())
}

pub async fn index(
    auth_session: AuthSession,
    session: Session,
    State(state): State<Arc<AppState>>,
) -> Result<Response, WebError> {
    if auth_session.user.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    let instruments = state.desk.list_instruments()?;
    render(&IndexTemplate {
        instruments: &instruments,
        starting_cash: state.trading.initial_cash,
        flash: take_flash(&session).await?,
    })
}

pub async fn home() -> Redirect {
    Redirect::to("/")
}

pub async fn registro() -> Redirect {
    Redirect::to("/register")
}

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

pub async fn login_form(
    auth_session: AuthSession,
    session: Session,
    Query(query): Query<NextQuery>,
) -> Result<Response, WebError> {
    if auth_session.user.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    render(&LoginTemplate {
        error: None,
        email: "",
        next: safe_next(query.next.as_deref()).unwrap_or(""),
        flash: take_flash(&session).await?,
    })
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub next: String,
}

pub async fn login(
    mut auth_session: AuthSession,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, WebError> {
    let creds = Credentials {
        email: form.email.clone(),
        password: form.password,
    };

    let user = match auth_session.authenticate(creds).await.map_err(auth_err)? {
        Some(user) => user,
        None => {
            tracing::info!(email = %form.email, "login rejected");
            return render(&LoginTemplate {
                error: Some(LOGIN_FAILED),
                email: &form.email,
                next: safe_next(Some(form.next.as_str())).unwrap_or(""),
                flash: None,
            });
        }
    };

    auth_session.login(&user).await.map_err(auth_err)?;
    tracing::info!(user_id = user.id, "user logged in");
    set_flash(&session, Flash::success("Logged in successfully")).await?;

    let target = safe_next(Some(form.next.as_str())).unwrap_or("/dashboard");
    Ok(Redirect::to(target).into_response())
}

pub async fn register_form(
    auth_session: AuthSession,
    session: Session,
) -> Result<Response, WebError> {
    if auth_session.user.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    render(&RegisterTemplate {
        error: None,
        username: "",
        email: "",
        flash: take_flash(&session).await?,
    })
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

pub async fn register(
    session: Session,
    State(state): State<Arc<AppState>>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, WebError> {
    let registration = Registration {
        username: form.username.clone(),
        email: form.email.clone(),
        password: form.password,
        confirm_password: form.confirm_password,
    };

    let desk = Arc::clone(&state.desk);
    let outcome = tokio::task::spawn_blocking(move || desk.register(registration))
        .await
        .map_err(|e| WebError::internal(e.to_string()))?;

    match outcome {
        Ok(_) => {
            set_flash(&session, Flash::success("Registration complete, please log in")).await?;
            Ok(Redirect::to("/login").into_response())
        }
        Err(BolsaError::Registration { reason }) => {
            tracing::info!(username = %form.username, %reason, "registration rejected");
            render(&RegisterTemplate {
                error: Some(reason.as_str()),
                username: &form.username,
                email: &form.email,
                flash: None,
            })
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn logout(
    mut auth_session: AuthSession,
    session: Session,
) -> Result<Response, WebError> {
    if let Some(user) = auth_session.logout().await.map_err(auth_err)? {
        tracing::info!(user_id = user.id, "user logged out");
        set_flash(&session, Flash::success("You have been logged out")).await?;
    }
    Ok(Redirect::to("/").into_response())
}

pub async fn dashboard(
    auth_session: AuthSession,
    session: Session,
    State(state): State<Arc<AppState>>,
) -> Result<Response, WebError> {
    let Some(user) = auth_session.user else {
        return Ok(Redirect::to("/login").into_response());
    };

    let snapshot = state.desk.portfolio_snapshot(user.id)?;
    let instruments = state.desk.list_instruments()?;
    let trades = state.desk.recent_trades(user.id, RECENT_TRADES)?;

    render(&DashboardTemplate {
        username: &user.username,
        snapshot: &snapshot,
        instruments: &instruments,
        trades: &trades,
        rate: state.desk.exchange_rate(),
        base_currency: &state.trading.base_currency,
        home_currency: &state.trading.home_currency,
        flash: take_flash(&session).await?,
    })
}

#[derive(Debug, Deserialize)]
pub struct TradeForm {
    pub symbol: String,
    pub quantity: String,
}

fn receipt_message(receipt: &TradeReceipt, currency: &str) -> String {
    let verb = match receipt.side {
        Side::Buy => "Bought",
        Side::Sell => "Sold",
    };
    format!(
        "{verb} {} shares of {} at {:.2} ({:.2} {currency})",
        receipt.quantity, receipt.symbol, receipt.price, receipt.amount
    )
}

async fn place_order(
    auth_session: AuthSession,
    session: Session,
    state: Arc<AppState>,
    form: TradeForm,
    side: Side,
) -> Result<Response, WebError> {
    let Some(user) = auth_session.user else {
        return Ok(Redirect::to("/login").into_response());
    };

    let flash = match form.quantity.trim().parse::<i64>() {
        Err(_) => Flash::error("Quantity must be a positive whole number"),
        Ok(quantity) => {
            let result = match side {
                Side::Buy => state.desk.buy(user.id, &form.symbol, quantity),
                Side::Sell => state.desk.sell(user.id, &form.symbol, quantity),
            };
            match result {
                Ok(receipt) => {
                    Flash::success(receipt_message(&receipt, &state.trading.home_currency))
                }
                Err(e) if e.is_rejection() => {
                    tracing::info!(user_id = user.id, %side, error = %e, "order rejected");
                    Flash::error(e.to_string())
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    set_flash(&session, flash).await?;
    Ok(Redirect::to("/dashboard").into_response())
}

pub async fn buy(
    auth_session: AuthSession,
    session: Session,
    State(state): State<Arc<AppState>>,
    Form(form): Form<TradeForm>,
) -> Result<Response, WebError> {
    place_order(auth_session, session, state, form, Side::Buy).await
}

pub async fn sell(
    auth_session: AuthSession,
    session: Session,
    State(state): State<Arc<AppState>>,
    Form(form): Form<TradeForm>,
) -> Result<Response, WebError> {
    place_order(auth_session, session, state, form, Side::Sell).await
}

pub async fn api_exchange_rate(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let rate = state.desk.exchange_rate();
    Json(serde_json::json!({
        "success": true,
        "rate": rate.rate,
        "origin": rate.origin,
        "updated_at": rate.updated_at.to_rfc3339(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn api_instruments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Instrument>>, WebError> {
    Ok(Json(state.desk.list_instruments()?))
}

pub async fn api_portfolio(
    auth_session: AuthSession,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PortfolioSnapshot>, WebError> {
    let user = auth_session
        .user
        .ok_or_else(|| WebError::new(StatusCode::UNAUTHORIZED, "Login required"))?;
    Ok(Json(state.desk.portfolio_snapshot(user.id)?))
}

pub async fn not_found() -> WebError {
    WebError::not_found("Page not found")
}

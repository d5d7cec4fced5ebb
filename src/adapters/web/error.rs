//! HTTP error responses for web adapter.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::domain::error::BolsaError;

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

pub fn status_from_error(err: &BolsaError) -> StatusCode {
    match err {
        BolsaError::NotFound { .. } => StatusCode::NOT_FOUND,
        BolsaError::InsufficientFunds { .. }
        | BolsaError::InsufficientShares { .. }
        | BolsaError::InvalidQuantity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        BolsaError::Registration { .. } => StatusCode::BAD_REQUEST,
        BolsaError::Conflict => StatusCode::CONFLICT,
        BolsaError::ExternalSourceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        BolsaError::ConfigParse { .. }
        | BolsaError::ConfigMissing { .. }
        | BolsaError::ConfigInvalid { .. }
        | BolsaError::Database { .. }
        | BolsaError::DatabaseQuery { .. }
        | BolsaError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<BolsaError> for WebError {
    fn from(err: BolsaError) -> Self {
        let status = status_from_error(&err);
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
            // Storage details stay in the log.
            return Self::new(status, "Something went wrong, please try again later.");
        }
        Self::new(status, err.to_string())
    }
}

impl From<askama::Error> for WebError {
    fn from(err: askama::Error) -> Self {
        tracing::error!(error = %err, "template rendering failed");
        Self::internal("Could not render page")
    }
}

impl From<tower_sessions::session::Error> for WebError {
    fn from(err: tower_sessions::session::Error) -> Self {
        tracing::error!(error = %err, "session store failed");
        Self::internal("Session unavailable")
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let template = super::templates::ErrorTemplate {
            message: &self.message,
            status: self.status.as_u16(),
        };
        match template.render() {
            Ok(html) => (self.status, Html(html)).into_response(),
            Err(_) => (self.status, self.message).into_response(),
        }
    }
}

//! Domain error types.

/// Top-level error type for bolsa.
#[derive(Debug, thiserror::Error)]
pub enum BolsaError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("insufficient funds: need {required:.2}, have {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("insufficient shares of {symbol}: requested {requested}, held {held}")]
    InsufficientShares {
        symbol: String,
        requested: i64,
        held: i64,
    },

    #[error("invalid quantity {quantity}: must be a positive integer")]
    InvalidQuantity { quantity: i64 },

    #[error("account changed while settling, retry the order")]
    Conflict,

    #[error("registration rejected: {reason}")]
    Registration { reason: String },

    #[error("exchange rate source unavailable: {reason}")]
    ExternalSourceUnavailable { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BolsaError {
    pub fn not_found(what: impl Into<String>) -> Self {
        BolsaError::NotFound { what: what.into() }
    }

    /// True for rejections a user caused and can fix by changing the order.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            BolsaError::NotFound { .. }
                | BolsaError::InsufficientFunds { .. }
                | BolsaError::InsufficientShares { .. }
                | BolsaError::InvalidQuantity { .. }
                | BolsaError::Conflict
                | BolsaError::Registration { .. }
        )
    }
}

impl From<&BolsaError> for std::process::ExitCode {
    fn from(err: &BolsaError) -> Self {
        let code: u8 = match err {
            BolsaError::Io(_) => 1,
            BolsaError::ConfigParse { .. }
            | BolsaError::ConfigMissing { .. }
            | BolsaError::ConfigInvalid { .. } => 2,
            BolsaError::Database { .. } | BolsaError::DatabaseQuery { .. } => 3,
            BolsaError::NotFound { .. }
            | BolsaError::InsufficientFunds { .. }
            | BolsaError::InsufficientShares { .. }
            | BolsaError::InvalidQuantity { .. }
            | BolsaError::Conflict
            | BolsaError::Registration { .. } => 4,
            BolsaError::ExternalSourceUnavailable { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

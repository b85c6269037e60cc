//! Domain error types.

/// Top-level error type for papertrader.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("insufficient funds to buy {ticker}: need {required:.2}, have {available:.2}")]
    InsufficientFunds {
        ticker: String,
        required: f64,
        available: f64,
    },

    #[error("insufficient shares of {ticker}: requested {requested}, held {held}")]
    InsufficientShares {
        ticker: String,
        requested: i64,
        held: i64,
    },

    #[error("no data for {ticker}: {reason}")]
    NoData { ticker: String, reason: String },

    #[error("cached backtest is stale (computed under config {cached}, live config is {live})")]
    StaleConfig { cached: String, live: String },

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

    #[error("malformed market data: {reason}")]
    Data { reason: String },

    #[error("failed to persist {path}: {reason}")]
    Persistence { path: String, reason: String },

    #[error("a {job} run is already in progress")]
    Busy { job: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraderError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        TraderError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn no_data(ticker: impl Into<String>, reason: impl Into<String>) -> Self {
        TraderError::NoData {
            ticker: ticker.into(),
            reason: reason.into(),
        }
    }

    /// True for rejections a trader can act on (bad quantity, not enough cash or shares).
    pub fn is_trade_rejection(&self) -> bool {
        matches!(
            self,
            TraderError::InvalidInput { .. }
                | TraderError::InsufficientFunds { .. }
                | TraderError::InsufficientShares { .. }
        )
    }
}

impl From<&TraderError> for std::process::ExitCode {
    fn from(err: &TraderError) -> Self {
        let code: u8 = match err {
            TraderError::Io(_) | TraderError::Persistence { .. } => 1,
            TraderError::ConfigParse { .. }
            | TraderError::ConfigMissing { .. }
            | TraderError::ConfigInvalid { .. } => 2,
            TraderError::NoData { .. } | TraderError::Data { .. } => 3,
            TraderError::InvalidInput { .. }
            | TraderError::InsufficientFunds { .. }
            | TraderError::InsufficientShares { .. } => 4,
            TraderError::Busy { .. } => 5,
            TraderError::StaleConfig { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

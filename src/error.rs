use thiserror::Error;

/// Fatal configuration problems. Surfaced via `anyhow::Context` at startup;
/// never seen by the evaluator or scanner loop.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config field: {0}")]
    MissingField(String),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Upstream ingestion failures. Handled inside feed tasks with bounded
/// retry/backoff; never propagated to the evaluator.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("could not connect to feed: {0}")]
    Connect(String),

    #[error("protocol violation from feed: {0}")]
    Protocol(String),

    #[error("feed connection closed")]
    Closed,
}

/// Why a path could not be priced against current data. These are ordinary
/// return-path outcomes, not exceptions: a rejection is an expected, routine
/// result of scanning a live book, not a bug. Hence `Display` only, no
/// `std::error::Error` impl and no place in a `Result::Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationRejection {
    StartingNotionalBelowMinimum,
    MissingSnapshot { market_code: String },
    InvalidSnapshot { market_code: String },
    InputBelowMinimum { market_code: String },
    InsufficientAskDepth { market_code: String },
    InsufficientBidDepth { market_code: String },
    NotionalBelowMinimum { market_code: String },
    InvalidVwap { market_code: String },
    NonPositiveOutput { market_code: String },
    BelowProfitThreshold,
}

impl std::fmt::Display for EvaluationRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartingNotionalBelowMinimum => {
                write!(f, "starting notional below first-leg minimum")
            }
            Self::MissingSnapshot { market_code } => {
                write!(f, "no snapshot published for {market_code}")
            }
            Self::InvalidSnapshot { market_code } => {
                write!(f, "snapshot for {market_code} has an empty or crossed book")
            }
            Self::InputBelowMinimum { market_code } => {
                write!(f, "input amount below leg minimum for {market_code}")
            }
            Self::InsufficientAskDepth { market_code } => {
                write!(f, "insufficient ask depth on {market_code}")
            }
            Self::InsufficientBidDepth { market_code } => {
                write!(f, "insufficient bid depth on {market_code}")
            }
            Self::NotionalBelowMinimum { market_code } => {
                write!(f, "fill notional below minimum on {market_code}")
            }
            Self::InvalidVwap { market_code } => {
                write!(f, "computed a non-positive vwap on {market_code}")
            }
            Self::NonPositiveOutput { market_code } => {
                write!(f, "leg on {market_code} produced non-positive output")
            }
            Self::BelowProfitThreshold => write!(f, "final delta did not clear the profit floor"),
        }
    }
}

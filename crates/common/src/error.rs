use thiserror::Error;

/// Coarse classification used by the trading loop to decide how loudly to
/// report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failures, rate limits, exchange-side 5xx. Likely to clear up.
    Transient,
    /// Malformed payloads or requests the exchange refused.
    Data,
    /// Account file or log file could not be read or written.
    Persistence,
    /// Bad configuration or rejected credentials. Retrying will not help.
    Fatal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Data => write!(f, "data"),
            ErrorKind::Persistence => write!(f, "persistence"),
            ErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Exchange API error (HTTP {status}): {message}")]
    Exchange { status: u16, message: String },

    #[error("Rate limited by exchange (HTTP {status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Malformed exchange response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Account store error: {0}")]
    Account(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Http(_) | Error::RateLimited { .. } => ErrorKind::Transient,
            Error::Exchange { status, .. } if *status >= 500 => ErrorKind::Transient,
            Error::Exchange { .. } | Error::Json(_) | Error::Decode(_) => ErrorKind::Data,
            Error::Io(_) | Error::Account(_) => ErrorKind::Persistence,
            Error::Auth(_) | Error::Config(_) => ErrorKind::Fatal,
            Error::Other(_) => ErrorKind::Transient,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

use thiserror::Error;

/// Bad or missing source definition. Fatal: raised before any fetch happens.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("source #{index} has an empty name")]
    EmptyName { index: usize },

    #[error("duplicate source name: {name}")]
    DuplicateName { name: String },

    #[error("source {name}: unknown kind '{kind}' (expected feed or html)")]
    UnknownKind { name: String, kind: String },

    #[error("source {name}: unknown category '{category}'")]
    UnknownCategory { name: String, category: String },

    #[error("source {name}: invalid url '{url}': {reason}")]
    InvalidUrl {
        name: String,
        url: String,
        reason: String,
    },

    #[error("source {name}: html sources require selectors")]
    MissingSelectors { name: String },

    #[error("source {name}: selectors are only allowed on html sources")]
    UnexpectedSelectors { name: String },

    #[error("source {name}: invalid css selector '{selector}'")]
    InvalidSelector { name: String, selector: String },

    #[error("cannot build http client: {0}")]
    HttpClient(String),
}

/// Why a single source could not be fetched.
#[derive(Debug, Error)]
pub enum FetchCause {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("invalid css selector '{0}'")]
    InvalidSelector(String),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Per-source network or parse failure. Recovered by the orchestrator.
#[derive(Debug, Error)]
#[error("failed to fetch {url}: {cause}")]
pub struct FetchError {
    pub url: String,
    #[source]
    pub cause: FetchCause,
}

impl FetchError {
    pub fn new(url: impl Into<String>, cause: impl Into<FetchCause>) -> Self {
        Self {
            url: url.into(),
            cause: cause.into(),
        }
    }
}

/// Storage unavailable or corrupted. Fatal: dedup correctness cannot be guaranteed.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("ledger initialization failed: {0}")]
    Init(String),
}

/// Reported by delivery collaborators. Never touches the ledger.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to write digest: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, WatchError>;

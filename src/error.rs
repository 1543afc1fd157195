use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Config(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

// ---------------------------------------------------------------------------
// Feed transport
// ---------------------------------------------------------------------------

/// Which upstream call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOperation {
    Discover,
    Detail,
}

impl std::fmt::Display for FeedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedOperation::Discover => write!(f, "discover"),
            FeedOperation::Detail => write!(f, "detail"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportErrorKind {
    #[error("request timed out")]
    Timeout,

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("malformed response body: {0}")]
    Body(String),

    #[error("request failed: {0}")]
    Request(String),
}

/// Upstream call failure. Carries the failed operation and the game id, if any.
#[derive(Debug, Error)]
#[error("{} failed{}: {}", .operation, for_game(.game_id), .kind)]
pub struct TransportError {
    pub operation: FeedOperation,
    pub game_id: Option<String>,
    #[source]
    pub kind: TransportErrorKind,
}

fn for_game(game_id: &Option<String>) -> String {
    game_id
        .as_deref()
        .map(|id| format!(" for game {id}"))
        .unwrap_or_default()
}

impl TransportError {
    pub fn new(operation: FeedOperation, game_id: Option<&str>, kind: TransportErrorKind) -> Self {
        Self {
            operation,
            game_id: game_id.map(str::to_string),
            kind,
        }
    }

    /// Classify a reqwest failure. Body decode errors are reported as `Body`.
    pub fn from_reqwest(operation: FeedOperation, game_id: Option<&str>, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if let Some(status) = err.status() {
            TransportErrorKind::Status(status.as_u16())
        } else if err.is_decode() {
            TransportErrorKind::Body(err.to_string())
        } else {
            TransportErrorKind::Request(err.to_string())
        };
        Self::new(operation, game_id, kind)
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Upstream document is missing something required or has an irreconcilable shape.
/// Missing optional data (stats, plays, probabilities) never produces this.
#[derive(Debug, Error, PartialEq)]
pub enum MappingError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("no competitor with role `{0}`")]
    MissingRole(&'static str),

    #[error("invalid score {value:?} for {role} side")]
    InvalidScore { role: &'static str, value: String },

    #[error("invalid value {value:?} for `{field}`")]
    InvalidField { field: &'static str, value: String },
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("payload encoding error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Any failure while processing one game inside a cycle.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ItemError {
    /// Short tag for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ItemError::Transport(_) => "transport",
            ItemError::Mapping(_) => "mapping",
            ItemError::Store(_) => "store",
        }
    }
}

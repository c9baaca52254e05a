use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rusqlite::ErrorCode;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors raised by a graph store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing database could not serve the request at all.
    #[error("graph store unavailable: {0}")]
    Unavailable(#[source] rusqlite::Error),

    /// A single record was refused (constraint violation, bad value).
    #[error("record rejected: {0}")]
    Rejected(String),

    #[error("graph store session lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Fatal errors abort a whole bulk load; rejections only fail one row.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StoreError::Rejected(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::Rejected(err.to_string())
            }
            rusqlite::Error::InvalidParameterName(_)
            | rusqlite::Error::ToSqlConversionFailure(_) => StoreError::Rejected(err.to_string()),
            _ => StoreError::Unavailable(err),
        }
    }
}

/// Errors raised by the chain-data provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Etherscan API key not configured")]
    NotConfigured,

    #[error("Etherscan API error: {0}")]
    Upstream(String),

    #[error("Invalid response from Etherscan: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Upstream(err.to_string())
        }
    }
}

/// Errors that abort a bulk load. Per-row problems never surface here.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("CSV stream failed at row {row}: {source}")]
    Stream {
        row: usize,
        #[source]
        source: csv::Error,
    },

    #[error("fatal store error at row {row}: {source}")]
    Store {
        row: usize,
        #[source]
        source: StoreError,
    },

    #[error("post-load count failed: {0}")]
    Count(#[source] StoreError),
}

/// Errors returned by HTTP handlers, rendered as `{status: "error", error}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid address format")]
    InvalidAddress,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidAddress | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Provider(ProviderError::NotConfigured) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
            ApiError::Store(_) | ApiError::Load(_) | ApiError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("API error: {:?}", self);
        }
        (status, Json(json!({ "status": "error", "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn constraint_violation_is_a_row_rejection() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT NOT NULL CHECK (v IN ('a')));")
            .unwrap();
        let err = conn.execute("INSERT INTO t (v) VALUES ('b')", []).unwrap_err();

        let store_err = StoreError::from(err);
        assert!(matches!(store_err, StoreError::Rejected(_)));
        assert!(!store_err.is_fatal());
    }

    #[test]
    fn missing_table_is_fatal() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn.execute("INSERT INTO nowhere (v) VALUES (1)", []).unwrap_err();

        assert!(StoreError::from(err).is_fatal());
    }

    #[test]
    fn api_errors_map_to_status_codes() {
        assert_eq!(ApiError::InvalidAddress.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(ProviderError::NotConfigured).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(ProviderError::Upstream("HTTP 503".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(StoreError::Poisoned).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

// src/utils/errors.rs

use std::{error::Error, fmt};
use reqwest;
use serde_json;

/// Errors coming from exchange calls (HTTP, JSON, exchange codes).
#[derive(Debug)]
pub enum ApiError {
    Http(reqwest::Error),
    Json(serde_json::Error),
    /// Binance answered with `{"code": <negative>, "msg": ...}`
    Exchange { code: i64, msg: String },
    Other(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Http(e)                => write!(f, "HTTP error: {}", e),
            ApiError::Json(e)                => write!(f, "JSON error: {}", e),
            ApiError::Exchange { code, msg } => write!(f, "Exchange error {}: {}", code, msg),
            ApiError::Other(msg)             => write!(f, "{}", msg),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApiError::Http(e)          => Some(e),
            ApiError::Json(e)          => Some(e),
            ApiError::Exchange { .. }  => None,
            ApiError::Other(_)         => None,
        }
    }
}

// Conversions from underlying errors into ApiError
impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self { ApiError::Http(err) }
}
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self { ApiError::Json(err) }
}

/// Errors raised by the candle/trade stores and the cache mirror.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("db: {0}")]
    Db(#[from] sqlx::Error),
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors at the pipeline-step level.
#[derive(thiserror::Error, Debug)]
pub enum StepError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("api: {0}")]
    Api(#[from] ApiError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

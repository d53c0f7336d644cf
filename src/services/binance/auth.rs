// src/services/binance/auth.rs

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::utils::errors::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Millisecond timestamp
pub fn current_timestamp() -> String {
    Utc::now().timestamp_millis().to_string()
}

/// Form-encoded `k1=v1&k2=v2` in insertion order; the signature covers
/// exactly this text.
pub fn query_string(params: &[(&str, String)]) -> Result<String, ApiError> {
    serde_urlencoded::to_string(params).map_err(|e| ApiError::Other(format!("query encoding: {e}")))
}

/// Plain decimal for request parameters: at most 8 fractional digits,
/// trailing zeros dropped, never exponent notation.
pub fn decimal_param(value: f64) -> String {
    let text = format!("{value:.8}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "-0" => "0".to_string(),
        t => t.to_string(),
    }
}

/// Sign REST requests (HMAC SHA-256, hex encoded)
pub fn sign_query(secret: &str, query: &str) -> Result<String, ApiError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::Other(format!("hmac key: {e}")))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

//! Dashboard session tokens (JWT, HS256).

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Minimal subset we care about for JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Option<String>,
    pub exp: usize,
}

/// `None` for a missing, malformed, expired or foreign token.
pub fn verify_token(secret: &str, token: Option<&str>) -> Option<Claims> {
    let token = token.map(str::trim).filter(|t| !t.is_empty())?;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| log::debug!("rejected dashboard token: {e}"))
    .ok()
}

pub fn issue_token(
    secret: &str,
    subject: &str,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: Some(subject.to_string()),
        exp: (Utc::now() + ttl).timestamp().max(0) as usize,
    };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

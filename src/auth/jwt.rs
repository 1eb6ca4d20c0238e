use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Mint a session token for `username`, valid for `session_days`.
pub fn encode_session(secret: &str, username: &str, session_days: u32) -> Result<String> {
    let now = Utc::now();
    let exp = now + Duration::days(session_days as i64);

    let claims = Claims {
        sub: username.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Session(e.to_string()))
}

/// Decode and validate a session token, including expiry.
pub fn decode_session(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| Error::Session(e.to_string()))?;

    Ok(data.claims)
}

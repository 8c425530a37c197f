//! Password hashing, session tokens and one-time secrets.

use anyhow::Context;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppResult;

/// JWT claims carried by the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Hashes on the blocking pool; argon2 is deliberately slow.
pub async fn hash_password(password: String) -> AppResult<String> {
    let hash = tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))
    })
    .await
    .context("password hashing task panicked")??;
    Ok(hash)
}

/// Returns false for a wrong password and for a malformed stored hash.
pub async fn verify_password(password: String, stored_hash: String) -> AppResult<bool> {
    let ok = tokio::task::spawn_blocking(move || match PasswordHash::new(&stored_hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            tracing::warn!("stored password hash is malformed: {}", e);
            false
        }
    })
    .await
    .context("password verification task panicked")?;
    Ok(ok)
}

pub fn issue_token(user_id: &str, secret: &str, ttl: Duration, now: DateTime<Utc>) -> AppResult<String> {
    let expires = now.checked_add_signed(ttl).context("session expiry out of range")?;
    let claims = Claims { sub: user_id.to_string(), iat: now.timestamp(), exp: expires.timestamp() };
    let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .context("failed to sign session token")?;
    Ok(token)
}

/// Verifies signature and expiry against the wall clock.
pub fn decode_token(token: &str, secret: &str) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    Ok(data.claims)
}

/// A five digit verification code.
pub fn generate_otp() -> i64 {
    rand::thread_rng().gen_range(10_000..100_000)
}

/// Returns `(raw, sha256_hex)`. Only the digest is stored; the raw token goes in the mail.
pub fn generate_reset_token() -> (String, String) {
    let bytes: [u8; 20] = rand::thread_rng().gen();
    let raw = hex::encode(bytes);
    let digest = hash_reset_token(&raw);
    (raw, digest)
}

pub fn hash_reset_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

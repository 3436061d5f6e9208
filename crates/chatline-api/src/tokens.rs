//! Access/refresh token issuing and verification.
//!
//! The two token kinds share a claim shape but are signed with different
//! secrets, so neither can stand in for the other.

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use jsonwebtoken::errors::ErrorKind;
use uuid::Uuid;

use chatline_types::api::Claims;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KeyPair {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

pub struct TokenIssuer {
    access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(config: &Config) -> Self {
        Self::with_secrets(
            &config.access_secret,
            config.access_ttl,
            &config.refresh_secret,
            config.refresh_ttl,
        )
    }

    pub fn with_secrets(
        access_secret: &str,
        access_ttl: Duration,
        refresh_secret: &str,
        refresh_ttl: Duration,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 5; // seconds of clock skew

        Self {
            access: KeyPair::new(access_secret, access_ttl),
            refresh: KeyPair::new(refresh_secret, refresh_ttl),
            validation,
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh.ttl
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> anyhow::Result<String> {
        sign(&self.access, user_id)
    }

    pub fn issue_refresh_token(&self, user_id: Uuid) -> anyhow::Result<String> {
        sign(&self.refresh, user_id)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(&self.access, token)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(&self.refresh, token)
    }

    fn verify(&self, keys: &KeyPair, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &keys.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

fn sign(keys: &KeyPair, user_id: Uuid) -> anyhow::Result<String> {
    let now = Utc::now().timestamp();
    let exp = i64::try_from(keys.ttl.as_secs())
        .ok()
        .and_then(|ttl| now.checked_add(ttl))
        .context("token lifetime out of range")?;
    let claims = Claims {
        sub: user_id,
        iat: now,
        exp,
        jti: Uuid::new_v4(),
    };

    let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)?;
    Ok(token)
}

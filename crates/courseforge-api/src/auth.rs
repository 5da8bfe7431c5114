//! Authentication — Argon2id password hashing and JWT issuance.
//!
//! Token validation lives in `courseforge_common::auth` so every crate
//! agrees on the claim format.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use courseforge_common::{auth::Claims, models::user::UserRole};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use uuid::Uuid;

pub use courseforge_common::auth::validate_token;

/// Token pair returned on login/register.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub token_type: String,
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against an Argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn generate_token(
    user_id: Uuid,
    email: &str,
    role: UserRole,
    secret: &str,
    ttl_secs: u64,
    token_type: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        role,
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_secs as i64)).timestamp(),
        token_type: token_type.to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Generate both access and refresh tokens.
pub fn generate_token_pair(
    user_id: Uuid,
    email: &str,
    role: UserRole,
    secret: &str,
    access_ttl: u64,
    refresh_ttl: u64,
) -> Result<TokenPair, jsonwebtoken::errors::Error> {
    Ok(TokenPair {
        access_token: generate_token(user_id, email, role, secret, access_ttl, "access")?,
        refresh_token: generate_token(user_id, email, role, secret, refresh_ttl, "refresh")?,
        expires_in: access_ttl,
        token_type: "Bearer".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-with-enough-entropy-for-hs256";

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery", &hash).unwrap());
        assert!(!verify_password("wrong horse battery", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-hash").is_err());
    }

    #[test]
    fn token_pair_carries_identity_and_type() {
        let user_id = Uuid::now_v7();
        let pair =
            generate_token_pair(user_id, "ada@example.com", UserRole::Creator, SECRET, 900, 3600).unwrap();

        let access = validate_token(&pair.access_token, SECRET).unwrap();
        assert_eq!(access.sub, user_id.to_string());
        assert_eq!(access.email, "ada@example.com");
        assert_eq!(access.role, UserRole::Creator);
        assert_eq!(access.token_type, "access");
        assert_eq!(access.exp - access.iat, 900);

        let refresh = validate_token(&pair.refresh_token, SECRET).unwrap();
        assert_eq!(refresh.token_type, "refresh");
        assert_eq!(pair.expires_in, 900);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let pair = generate_token_pair(Uuid::now_v7(), "a@b.co", UserRole::Student, SECRET, 900, 3600).unwrap();
        assert!(validate_token(&pair.access_token, "some-other-secret").is_err());
    }
}

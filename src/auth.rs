// src/auth.rs
pub use crate::auth_models::{Role, TokenClaims};
use crate::errors::AppError;
use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode};

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!("Argon2 hashing failed: {}", e);
            AppError::PasswordHashingError
        })?
        .to_string();

    Ok(password_hash)
}

/// `Ok(false)` for a wrong password; an unparsable stored hash is a server error.
pub fn verify_password(hashed_password: &str, password: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hashed_password).map_err(|e| {
        tracing::error!("Stored password hash is malformed: {}", e);
        AppError::PasswordHashingError
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn create_jwt(
    user_id: i32,
    email: &str,
    role: Role,
    secret: &str,
    expiration_hours: i64,
) -> Result<String, AppError> {
    let now = Utc::now();
    let expiration_time = now + Duration::hours(expiration_hours);

    let claims = TokenClaims {
        sub: user_id,
        email: email.to_string(),
        role,
        exp: expiration_time.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| AppError::InternalServerError(format!("JWT encoding failed: {}", e)))
}

/// Checks signature and expiry (HS256, default leeway).
pub fn verify_jwt(token: &str, secret: &str) -> Result<TokenData<TokenClaims>, AppError> {
    decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn password_round_trip() {
        let hash = hash_password("tinto-con-panela").unwrap();
        assert!(verify_password(&hash, "tinto-con-panela").unwrap());
        assert!(!verify_password(&hash, "otra-cosa").unwrap());
    }

    #[test]
    fn garbage_hash_is_a_server_error() {
        assert!(matches!(
            verify_password("not-a-phc-string", "x"),
            Err(AppError::PasswordHashingError)
        ));
    }

    #[test]
    fn issued_token_carries_identity() {
        let token = create_jwt(7, "editor@finca.co", Role::Editor, SECRET, 24).unwrap();
        let data = verify_jwt(&token, SECRET).unwrap();
        assert_eq!(data.claims.sub, 7);
        assert_eq!(data.claims.email, "editor@finca.co");
        assert_eq!(data.claims.role, Role::Editor);
        assert!(data.claims.exp > data.claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = create_jwt(1, "a@b.co", Role::Admin, SECRET, 1).unwrap();
        assert!(matches!(
            verify_jwt(&token, "other-secret"),
            Err(AppError::InvalidToken(_))
        ));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        // well past the default 60s leeway
        let token = create_jwt(1, "a@b.co", Role::Admin, SECRET, -2).unwrap();
        assert!(matches!(
            verify_jwt(&token, SECRET),
            Err(AppError::TokenExpired)
        ));
    }
}

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::{User, UserRole};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("invalid or expired token")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("token subject is not a user id")]
    Subject,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: UserRole,
    exp: usize,
}

/// Identity attached to a request by the authentication middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub role: UserRole,
}

impl AuthUser {
    /// Users may act on their own records; admins on anyone's.
    pub fn may_access(&self, user_id: i64) -> bool {
        self.id == user_id || self.role == UserRole::Admin
    }
}

pub fn create_token(user: &User, jwt_secret: &str, ttl_hours: i64) -> Result<String, AuthError> {
    let expiration = (Utc::now() + Duration::hours(ttl_hours)).timestamp() as usize;
    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role,
        exp: expiration,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_bytes()))?;
    Ok(token)
}

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<AuthUser, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    let id = token_data.claims.sub.parse().map_err(|_| AuthError::Subject)?;
    Ok(AuthUser {
        id,
        role: token_data.claims.role,
    })
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::warn!("Stored password hash could not be parsed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_WALLET_BALANCE;

    fn user(id: i64, role: UserRole) -> User {
        User {
            id,
            username: "alice".into(),
            password: String::new(),
            first_name: None,
            last_name: None,
            email: "alice@example.com".into(),
            profile_image: None,
            role,
            is_investor: true,
            is_homebuyer: false,
            wallet_balance: DEFAULT_WALLET_BALANCE,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn token_round_trip() {
        let token = create_token(&user(42, UserRole::Developer), "secret", 1).unwrap();
        let auth = validate_token(&token, "secret").unwrap();
        assert_eq!(auth, AuthUser { id: 42, role: UserRole::Developer });
        assert!(validate_token(&token, "other-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = create_token(&user(1, UserRole::Investor), "secret", -2).unwrap();
        assert!(validate_token(&token, "secret").is_err());
    }

    #[test]
    fn password_hashing() {
        let hash = hash_password("hunter22").unwrap();
        assert_ne!(hash, "hunter22");
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[test]
    fn access_rules() {
        let me = AuthUser { id: 3, role: UserRole::Investor };
        assert!(me.may_access(3));
        assert!(!me.may_access(4));
        assert!(AuthUser { id: 1, role: UserRole::Admin }.may_access(4));
    }
}

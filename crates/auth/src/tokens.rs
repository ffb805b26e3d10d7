//! Access credentials and refresh token values.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use common::UserId;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use store::UserRecord;

use crate::{AuthConfig, AuthError, Result};

/// Raw bytes behind every refresh token.
pub const REFRESH_TOKEN_BYTES: usize = 64;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User email.
    pub sub: String,
    pub uid: i64,
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated actor resolved from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub email: String,
    pub role: String,
}

impl Actor {
    /// True when the actor holds one of `roles`. Role names match exactly.
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.contains(&self.role.as_str())
    }
}

impl From<AccessClaims> for Actor {
    fn from(claims: AccessClaims) -> Self {
        Self {
            user_id: UserId::new(claims.uid),
            email: claims.sub,
            role: claims.role,
        }
    }
}

/// Signs and verifies HS256 access tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(config: AuthConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Issues an access token for the user, valid for `access_ttl` from `now`.
    pub fn issue(&self, user: &UserRecord, now: DateTime<Utc>) -> Result<String> {
        let claims = AccessClaims {
            sub: user.email.clone(),
            uid: user.id.as_i64(),
            role: user.role.clone(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat: now.timestamp(),
            exp: (now + self.config.access_ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Verifies signature, issuer, audience and expiry.
    pub fn verify(&self, token: &str) -> Result<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.config.audience]);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss", "aud"]);

        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidAccessToken(e.to_string()))
    }
}

/// Generates a new opaque refresh token value.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::roles;

    fn user() -> UserRecord {
        UserRecord {
            id: UserId::new(3),
            email: "ana@example.com".to_string(),
            password_hash: String::new(),
            role: roles::ADMIN.to_string(),
            is_deleted: false,
            deleted_at: None,
        }
    }

    #[test]
    fn issued_token_verifies_to_the_same_actor() {
        let issuer = TokenIssuer::new(AuthConfig::new("a-test-secret-that-is-long-enough-000"));
        let token = issuer.issue(&user(), Utc::now()).unwrap();

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, "ana@example.com");
        assert_eq!(claims.iss, "sales-api");

        let actor = Actor::from(claims);
        assert_eq!(actor.user_id, UserId::new(3));
        assert_eq!(actor.role, "Admin");
        assert!(actor.has_any_role(roles::INVENTORY));
        assert!(actor.has_any_role(roles::SALES));
    }

    #[test]
    fn seller_is_not_an_inventory_role() {
        let actor = Actor {
            user_id: UserId::new(4),
            email: "caja@example.com".to_string(),
            role: roles::SELLER.to_string(),
        };
        assert!(actor.has_any_role(roles::SALES));
        assert!(!actor.has_any_role(roles::INVENTORY));

        let lowercase = Actor {
            role: "admin".to_string(),
            ..actor
        };
        assert!(!lowercase.has_any_role(roles::INVENTORY));
    }

    #[test]
    fn expiry_follows_access_ttl() {
        let issuer = TokenIssuer::new(AuthConfig::default());
        let now = Utc::now();
        let claims = issuer.verify(&issuer.issue(&user(), now).unwrap()).unwrap();
        assert_eq!(claims.exp - claims.iat, Duration::days(7).num_seconds());
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = AuthConfig {
            access_ttl: Duration::hours(-1),
            ..AuthConfig::default()
        };
        let issuer = TokenIssuer::new(config);
        let token = issuer.issue(&user(), Utc::now()).unwrap();
        assert!(matches!(
            issuer.verify(&token),
            Err(AuthError::InvalidAccessToken(_))
        ));
    }

    #[test]
    fn foreign_secret_or_audience_is_rejected() {
        let ours = TokenIssuer::new(AuthConfig::new("our-secret-our-secret-our-secret-00"));
        let theirs = TokenIssuer::new(AuthConfig::new("their-secret-their-secret-their-000"));
        let token = theirs.issue(&user(), Utc::now()).unwrap();
        assert!(ours.verify(&token).is_err());

        let other_audience = TokenIssuer::new(AuthConfig {
            audience: "somebody-else".to_string(),
            ..AuthConfig::new("our-secret-our-secret-our-secret-00")
        });
        let token = other_audience.issue(&user(), Utc::now()).unwrap();
        assert!(ours.verify(&token).is_err());

        assert!(ours.verify("not.a.jwt").is_err());
    }

    #[test]
    fn refresh_tokens_are_random_base64() {
        let a = generate_refresh_token();
        let b = generate_refresh_token();
        assert_ne!(a, b);
        assert_eq!(STANDARD.decode(&a).unwrap().len(), REFRESH_TOKEN_BYTES);
    }
}

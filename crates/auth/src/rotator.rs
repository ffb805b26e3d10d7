use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use store::{NewRefreshToken, SoftDeletable, Store, UnitOfWork, UserRecord};
use tracing::{error, info, warn};

use crate::password::verify_password;
use crate::tokens::{Actor, TokenIssuer, generate_refresh_token};
use crate::{AuthConfig, AuthError, Result};

/// Access and refresh credentials handed out together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Logs users in and rotates refresh tokens.
///
/// Every issuance runs in one unit of work: either the new refresh token and
/// any revocation persist together, or nothing does and no pair is returned.
pub struct TokenRotator<S: Store> {
    store: S,
    issuer: TokenIssuer,
}

impl<S: Store> TokenRotator<S> {
    pub fn new(store: S, config: AuthConfig) -> Self {
        Self {
            store,
            issuer: TokenIssuer::new(config),
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Exchanges an email and password for a new token pair.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .filter(|u| u.is_active())
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            warn!(user_id = %user.id, "login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let mut uow = self.store.begin().await?;
        let now = Utc::now();
        let result = self.issue_pair(uow.as_mut(), &user, now).await;
        let pair = finish(uow, result).await?;

        info!(user_id = %user.id, "login succeeded");
        Ok(pair)
    }

    /// Exchanges a refresh token for a new pair and revokes it.
    ///
    /// Unknown, expired and revoked tokens all fail the same way. A failed
    /// exchange issues nothing and leaves the presented token untouched.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let mut uow = self.store.begin().await?;
        let result = self.rotate(uow.as_mut(), refresh_token).await;
        let (pair, user_id) = finish(uow, result).await?;

        metrics::counter!("token_rotations_total").increment(1);
        info!(%user_id, "refresh token rotated");
        Ok(pair)
    }

    /// Resolves the actor behind an access token.
    pub fn verify_access(&self, access_token: &str) -> Result<Actor> {
        self.issuer.verify(access_token).map(Actor::from)
    }

    async fn rotate(
        &self,
        uow: &mut dyn UnitOfWork,
        value: &str,
    ) -> Result<(TokenPair, common::UserId)> {
        let now = Utc::now();

        let stored = uow
            .lock_refresh_token(value)
            .await?
            .filter(|t| t.is_usable(now))
            .ok_or(AuthError::InvalidRefreshToken)?;

        let owner = uow
            .find_user(stored.user_id)
            .await?
            .filter(|u| u.is_active())
            .ok_or(AuthError::InvalidRefreshToken)?;

        uow.revoke_refresh_token(stored.id).await?;
        let pair = self.issue_pair(uow, &owner, now).await?;
        Ok((pair, owner.id))
    }

    async fn issue_pair(
        &self,
        uow: &mut dyn UnitOfWork,
        user: &UserRecord,
        now: DateTime<Utc>,
    ) -> Result<TokenPair> {
        let config = self.issuer.config();

        let purged = uow.purge_expired_refresh_tokens(user.id, now).await?;
        if purged > 0 {
            tracing::debug!(user_id = %user.id, purged, "expired refresh tokens purged");
        }

        let refresh = uow
            .insert_refresh_token(NewRefreshToken {
                token: generate_refresh_token(),
                expires_at: now + config.refresh_ttl,
                created_at: now,
                user_id: user.id,
            })
            .await?;

        Ok(TokenPair {
            access_token: self.issuer.issue(user, now)?,
            refresh_token: refresh.token,
            token_type: "Bearer".to_string(),
            access_expires_at: now + config.access_ttl,
            refresh_expires_at: refresh.expires_at,
        })
    }
}

/// Commits on success, rolls back on failure.
async fn finish<T>(uow: Box<dyn UnitOfWork>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            if let Err(e) = uow.commit().await {
                error!(error = ?e, "token issuance commit failed");
                return Err(e.into());
            }
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = uow.rollback().await {
                error!(error = ?rollback, "token issuance rollback failed");
            }
            Err(e)
        }
    }
}

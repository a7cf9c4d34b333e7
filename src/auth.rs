use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::AppConfig, error::ApiError, models::Account, repository::RepositoryState};

/// Claims
///
/// Payload of the HS256 bearer token. Only the account id travels in the token; role
/// and ownership are re-read from the credential store on every request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the account id.
    pub sub: Uuid,
    /// Expiration time (seconds since the epoch).
    pub exp: usize,
    /// Issued at (seconds since the epoch).
    pub iat: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// issue_token
///
/// Signs a token for `account_id` valid for `config.jwt_ttl_hours`.
pub fn issue_token(account_id: Uuid, config: &AppConfig) -> Result<String, TokenError> {
    let now = Utc::now();
    let expires_at = Duration::try_hours(config.jwt_ttl_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            TokenError::Signing(format!(
                "token lifetime of {} hours is out of range",
                config.jwt_ttl_hours
            ))
        })?;
    let claims = Claims {
        sub: account_id,
        iat: now.timestamp() as usize,
        exp: expires_at.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| TokenError::Signing(e.to_string()))
}

/// decode_token
///
/// Verifies signature and expiry. No leeway is granted on `exp`.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, TokenError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 0;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        })
}

/// AuthUser
///
/// The resolved identity of an authenticated request (password hash excluded).
///
/// Resolution:
/// 1. Reuse an identity already attached by the route-layer middleware, if any.
/// 2. Extract the `Authorization: Bearer <token>` header.
/// 3. Verify the token.
/// 4. Load the account, so tokens of deleted accounts stop working immediately.
///
/// Rejection: 401 with a JSON error body.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub account: Account,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Access denied. No token provided.".to_string()))?;

        let claims = decode_token(token, &config.jwt_secret).map_err(|e| {
            tracing::debug!(error = %e, "rejected bearer token");
            ApiError::from(e)
        })?;

        let account = repo
            .get_account(claims.sub)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid token. User not found.".to_string()))?;

        let user = AuthUser { account };
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// AdminUser
///
/// An `AuthUser` whose role is `admin`. Rejects with 401 when unauthenticated and 403
/// when authenticated without administrative privilege.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Account);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser { account } = AuthUser::from_request_parts(parts, state).await?;

        if !account.is_admin() {
            return Err(ApiError::Forbidden(
                "Access denied. Admin privileges required.".to_string(),
            ));
        }
        Ok(AdminUser(account))
    }
}

/// OptionalAuthUser
///
/// For public routes whose output depends on who is asking. Any authentication
/// failure degrades to an anonymous caller instead of rejecting the request.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<Account>);

impl OptionalAuthUser {
    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(Account::is_admin)
    }
}

impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(header::AUTHORIZATION) {
            return Ok(OptionalAuthUser(None));
        }
        let account = AuthUser::from_request_parts(parts, state)
            .await
            .ok()
            .map(|user| user.account);
        Ok(OptionalAuthUser(account))
    }
}

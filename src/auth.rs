use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::ApiError,
    models::{Role, User},
    repository::{Repository, RepositoryState},
};

/// Header accepted in `Env::Local` in place of a bearer token.
pub const DEV_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload expected inside a bearer JWT. Token issuance happens elsewhere; this service only
/// verifies signature and expiry, then resolves `sub` against the user store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user id.
    pub sub: Uuid,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: usize,
    /// Issued At (iat), seconds since the epoch.
    pub iat: usize,
}

/// AuthRejection
///
/// Why a credential did not yield a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthRejection {
    #[error("Access denied. No token provided.")]
    MissingCredential,
    #[error("Invalid token.")]
    InvalidCredential,
    #[error("Token expired.")]
    ExpiredCredential,
    #[error("Invalid token. User not found.")]
    PrincipalNotFound,
    #[error("Account is deactivated.")]
    PrincipalInactive,
}

impl AuthRejection {
    pub fn code(&self) -> &'static str {
        match self {
            AuthRejection::MissingCredential => "MISSING_TOKEN",
            AuthRejection::InvalidCredential => "INVALID_TOKEN",
            AuthRejection::ExpiredCredential => "TOKEN_EXPIRED",
            AuthRejection::PrincipalNotFound => "USER_NOT_FOUND",
            AuthRejection::PrincipalInactive => "ACCOUNT_DEACTIVATED",
        }
    }
}

/// AuthUser
///
/// The resolved principal of an authenticated request: identity and role. Used as a
/// handler argument it makes authentication mandatory (401 on any failure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl TryFrom<User> for AuthUser {
    type Error = AuthRejection;

    /// Inactive accounts never authenticate, whatever credential they present.
    fn try_from(user: User) -> Result<Self, Self::Error> {
        if !user.is_active {
            return Err(AuthRejection::PrincipalInactive);
        }
        Ok(AuthUser {
            id: user.id,
            role: user.role,
        })
    }
}

/// MaybeAuthUser
///
/// Optional authentication. A valid credential yields `Some(principal)`; a missing or
/// rejected one silently degrades to anonymous access. Never rejects the request.
#[derive(Debug, Clone, Default)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

/// Verifies a bearer token's signature and expiry.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AuthRejection> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthRejection::ExpiredCredential,
            _ => AuthRejection::InvalidCredential,
        })
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthRejection> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthRejection::MissingCredential)?
        .to_str()
        .map_err(|_| AuthRejection::InvalidCredential)?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or(AuthRejection::InvalidCredential)?
        .trim();

    if token.is_empty() {
        return Err(AuthRejection::MissingCredential);
    }
    Ok(token)
}

async fn lookup_principal(repo: &dyn Repository, id: Uuid) -> Result<AuthUser, ApiError> {
    let user = repo
        .get_user(id)
        .await?
        .ok_or(AuthRejection::PrincipalNotFound)?;
    Ok(AuthUser::try_from(user)?)
}

/// Resolves request headers into a principal.
///
/// Order of evaluation:
/// 1. `Env::Local` only: an `x-user-id` header naming an existing, active user.
/// 2. `Authorization: Bearer <jwt>`: signature and expiry check.
/// 3. Store lookup of `sub`: the user must exist and be active.
///
/// Credential problems surface as `ApiError::Authentication`; store failures as
/// `ApiError::Internal`.
pub async fn resolve_principal(
    headers: &HeaderMap,
    repo: &dyn Repository,
    config: &AppConfig,
) -> Result<AuthUser, ApiError> {
    if config.env == Env::Local {
        let dev_user = headers
            .get(DEV_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw).ok());
        if let Some(user_id) = dev_user {
            if let Ok(principal) = lookup_principal(repo, user_id).await {
                return Ok(principal);
            }
        }
    }

    let token = bearer_token(headers)?;
    let claims = decode_token(token, &config.jwt_secret)?;
    lookup_principal(repo, claims.sub).await
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        resolve_principal(&parts.headers, repo.as_ref(), &config).await
    }
}

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        match resolve_principal(&parts.headers, repo.as_ref(), &config).await {
            Ok(principal) => Ok(MaybeAuthUser(Some(principal))),
            Err(ApiError::Authentication(AuthRejection::MissingCredential)) => {
                Ok(MaybeAuthUser(None))
            }
            Err(e) => {
                tracing::debug!(error = %e, "optional authentication failed; continuing anonymously");
                Ok(MaybeAuthUser(None))
            }
        }
    }
}

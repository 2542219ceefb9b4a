use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::ApiError,
    models::{ErrorBody, User},
    repository::RepositoryState,
};

/// The only role the portal checks for today.
pub const ROLE_ADMIN: &str = "admin";

/// Claims
///
/// Payload of a credential. Signed with the server's HMAC secret at login and verified on every
/// admin request. `role` may be absent on the wire; such a credential authenticates but is never
/// authorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id.
    pub sub: Uuid,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Issued at, seconds since the epoch.
    pub iat: u64,
    /// Expiry, seconds since the epoch. The only invalidation mechanism.
    pub exp: u64,
}

/// Principal
///
/// The identity and role decoded from a valid credential. The gate places it in the request
/// extensions; handlers take it as an extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    /// Seconds since the epoch.
    pub expires_at: i64,
}

/// AuthError
///
/// The four ways a request can be REJECTED by the gate. All are terminal for the request.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("No credential supplied")]
    Unauthenticated,

    #[error("Credential is malformed or its signature is invalid")]
    InvalidCredential,

    #[error("Credential has expired")]
    CredentialExpired,

    #[error("Insufficient role for this resource")]
    Forbidden,
}

impl AuthError {
    pub fn status(self) -> StatusCode {
        match self {
            AuthError::Unauthenticated
            | AuthError::InvalidCredential
            | AuthError::CredentialExpired => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    /// Stable, machine-readable signal carried in the `error` field of the response body.
    pub fn code(self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::InvalidCredential => "invalid_credential",
            AuthError::CredentialExpired => "credential_expired",
            AuthError::Forbidden => "forbidden",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut response = (
            self.status(),
            Json(ErrorBody {
                message: self.to_string(),
                error: Some(self.code().to_string()),
            }),
        )
            .into_response();

        if self.status() == StatusCode::UNAUTHORIZED {
            if let Ok(value) = header::HeaderValue::from_str(&format!(
                "Bearer error=\"{}\"",
                self.code()
            )) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}

// --- Credential issuing and verification ---

/// issue_token
///
/// Signs a credential for `user`, valid for `ttl_secs` from `now` (seconds since the epoch).
pub fn issue_token(
    user: &User,
    secret: &str,
    now: u64,
    ttl_secs: u64,
) -> Result<(String, Claims), jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        role: Some(user.role.clone()),
        iat: now,
        exp: now.saturating_add(ttl_secs),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok((token, claims))
}

/// decode_credential
///
/// Verifies signature, algorithm and expiry. Expiry is exact: no leeway is granted.
pub fn decode_credential(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp", "sub"]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|err| match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::CredentialExpired,
        _ => AuthError::InvalidCredential,
    })
}

/// bearer_token
///
/// Extracts the credential from `Authorization: Bearer <token>`. Any other scheme, or an empty
/// token, counts as no credential at all.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::Unauthenticated)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::Unauthenticated)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthenticated);
    }
    Ok(token)
}

/// authorize
///
/// The gate's transition function: UNCHECKED → AUTHORIZED (`Ok(Principal)`) or REJECTED (`Err`).
/// Pure with respect to the request; the only ambient input is the clock used for expiry.
pub fn authorize(
    headers: &HeaderMap,
    secret: &str,
    allowed_roles: &[String],
) -> Result<Principal, AuthError> {
    let token = bearer_token(headers)?;
    let claims = decode_credential(token, secret)?;

    let role = claims.role.ok_or(AuthError::Forbidden)?;
    if !allowed_roles.iter().any(|allowed| *allowed == role) {
        return Err(AuthError::Forbidden);
    }

    Ok(Principal {
        id: claims.sub,
        username: claims.username,
        role,
        expires_at: i64::try_from(claims.exp).unwrap_or(i64::MAX),
    })
}

/// require_admin
///
/// Middleware guarding the admin route set. On rejection it short-circuits with 401/403 and no
/// downstream handler runs; on success the `Principal` is attached to the request extensions.
pub async fn require_admin(
    State(config): State<AppConfig>,
    mut request: Request,
    next: Next,
) -> Response {
    match authorize(request.headers(), &config.jwt_secret, &config.admin_roles) {
        Ok(principal) => {
            tracing::debug!(user = %principal.username, role = %principal.role, "request authorized");
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(
                reason = err.code(),
                method = %request.method(),
                uri = %request.uri(),
                "request rejected by authorization gate"
            );
            err.into_response()
        }
    }
}

/// Principal Extractor Implementation
///
/// Reads the identity placed by `require_admin`. On a route the gate does not cover the
/// extension is absent and the request is rejected as unauthenticated.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}

// --- Passwords ---

pub async fn hash_password(password: String, cost: u32) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Compares against the stored bcrypt hash. A corrupt hash verifies as false.
pub async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// seed_admin
///
/// Creates the bootstrap admin account, or resets its password and role if it already exists.
pub async fn seed_admin(
    repo: &RepositoryState,
    username: &str,
    password: &str,
    cost: u32,
) -> Result<User, ApiError> {
    let password_hash = hash_password(password.to_string(), cost).await?;
    let user = repo
        .upsert_user(User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash,
            role: ROLE_ADMIN.to_string(),
        })
        .await?;
    tracing::info!(user = %user.username, "bootstrap admin account ready");
    Ok(user)
}

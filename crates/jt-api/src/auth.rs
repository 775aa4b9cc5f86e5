use std::fmt;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRef;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use clap::ValueEnum;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use jt_common::{Principal, RoleName};

use crate::error::ApiError;

/// Key material a JWT algorithm verifies against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwtKeyKind {
    Secret,
    RsaPublicKey,
    EcPublicKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum JwtAlgorithm {
    Hs256,
    Hs384,
    Hs512,
    Rs256,
    Es256,
}

impl JwtAlgorithm {
    pub fn key_kind(self) -> JwtKeyKind {
        match self {
            JwtAlgorithm::Hs256 | JwtAlgorithm::Hs384 | JwtAlgorithm::Hs512 => JwtKeyKind::Secret,
            JwtAlgorithm::Rs256 => JwtKeyKind::RsaPublicKey,
            JwtAlgorithm::Es256 => JwtKeyKind::EcPublicKey,
        }
    }

    fn algorithm(self) -> Algorithm {
        match self {
            JwtAlgorithm::Hs256 => Algorithm::HS256,
            JwtAlgorithm::Hs384 => Algorithm::HS384,
            JwtAlgorithm::Hs512 => Algorithm::HS512,
            JwtAlgorithm::Rs256 => Algorithm::RS256,
            JwtAlgorithm::Es256 => Algorithm::ES256,
        }
    }
}

/// Verification settings with the decoding key parsed once at startup.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_algorithm: JwtAlgorithm,
    decoding_key: Arc<DecodingKey>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_algorithm", &self.jwt_algorithm)
            .finish_non_exhaustive()
    }
}

impl AuthConfig {
    /// Build the decoding key for `algorithm`, rejecting missing or
    /// unparsable key material.
    pub fn new(
        jwt_secret: Option<&str>,
        jwt_public_key: Option<&str>,
        jwt_algorithm: JwtAlgorithm,
    ) -> Result<Self, ApiError> {
        let invalid_pem = |err: jsonwebtoken::errors::Error| {
            ApiError::BadRequest(format!("invalid JWT_PUBLIC_KEY: {err}"))
        };
        let decoding_key = match (jwt_algorithm.key_kind(), jwt_secret, jwt_public_key) {
            (JwtKeyKind::Secret, Some(secret), _) => DecodingKey::from_secret(secret.as_bytes()),
            (JwtKeyKind::Secret, None, _) => {
                return Err(ApiError::BadRequest(
                    "JWT_SECRET is required with symmetric JWT algorithms".into(),
                ))
            }
            (JwtKeyKind::RsaPublicKey, _, Some(pem)) => {
                DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(invalid_pem)?
            }
            (JwtKeyKind::EcPublicKey, _, Some(pem)) => {
                DecodingKey::from_ec_pem(pem.as_bytes()).map_err(invalid_pem)?
            }
            (JwtKeyKind::RsaPublicKey | JwtKeyKind::EcPublicKey, _, None) => {
                return Err(ApiError::BadRequest(
                    "JWT_PUBLIC_KEY is required with asymmetric JWT algorithms".into(),
                ))
            }
        };
        Ok(Self {
            jwt_algorithm,
            decoding_key: Arc::new(decoding_key),
        })
    }

    pub fn hmac(secret: &str, algorithm: JwtAlgorithm) -> Self {
        Self {
            jwt_algorithm: algorithm,
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: usize,
}

/// Any caller with a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

/// A caller holding `ROLE_USER` or `ROLE_ADMIN`.
#[derive(Debug, Clone)]
pub struct UserOrAdmin(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AuthConfig::from_ref(state);
        authorize_jwt(parts, &config).map(AuthUser)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for UserOrAdmin
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(principal) = AuthUser::from_request_parts(parts, state).await?;
        if !principal.has_any_role(&RoleName::ALL) {
            return Err(ApiError::Forbidden(format!(
                "{} holds neither ROLE_USER nor ROLE_ADMIN",
                principal.username
            )));
        }
        Ok(UserOrAdmin(principal))
    }
}

fn authorize_jwt(parts: &Parts, config: &AuthConfig) -> Result<Principal, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("expected Bearer token".into()))?;

    let validation = Validation::new(config.jwt_algorithm.algorithm());
    let data = decode::<Claims>(token, &config.decoding_key, &validation)
        .map_err(|err| ApiError::Unauthorized(format!("invalid token: {err}")))?;

    Ok(principal_from_claims(data.claims))
}

/// Unknown role names are dropped rather than rejected.
fn principal_from_claims(claims: Claims) -> Principal {
    let roles = claims
        .roles
        .iter()
        .filter_map(|raw| {
            let role = RoleName::from_claim(raw);
            if role.is_none() {
                debug!(role = %raw, "ignoring unknown role claim");
            }
            role
        })
        .collect::<Vec<_>>();
    Principal::new(claims.sub, roles)
}

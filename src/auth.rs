//! # Authentication
//!
//! Resolves the bearer credential of a request into an [`Identity`] and stores
//! a [`RequestContext`] in the request extensions. Operator tokens from
//! configuration authenticate as an admin employee; portal session tokens are
//! HS256 JWTs signed with the portal secret. Requests without an
//! `Authorization` header pass through with an empty context so that public
//! routes keep working; protected handlers reject them.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, header::USER_AGENT, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use subtle::ConstantTimeEq;
use tracing::debug;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::context::{Employee, EmployeeRole, Identity, PortalClaims, RequestContext};
use crate::error::{ApiError, CoreError, unauthorized};

/// Signs and verifies portal session tokens.
pub struct PortalTokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for PortalTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalTokenCodec")
            .field("algorithm", &"HS256")
            .finish_non_exhaustive()
    }
}

impl PortalTokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn issue(
        &self,
        portal_user_id: Uuid,
        tenant_id: &str,
        client_id: &str,
        ttl: Duration,
    ) -> Result<String, CoreError> {
        let now = Utc::now();
        let claims = PortalClaims {
            sub: portal_user_id,
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| CoreError::malformed(format!("cannot sign portal token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<PortalClaims, CoreError> {
        decode::<PortalClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "portal token rejected");
                CoreError::NotAuthenticated
            })
    }
}

/// Bearer credential verifier shared by every request.
#[derive(Debug, Default)]
pub struct Authenticator {
    operator_tokens: Vec<String>,
    portal: Option<PortalTokenCodec>,
}

impl Authenticator {
    pub fn new(operator_tokens: Vec<String>, portal: Option<PortalTokenCodec>) -> Self {
        Self {
            operator_tokens,
            portal,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let portal = config
            .portal
            .jwt_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .map(|secret| PortalTokenCodec::new(secret.as_bytes()));
        Self::new(config.operator_tokens.clone(), portal)
    }

    pub fn portal(&self) -> Option<&PortalTokenCodec> {
        self.portal.as_ref()
    }

    /// Identity for a bearer token.
    pub fn authenticate(&self, token: &str) -> Result<Identity, CoreError> {
        let operator = self
            .operator_tokens
            .iter()
            .position(|configured| bool::from(token.as_bytes().ct_eq(configured.as_bytes())));
        if let Some(index) = operator {
            return Ok(Identity::Employee(Employee {
                id: operator_id(index),
                email: format!("operator-{}", index + 1),
                role: EmployeeRole::Admin,
            }));
        }

        match &self.portal {
            Some(codec) => codec.verify(token).map(Identity::Portal),
            None => Err(CoreError::NotAuthenticated),
        }
    }
}

/// Stable actor id for the n-th configured operator token.
pub fn operator_id(index: usize) -> Uuid {
    Uuid::from_u128(index as u128 + 1)
}

/// Middleware that attaches a [`RequestContext`] to every request.
pub async fn identity_middleware(
    State(auth): State<Arc<Authenticator>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let mut context = RequestContext::default();

    if let Some(token) = bearer_token(request.headers())? {
        let identity = auth
            .authenticate(token)
            .map_err(|_| unauthorized(Some("Invalid bearer token")))?;
        debug!(identity = identity.kind(), "request authenticated");
        context
            .set_identity(identity)
            .map_err(|_| unauthorized(Some("Multiple identities presented")))?;
    }

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let header = value
        .to_str()
        .map_err(|_| unauthorized(Some("Invalid Authorization header")))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))?
        .trim();

    if token.is_empty() {
        return Err(unauthorized(Some("Empty bearer token")));
    }
    Ok(Some(token))
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Caller address and user agent, recorded on audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

impl<S> FromRequestParts<S> for RequestOrigin
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(Self {
            remote_addr: forwarded.or(peer),
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }
}

//! Bearer credential authentication.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::principal::{MaybePrincipal, Principal};
use crate::auth::token::{TokenError, TokenVerifier};
use crate::error::{ApiError, AuthCode, GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::store::IdentityStore;

/// Resolves a [`Principal`] from an `Authorization: Bearer <token>` header.
pub struct Authenticator {
    verifier: Arc<dyn TokenVerifier>,
    identities: Arc<dyn IdentityStore>,
}

/// Extract the token from a raw `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthCode> {
    let value = header.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(AuthCode::NoToken);
    }

    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthCode::TokenInvalid);
    }
    match token.trim() {
        "" => Err(AuthCode::NoToken),
        token => Ok(token),
    }
}

impl Authenticator {
    pub fn new(verifier: Arc<dyn TokenVerifier>, identities: Arc<dyn IdentityStore>) -> Self {
        Self {
            verifier,
            identities,
        }
    }

    pub async fn authenticate(&self, header: Option<&str>) -> GatewayResult<Principal> {
        let token = bearer_token(header).map_err(GatewayError::Unauthenticated)?;

        let claims = self.verifier.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            GatewayError::Unauthenticated(match e {
                TokenError::Expired => AuthCode::TokenExpired,
                _ => AuthCode::TokenInvalid,
            })
        })?;

        let principal = self
            .identities
            .find_principal(&claims.sub)
            .await?
            .ok_or(GatewayError::Unauthenticated(AuthCode::UserNotFound))?;

        // Deactivated accounts keep valid tokens until expiry; treat them as revoked.
        if !principal.is_active {
            return Err(GatewayError::Unauthenticated(AuthCode::AccountInactive));
        }
        Ok(principal)
    }

    /// Same checks as [`authenticate`](Self::authenticate), but any failure means anonymous.
    pub async fn authenticate_optional(&self, header: Option<&str>) -> Option<Principal> {
        header?;
        match self.authenticate(header).await {
            Ok(principal) => Some(principal),
            Err(e) => {
                tracing::debug!(error = %e, "Optional authentication fell back to anonymous");
                None
            }
        }
    }
}

fn authorization_header(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        // Non-ASCII values cannot be a bearer token
        .map(|v| v.to_str().unwrap_or("invalid"))
}

/// Reject the request unless it carries a valid credential for an active principal.
pub async fn require_auth(
    State(auth): State<Arc<Authenticator>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let result = auth.authenticate(authorization_header(&req)).await;
    match result {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(err) => {
            if let GatewayError::Unauthenticated(code) = &err {
                tracing::warn!(code = code.as_str(), path = %req.uri().path(), "Authentication failed");
                metrics::record_auth_failure(code.as_str());
            }
            ApiError::for_request(err, &req).into_response()
        }
    }
}

/// Attach a [`MaybePrincipal`] and always continue.
pub async fn optional_auth(
    State(auth): State<Arc<Authenticator>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let principal = auth.authenticate_optional(authorization_header(&req)).await;
    req.extensions_mut().insert(MaybePrincipal(principal));
    next.run(req).await
}

//! Per-route admission pipeline.
//!
//! A [`RouteSpec`] declares what a route needs and [`RouteSpec::apply`] wraps
//! its handler so requests pass, in order:
//!
//! ```text
//! general limiter → route tier limiter → authenticator → path id check
//!     → query schema → body schema → ownership → handler
//! ```
//!
//! Sanitizing happens once for the whole router, before any of these.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::MethodRouter,
};

use crate::auth::{
    optional_auth, require_auth, require_owner, Authenticator, OwnershipAuthorizer,
    OwnershipGuard,
};
use crate::error::Operation;
use crate::security::{rate_limit, RateLimiters, Tier, TierGuard};
use crate::store::ResourceKind;
use crate::validation::{require_object_ids, validate_request, Schema, Source, ValidationGuard};

/// Shared stage components every route draws from.
#[derive(Clone)]
pub struct Pipeline {
    pub limiters: Arc<RateLimiters>,
    pub authenticator: Arc<Authenticator>,
    pub ownership: Arc<OwnershipAuthorizer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Public,
    Optional,
    Required,
}

/// Declarative description of one route's admission requirements.
pub struct RouteSpec {
    operation: &'static str,
    tier: Option<Tier>,
    auth: AuthMode,
    id_params: &'static [&'static str],
    query: Option<Schema>,
    body: Option<Schema>,
    owned: Option<ResourceKind>,
}

async fn tag_operation(
    State(operation): State<&'static str>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    req.extensions_mut().insert(Operation(operation));
    next.run(req).await
}

impl RouteSpec {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            tier: None,
            auth: AuthMode::Public,
            id_params: &[],
            query: None,
            body: None,
            owned: None,
        }
    }

    /// Extra rate-limit tier on top of the general one.
    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn optional_auth(mut self) -> Self {
        self.auth = AuthMode::Optional;
        self
    }

    pub fn require_auth(mut self) -> Self {
        self.auth = AuthMode::Required;
        self
    }

    /// Path parameters that must be well-formed document ids.
    pub fn ids(mut self, names: &'static [&'static str]) -> Self {
        self.id_params = names;
        self
    }

    pub fn query(mut self, schema: Schema) -> Self {
        self.query = Some(schema);
        self
    }

    pub fn body(mut self, schema: Schema) -> Self {
        self.body = Some(schema);
        self
    }

    /// Only the owner of the `{id}` resource may proceed. Implies required auth.
    pub fn owned(mut self, kind: ResourceKind) -> Self {
        self.owned = Some(kind);
        self.auth = AuthMode::Required;
        if self.id_params.is_empty() {
            self.id_params = &["id"];
        }
        self
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.auth
    }

    /// Wrap `route` in this spec's stages. Layers added last run first.
    pub fn apply<S>(self, mut route: MethodRouter<S>, pipeline: &Pipeline) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        if let Some(kind) = self.owned {
            route = route.layer(from_fn_with_state(
                OwnershipGuard {
                    authorizer: pipeline.ownership.clone(),
                    kind,
                },
                require_owner,
            ));
        }

        if let Some(schema) = self.body {
            route = route.layer(from_fn_with_state(
                ValidationGuard {
                    schema: Arc::new(schema),
                    source: Source::Body,
                },
                validate_request,
            ));
        }

        if let Some(schema) = self.query {
            route = route.layer(from_fn_with_state(
                ValidationGuard {
                    schema: Arc::new(schema),
                    source: Source::Query,
                },
                validate_request,
            ));
        }

        if !self.id_params.is_empty() {
            route = route.layer(from_fn_with_state(self.id_params, require_object_ids));
        }

        route = match self.auth {
            AuthMode::Public => route,
            AuthMode::Optional => {
                route.layer(from_fn_with_state(pipeline.authenticator.clone(), optional_auth))
            }
            AuthMode::Required => {
                route.layer(from_fn_with_state(pipeline.authenticator.clone(), require_auth))
            }
        };

        if let Some(tier) = self.tier {
            route = route.layer(from_fn_with_state(
                TierGuard {
                    limiters: pipeline.limiters.clone(),
                    tier,
                },
                rate_limit,
            ));
        }

        route
            .layer(from_fn_with_state(
                TierGuard {
                    limiters: pipeline.limiters.clone(),
                    tier: Tier::General,
                },
                rate_limit,
            ))
            .layer(from_fn_with_state(self.operation, tag_operation))
    }
}

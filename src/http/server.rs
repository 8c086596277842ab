//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the subsystems the pipeline needs from one `GatewayConfig`
//! - Create the Axum router with every route wrapped by its `RouteSpec`
//! - Wire up global middleware (tracing, request id, timeout, body limit, sanitizer)
//! - Apply hot-reloaded configuration without resetting limiter counters
//! - Serve until the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::{from_fn, from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{Authenticator, JwtCodec, OwnershipAuthorizer, RegistryError};
use crate::config::GatewayConfig;
use crate::error::{ApiError, ErrorClassifier, GatewayError};
use crate::http::handlers;
use crate::http::pipeline::{Pipeline, RouteSpec};
use crate::http::schemas;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::resilience::{PolicyTable, RetryOrchestrator};
use crate::security::{sanitize_request, RateLimiters, Sanitizer, Tier};
use crate::store::{IdentityStore, ResourceKind, ResourceStore};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub resources: Arc<dyn ResourceStore>,
    pub identities: Arc<dyn IdentityStore>,
    pub tokens: Arc<JwtCodec>,
    pub ownership: Arc<OwnershipAuthorizer>,
    pub retries: Arc<RetryOrchestrator>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    limiters: Arc<RateLimiters>,
    retries: Arc<RetryOrchestrator>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and collaborators.
    pub fn new(
        config: GatewayConfig,
        resources: Arc<dyn ResourceStore>,
        identities: Arc<dyn IdentityStore>,
    ) -> Result<Self, RegistryError> {
        let tokens = Arc::new(JwtCodec::new(&config.auth));
        let limiters = Arc::new(RateLimiters::from_config(&config.rate_limit));
        let ownership = Arc::new(OwnershipAuthorizer::for_store(resources.clone())?);
        let retries = Arc::new(RetryOrchestrator::new(
            PolicyTable::with_overrides(&config.retry_policies),
            Arc::new(ErrorClassifier::default()),
        ));

        let pipeline = Pipeline {
            limiters: limiters.clone(),
            authenticator: Arc::new(Authenticator::new(tokens.clone(), identities.clone())),
            ownership: ownership.clone(),
        };
        let state = AppState {
            resources,
            identities,
            tokens,
            ownership,
            retries: retries.clone(),
        };

        let router = Self::build_router(&config, &pipeline, state);
        Ok(Self {
            router,
            config,
            limiters,
            retries,
        })
    }

    fn routes(p: &Pipeline) -> Router<AppState> {
        use handlers::*;

        const ID: &[&str] = &["id"];

        Router::new()
            .route("/health", get(health))
            // Auth
            .route(
                "/api/auth/login",
                RouteSpec::new("login")
                    .tier(Tier::Auth)
                    .body(schemas::login())
                    .apply(post(login), p),
            )
            .route(
                "/api/auth/forgot-password",
                RouteSpec::new("forgot_password")
                    .tier(Tier::PasswordReset)
                    .body(schemas::forgot_password())
                    .apply(post(forgot_password), p),
            )
            .route(
                "/api/users/me",
                RouteSpec::new("load_profile").require_auth().apply(get(me), p),
            )
            // Farms
            .route(
                "/api/farms",
                RouteSpec::new("list_farms")
                    .optional_auth()
                    .query(schemas::page_query())
                    .apply(get(list_farms), p)
                    .merge(
                        RouteSpec::new("create_farm")
                            .require_auth()
                            .body(schemas::farm_create())
                            .apply(post(create_farm), p),
                    ),
            )
            .route(
                "/api/farms/{id}",
                RouteSpec::new("load_farm")
                    .ids(ID)
                    .apply(get(get_farm), p)
                    .merge(
                        RouteSpec::new("update_farm")
                            .owned(ResourceKind::Farm)
                            .body(schemas::farm_update())
                            .apply(put(update_farm), p),
                    )
                    .merge(
                        RouteSpec::new("delete_farm")
                            .owned(ResourceKind::Farm)
                            .apply(axum::routing::delete(delete_farm), p),
                    ),
            )
            // Crops
            .route(
                "/api/crops",
                RouteSpec::new("create_crop")
                    .require_auth()
                    .body(schemas::crop_create())
                    .apply(post(create_crop), p),
            )
            .route(
                "/api/crops/{id}",
                RouteSpec::new("load_crop")
                    .ids(ID)
                    .apply(get(get_crop), p)
                    .merge(
                        RouteSpec::new("update_crop")
                            .owned(ResourceKind::Crop)
                            .body(schemas::crop_update())
                            .apply(put(update_crop), p),
                    )
                    .merge(
                        RouteSpec::new("delete_crop")
                            .owned(ResourceKind::Crop)
                            .apply(axum::routing::delete(delete_crop), p),
                    ),
            )
            // Community
            .route(
                "/api/community/posts",
                RouteSpec::new("list_posts")
                    .query(schemas::post_query())
                    .apply(get(list_posts), p)
                    .merge(
                        RouteSpec::new("create_post")
                            .tier(Tier::Community)
                            .require_auth()
                            .body(schemas::post_create())
                            .apply(post(create_post), p),
                    ),
            )
            .route(
                "/api/community/posts/{id}",
                RouteSpec::new("update_post")
                    .owned(ResourceKind::Post)
                    .body(schemas::post_update())
                    .apply(put(update_post), p)
                    .merge(
                        RouteSpec::new("delete_post")
                            .owned(ResourceKind::Post)
                            .apply(axum::routing::delete(delete_post), p),
                    ),
            )
            // Uploads
            .route(
                "/api/uploads",
                RouteSpec::new("upload_image")
                    .tier(Tier::Upload)
                    .require_auth()
                    .body(schemas::upload())
                    .apply(post(create_upload), p),
            )
            .fallback(not_found)
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, pipeline: &Pipeline, state: AppState) -> Router {
        let mut router = Self::routes(pipeline).with_state(state);

        if config.security.sanitize_input {
            let sanitizer = Arc::new(Sanitizer::new(config.security.max_body_size));
            router = router.layer(from_fn_with_state(sanitizer, sanitize_request));
        }

        router
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(from_fn_with_state(
                (config.security.max_body_size, config.timeouts.request_secs),
                envelope_layer_rejections,
            ))
            .layer(from_fn(track_requests))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Router with all layers, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn limiters(&self) -> &Arc<RateLimiters> {
        &self.limiters
    }

    pub fn retries(&self) -> &Arc<RetryOrchestrator> {
        &self.retries
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Swap the reloadable settings in place.
    pub fn apply_config(limiters: &RateLimiters, retries: &RetryOrchestrator, config: &GatewayConfig) {
        limiters.apply(&config.rate_limit);
        retries.replace_policies(PolicyTable::with_overrides(&config.retry_policies));
        tracing::info!(
            retry_classes = config.retry_policies.len(),
            rate_limit_enabled = config.rate_limit.enabled,
            "Configuration reloaded"
        );
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    ///
    /// Configs arriving on `config_updates` go through [`Self::apply_config`].
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<GatewayConfig>>,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(mut updates) = config_updates {
            let limiters = self.limiters.clone();
            let retries = self.retries.clone();
            let current = self.config.clone();
            tokio::spawn(async move {
                while let Some(new_config) = updates.recv().await {
                    if new_config.listener.bind_address != current.listener.bind_address
                        || new_config.timeouts.request_secs != current.timeouts.request_secs
                        || new_config.auth.jwt_secret != current.auth.jwt_secret
                        || new_config.security.max_body_size != current.security.max_body_size
                        || new_config.security.sanitize_input != current.security.sanitize_input
                    {
                        tracing::warn!("Listener, timeout, auth and body settings take effect after restart");
                    }
                    Self::apply_config(&limiters, &retries, &new_config);
                }
            });
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn track_requests(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let response = next.run(req).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

/// Body-limit and timeout layers answer with bare 413 / 408 responses.
/// Rewrite those into the error envelope, keeping their status.
async fn envelope_layer_rejections(
    State((limit, secs)): State<(usize, u64)>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let response = next.run(req).await;
    let status = response.status();
    let error = match status {
        StatusCode::PAYLOAD_TOO_LARGE => GatewayError::PayloadTooLarge { limit },
        StatusCode::REQUEST_TIMEOUT => GatewayError::Timeout { secs },
        _ => return response,
    };

    let mut rejected = ApiError::new(error).into_response();
    *rejected.status_mut() = status;
    rejected
}

//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use harvest_gateway::auth::{Claims, JwtCodec, Principal};
use harvest_gateway::config::GatewayConfig;
use harvest_gateway::store::{IdentityStore, MemoryStore, ResourceKind, ResourceStore};
use harvest_gateway::HttpServer;

pub const SECRET: &str = "integration-test-secret";
pub const PASSWORD: &str = "correct-horse";

pub const ALICE: &str = "65a1f0c2b3d4e5f601234501";
pub const BOB: &str = "65a1f0c2b3d4e5f601234502";
pub const CAROL: &str = "65a1f0c2b3d4e5f601234503";
pub const ALICE_FARM: &str = "65a1f0c2b3d4e5f60123f001";
pub const MISSING_FARM: &str = "65a1f0c2b3d4e5f60123ffff";

pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.jwt_secret = SECRET.to_string();
    config
}

fn user(id: &str, name: &str, active: bool) -> Principal {
    Principal {
        id: id.to_string(),
        email: format!("{name}@farm.test"),
        handle: name.to_string(),
        is_active: active,
    }
}

/// Alice owns one farm, Bob owns nothing, Carol is deactivated.
pub fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.add_user(user(ALICE, "alice", true), PASSWORD);
    store.add_user(user(BOB, "bob", true), PASSWORD);
    store.add_user(user(CAROL, "carol", false), PASSWORD);
    store
        .put(
            ResourceKind::Farm,
            json!({ "_id": ALICE_FARM, "name": "North field", "area": 12.5, "owner": ALICE }),
        )
        .unwrap();
    Arc::new(store)
}

pub struct TestApp {
    pub router: Router,
    pub server: HttpServer,
    pub store: Arc<MemoryStore>,
    pub config: GatewayConfig,
}

pub fn app_with(config: GatewayConfig) -> TestApp {
    let store = seeded_store();
    app_with_store(config, store.clone(), store)
}

pub fn app_with_store(
    config: GatewayConfig,
    resources: Arc<dyn ResourceStore>,
    store: Arc<MemoryStore>,
) -> TestApp {
    let identities: Arc<dyn IdentityStore> = store.clone();
    let server = HttpServer::new(config.clone(), resources, identities).unwrap();
    TestApp {
        router: server.router(),
        server,
        store,
        config,
    }
}

pub fn app() -> TestApp {
    app_with(test_config())
}

pub fn token_for(config: &GatewayConfig, user_id: &str) -> String {
    JwtCodec::new(&config.auth).issue(user_id).unwrap()
}

pub fn expired_token(config: &GatewayConfig, user_id: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    JwtCodec::new(&config.auth)
        .issue_claims(&Claims {
            sub: user_id.to_string(),
            iat: now - 7200,
            exp: now - 3600,
            iss: None,
        })
        .unwrap()
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Reply {
    pub fn code(&self) -> &str {
        self.body["error"]["code"].as_str().unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.body["error"]["type"].as_str().unwrap_or_default()
    }
}

pub struct Call {
    method: Method,
    uri: String,
    token: Option<String>,
    body: Option<Value>,
    raw: Option<(String, String)>,
    headers: Vec<(String, String)>,
    peer: SocketAddr,
}

pub fn call(method: Method, uri: impl Into<String>) -> Call {
    Call {
        method,
        uri: uri.into(),
        token: None,
        body: None,
        raw: None,
        headers: Vec::new(),
        peer: "10.0.0.1:40000".parse().unwrap(),
    }
}

impl Call {
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Body sent verbatim under the given content type.
    pub fn raw(mut self, content_type: &str, body: impl Into<String>) -> Self {
        self.raw = Some((content_type.to_string(), body.into()));
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn from_peer(mut self, peer: &str) -> Self {
        self.peer = peer.parse().unwrap();
        self
    }

    pub async fn send(self, router: &Router) -> Reply {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        if let Some(token) = &self.token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let body = match (self.body, self.raw) {
            (Some(value), _) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            (None, Some((content_type, raw))) => {
                builder = builder.header("content-type", content_type);
                Body::from(raw)
            }
            (None, None) => Body::empty(),
        };

        let mut request = builder.body(body).unwrap();
        request.extensions_mut().insert(ConnectInfo(self.peer));

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        Reply {
            status,
            headers,
            body,
        }
    }
}

//! End-to-end admission pipeline behavior, driven through the router in-process.

mod common;

use axum::http::{header, Method, StatusCode};
use serde_json::json;

use common::*;

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let app = app();
    let reply = call(Method::GET, "/api/users/me").send(&app.router).await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.kind(), "AUTH");
    assert_eq!(reply.code(), "NO_TOKEN");
    assert_eq!(reply.body["success"], false);
    assert_eq!(reply.body["error"]["retryable"], false);
}

#[tokio::test]
async fn test_token_failure_codes() {
    let app = app();

    let expired = expired_token(&app.config, ALICE);
    let reply = call(Method::GET, "/api/users/me")
        .token(expired)
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.code(), "TOKEN_EXPIRED");

    let reply = call(Method::GET, "/api/users/me")
        .token("not.a.jwt")
        .send(&app.router)
        .await;
    assert_eq!(reply.code(), "TOKEN_INVALID");

    let mut other = test_config();
    other.auth.jwt_secret = "some-other-secret".into();
    let reply = call(Method::GET, "/api/users/me")
        .token(token_for(&other, ALICE))
        .send(&app.router)
        .await;
    assert_eq!(reply.code(), "TOKEN_INVALID");

    let reply = call(Method::GET, "/api/users/me")
        .token(token_for(&app.config, MISSING_FARM))
        .send(&app.router)
        .await;
    assert_eq!(reply.code(), "USER_NOT_FOUND");

    let reply = call(Method::GET, "/api/users/me")
        .token(token_for(&app.config, CAROL))
        .send(&app.router)
        .await;
    assert_eq!(reply.code(), "ACCOUNT_INACTIVE");
}

#[tokio::test]
async fn test_valid_token_resolves_principal() {
    let app = app();
    let reply = call(Method::GET, "/api/users/me")
        .token(token_for(&app.config, ALICE))
        .send(&app.router)
        .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["user"]["id"], ALICE);
    assert_eq!(reply.body["user"]["email"], "alice@farm.test");
}

#[tokio::test]
async fn test_optional_auth_needs_principal_only_for_own_listing() {
    let app = app();

    let reply = call(Method::GET, "/api/farms").send(&app.router).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["count"], 1);

    let reply = call(Method::GET, "/api/farms?mine=true")
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.code(), "NOT_AUTHENTICATED");

    let reply = call(Method::GET, "/api/farms?mine=true")
        .token(token_for(&app.config, BOB))
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["count"], 0);
}

// ---------------------------------------------------------------------------
// Ownership
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_non_owner_cannot_modify_farm() {
    let app = app();
    let reply = call(Method::PUT, format!("/api/farms/{ALICE_FARM}"))
        .token(token_for(&app.config, BOB))
        .json(json!({ "name": "Taken over" }))
        .send(&app.router)
        .await;

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.kind(), "AUTHORIZATION");
    assert_eq!(reply.code(), "NOT_OWNER");

    let reply = call(Method::GET, format!("/api/farms/{ALICE_FARM}"))
        .send(&app.router)
        .await;
    assert_eq!(reply.body["data"]["name"], "North field");
}

#[tokio::test]
async fn test_owner_can_modify_and_delete_farm() {
    let app = app();
    let token = token_for(&app.config, ALICE);

    let reply = call(Method::PUT, format!("/api/farms/{ALICE_FARM}"))
        .token(token.clone())
        .json(json!({ "name": "South field", "owner": BOB }))
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["name"], "South field");
    // Not in the update schema, so it never reaches the store
    assert_eq!(reply.body["data"]["owner"], ALICE);

    let reply = call(Method::DELETE, format!("/api/farms/{ALICE_FARM}"))
        .token(token)
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = call(Method::GET, format!("/api/farms/{ALICE_FARM}"))
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_resource_is_not_found_before_ownership() {
    let app = app();
    let reply = call(Method::DELETE, format!("/api/farms/{MISSING_FARM}"))
        .token(token_for(&app.config, BOB))
        .send(&app.router)
        .await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.kind(), "NOT_FOUND");
}

#[tokio::test]
async fn test_unauthenticated_beats_not_found_on_owned_routes() {
    let app = app();
    let reply = call(Method::DELETE, format!("/api/farms/{MISSING_FARM}"))
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_crop_requires_owning_the_farm() {
    let app = app();
    let body = json!({ "farm": ALICE_FARM, "name": "Maize" });

    let reply = call(Method::POST, "/api/crops")
        .token(token_for(&app.config, BOB))
        .json(body.clone())
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = call(Method::POST, "/api/crops")
        .token(token_for(&app.config, ALICE))
        .json(body)
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["data"]["status"], "planned");
    assert_eq!(reply.body["data"]["owner"], ALICE);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_required_field_reports_single_error() {
    let app = app();
    let reply = call(Method::POST, "/api/farms")
        .token(token_for(&app.config, ALICE))
        .json(json!({ "name": "Hilltop", "foo": "bar" }))
        .send(&app.router)
        .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.kind(), "VALIDATION");
    let errors = reply.body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field"], "area");
    assert_eq!(errors[0]["message"], "area is required");
}

#[tokio::test]
async fn test_unknown_fields_are_stripped_and_defaults_applied() {
    let app = app();
    let reply = call(Method::POST, "/api/farms")
        .token(token_for(&app.config, ALICE))
        .json(json!({ "name": "  Hilltop  ", "area": 4, "foo": "bar" }))
        .send(&app.router)
        .await;

    assert_eq!(reply.status, StatusCode::CREATED);
    let farm = &reply.body["data"];
    assert_eq!(farm["name"], "Hilltop");
    assert_eq!(farm["unit"], "acres");
    assert_eq!(farm["owner"], ALICE);
    assert!(farm.get("foo").is_none());
}

#[tokio::test]
async fn test_every_field_error_is_collected() {
    let app = app();
    let reply = call(Method::POST, "/api/uploads")
        .token(token_for(&app.config, ALICE))
        .json(json!({ "contentType": "application/pdf", "size": 0, "farm": "nope" }))
        .send(&app.router)
        .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = reply.body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, ["filename", "contentType", "size", "farm"]);
}

#[tokio::test]
async fn test_malformed_path_id_is_rejected_before_lookup() {
    let app = app();
    let reply = call(Method::GET, "/api/farms/not-an-id")
        .send(&app.router)
        .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.kind(), "VALIDATION");
    assert_eq!(reply.body["errors"][0]["field"], "id");
}

#[tokio::test]
async fn test_query_is_coerced_and_bounded() {
    let app = app();

    let reply = call(Method::GET, "/api/farms?page=2&limit=5")
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["page"], 2);
    assert_eq!(reply.body["limit"], 5);

    let reply = call(Method::GET, "/api/farms?limit=500")
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["errors"][0]["field"], "limit");

    let reply = call(Method::GET, "/api/community/posts?category=gossip")
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error() {
    let app = app();
    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{\"email\": "))
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_out_of_range_page_is_rejected() {
    let app = app();
    let reply = call(Method::GET, "/api/farms?page=9223372036854775807&limit=100")
        .send(&app.router)
        .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["errors"][0]["field"], "page");

    let reply = call(Method::GET, "/api/community/posts?page=10000&limit=100")
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["count"], 0);
}

#[tokio::test]
async fn test_oversized_body_uses_error_envelope() {
    let mut config = test_config();
    config.security.max_body_size = 64;
    let app = app_with(config);

    let body = json!({ "name": "Hilltop", "area": 4, "description": "x".repeat(200) }).to_string();
    let reply = call(Method::POST, "/api/farms")
        .token(token_for(&app.config, ALICE))
        .header("content-length", body.len().to_string())
        .raw("application/json", body)
        .send(&app.router)
        .await;

    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(reply.body["success"], false);
    assert_eq!(reply.kind(), "VALIDATION");
    assert_eq!(reply.code(), "PAYLOAD_TOO_LARGE");
}

// ---------------------------------------------------------------------------
// Sanitizing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_script_is_removed_before_storage() {
    let app = app();
    let reply = call(Method::POST, "/api/community/posts")
        .token(token_for(&app.config, ALICE))
        .json(json!({
            "title": "<script>alert(1)</script>Hello world",
            "content": "<a href=\"javascript:steal()\">Harvest tips</a>",
        }))
        .send(&app.router)
        .await;

    assert_eq!(reply.status, StatusCode::CREATED);
    let post = &reply.body["data"];
    assert_eq!(post["title"], "Hello world");
    assert!(!post["content"].as_str().unwrap().contains("javascript:"));
    assert_eq!(post["author"], ALICE);
    assert_eq!(post["authorName"], "alice");
    assert_eq!(post["category"], "general");
}

#[tokio::test]
async fn test_non_json_body_cannot_bypass_sanitizer() {
    let app = app();
    let reply = call(Method::POST, "/api/community/posts")
        .token(token_for(&app.config, ALICE))
        .raw(
            "text/plain",
            r#"{"title":"<script>alert(1)</script>Hello world","content":"hi"}"#,
        )
        .send(&app.router)
        .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.kind(), "VALIDATION");
    assert_eq!(reply.code(), "INVALID_PAYLOAD");

    let reply = call(Method::GET, "/api/community/posts").send(&app.router).await;
    assert_eq!(reply.body["count"], 0);
}

#[tokio::test]
async fn test_sanitizing_can_be_disabled() {
    let mut config = test_config();
    config.security.sanitize_input = false;
    let app = app_with(config);

    let reply = call(Method::POST, "/api/community/posts")
        .token(token_for(&app.config, ALICE))
        .json(json!({ "title": "<script>x</script>Raw", "content": "body" }))
        .send(&app.router)
        .await;
    assert_eq!(reply.body["data"]["title"], "<script>x</script>Raw");
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sixth_failed_login_is_throttled() {
    let app = app();
    let bad = json!({ "email": "alice@farm.test", "password": "wrong" });

    for i in 0..5 {
        let reply = call(Method::POST, "/api/auth/login")
            .json(bad.clone())
            .send(&app.router)
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "attempt {}", i + 1);
        assert_eq!(reply.code(), "INVALID_CREDENTIALS");
    }

    let reply = call(Method::POST, "/api/auth/login")
        .json(json!({ "email": "alice@farm.test", "password": PASSWORD }))
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(reply.kind(), "RATE_LIMIT");
    assert_eq!(reply.body["error"]["retryable"], true);
    assert!(reply.body["error"]["retryAfter"].as_u64().unwrap() > 0);
    assert!(reply.headers.contains_key(header::RETRY_AFTER));
    assert_eq!(reply.headers["ratelimit-remaining"], "0");

    // Other clients are unaffected
    let reply = call(Method::POST, "/api/auth/login")
        .from_peer("10.0.0.2:40000")
        .json(json!({ "email": "alice@farm.test", "password": PASSWORD }))
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_successful_logins_do_not_count() {
    let app = app();
    for _ in 0..8 {
        let reply = call(Method::POST, "/api/auth/login")
            .json(json!({ "email": "Bob@Farm.test", "password": PASSWORD }))
            .send(&app.router)
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body["token"].as_str().is_some());
    }
}

#[tokio::test]
async fn test_quota_headers_report_route_tier() {
    let app = app();

    let reply = call(Method::GET, "/api/farms").send(&app.router).await;
    assert_eq!(reply.headers["ratelimit-limit"], "100");
    assert_eq!(reply.headers["ratelimit-remaining"], "99");

    let reply = call(Method::POST, "/api/auth/forgot-password")
        .json(json!({ "email": "bob@farm.test" }))
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert_eq!(reply.headers["ratelimit-limit"], "3");
}

#[tokio::test]
async fn test_disabled_limiter_sets_no_headers() {
    let mut config = test_config();
    config.rate_limit.enabled = false;
    let app = app_with(config);

    let reply = call(Method::GET, "/api/farms").send(&app.router).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(!reply.headers.contains_key("ratelimit-limit"));
}

#[tokio::test]
async fn test_reload_keeps_counters() {
    let app = app();
    for _ in 0..3 {
        call(Method::POST, "/api/community/posts")
            .token(token_for(&app.config, BOB))
            .json(json!({ "title": "Rain again", "content": "Fields are wet" }))
            .send(&app.router)
            .await;
    }

    let mut reloaded = app.config.clone();
    reloaded.rate_limit.community.limit = 3;
    harvest_gateway::HttpServer::apply_config(
        app.server.limiters(),
        app.server.retries(),
        &reloaded,
    );

    let reply = call(Method::POST, "/api/community/posts")
        .token(token_for(&app.config, BOB))
        .json(json!({ "title": "Rain again", "content": "Fields are wet" }))
        .send(&app.router)
        .await;
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_route_uses_error_envelope() {
    let app = app();
    let reply = call(Method::GET, "/api/nothing-here").send(&app.router).await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.kind(), "NOT_FOUND");
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = app();
    let reply = call(Method::GET, "/health").send(&app.router).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.headers.contains_key("x-request-id"));
}

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;

use crate::billing::router::claims_from_headers;
use crate::billing::{billing_router, BillingApi, SubscriptionError, USER_ID_HEADER, USER_TYPE_HEADER};

fn router(harness: &Harness) -> axum::Router {
    billing_router(BillingApi::new(
        harness.service.clone(),
        Duration::from_secs(5),
    ))
}

fn request(method: Method, uri: &str, claims: Option<(&str, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((user_id, user_type)) = claims {
        builder = builder
            .header(USER_ID_HEADER, user_id)
            .header(USER_TYPE_HEADER, user_type);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("serialize body")))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

async fn create(harness: &Harness) -> String {
    let response = router(harness)
        .oneshot(request(
            Method::POST,
            "/api/v1/subscription-requests",
            Some(("u-sp", "serviceProvider")),
            Some(json!({
                "entity_kind": "service_provider",
                "entity_id": "sp-1",
                "plan_id": "plan-annual"
            })),
        ))
        .await
        .expect("route responds");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "pending");
    body["request_id"].as_str().expect("request id").to_string()
}

#[tokio::test]
async fn create_then_resolve_over_http() {
    let harness = harness();
    let request_id = create(&harness).await;

    let uri = format!("/api/v1/subscription-requests/{request_id}/resolve");
    let response = router(&harness)
        .oneshot(request(
            Method::POST,
            &uri,
            Some(("admin-1", "admin")),
            Some(json!({ "decision": "approved" })),
        ))
        .await
        .expect("route responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "approved");
    assert_eq!(body["status_changed"], true);
    assert_eq!(body["commission"]["kind"], "posted");
    assert!(body["subscription"]["end_date"].is_string());

    let replay = router(&harness)
        .oneshot(request(
            Method::POST,
            &uri,
            Some(("manager-1", "manager")),
            Some(json!({ "decision": "rejected", "note": "duplicate" })),
        ))
        .await
        .expect("route responds");
    assert_eq!(replay.status(), StatusCode::CONFLICT);
    let body = read_json_body(replay).await;
    assert_eq!(body["error"], "already_processed");
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let harness = harness();
    let response = router(&harness)
        .oneshot(request(
            Method::GET,
            "/api/v1/subscription-requests/pending",
            None,
            None,
        ))
        .await
        .expect("route responds");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pending_listing_rejects_entity_owners() {
    let harness = harness();
    create(&harness).await;

    let forbidden = router(&harness)
        .oneshot(request(
            Method::GET,
            "/api/v1/subscription-requests/pending?limit=5",
            Some(("u-sp", "serviceProvider")),
            None,
        ))
        .await
        .expect("route responds");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let listed = router(&harness)
        .oneshot(request(
            Method::GET,
            "/api/v1/subscription-requests/pending?limit=5",
            Some(("sm-1", "sales_manager")),
            None,
        ))
        .await
        .expect("route responds");
    assert_eq!(listed.status(), StatusCode::OK);
    let body = read_json_body(listed).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["entity"]["business_name"], "sp-1 trading");
}

#[tokio::test]
async fn bad_path_values_are_client_errors() {
    let harness = harness();
    let unknown_kind = router(&harness)
        .oneshot(request(
            Method::GET,
            "/api/v1/plans/restaurant",
            Some(("u-sp", "serviceProvider")),
            None,
        ))
        .await
        .expect("route responds");
    assert_eq!(unknown_kind.status(), StatusCode::BAD_REQUEST);

    let bad_decision = router(&harness)
        .oneshot(request(
            Method::POST,
            "/api/v1/subscription-requests/req-1/resolve",
            Some(("admin-1", "admin")),
            Some(json!({ "decision": "maybe" })),
        ))
        .await
        .expect("route responds");
    assert_eq!(bad_decision.status(), StatusCode::BAD_REQUEST);

    let unknown_request = router(&harness)
        .oneshot(request(
            Method::POST,
            "/api/v1/subscription-requests/req-404/resolve",
            Some(("admin-1", "admin")),
            Some(json!({ "decision": "approved" })),
        ))
        .await
        .expect("route responds");
    assert_eq!(unknown_request.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn remaining_time_and_cancel_routes() {
    let harness = harness();
    let request_id = create(&harness).await;
    approve(&harness, &admin(), &crate::billing::RequestId(request_id)).expect("approved");

    let base = "/api/v1/entities/service_provider/sp-1/subscription";
    let remaining = router(&harness)
        .oneshot(request(
            Method::GET,
            &format!("{base}/remaining-time"),
            Some(("u-sp", "serviceProvider")),
            None,
        ))
        .await
        .expect("route responds");
    assert_eq!(remaining.status(), StatusCode::OK);
    let body = read_json_body(remaining).await;
    assert_eq!(body["has_active_subscription"], true);
    assert_eq!(body["percentage_used"], 0.0);

    let cancelled = router(&harness)
        .oneshot(request(
            Method::POST,
            &format!("{base}/cancel"),
            Some(("u-sp", "serviceProvider")),
            None,
        ))
        .await
        .expect("route responds");
    assert_eq!(cancelled.status(), StatusCode::OK);
    let body = read_json_body(cancelled).await;
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["auto_renew"], false);

    let current = router(&harness)
        .oneshot(request(
            Method::GET,
            &format!("{base}/current"),
            Some(("admin-1", "admin")),
            None,
        ))
        .await
        .expect("route responds");
    assert_eq!(current.status(), StatusCode::OK);
    assert_eq!(read_json_body(current).await, Value::Null);
}

#[test]
fn claims_require_known_user_type() {
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(USER_ID_HEADER, "u-1".parse().expect("header value"));
    headers.insert(USER_TYPE_HEADER, "superuser".parse().expect("header value"));
    assert!(matches!(
        claims_from_headers(&headers),
        Err(SubscriptionError::Forbidden(_))
    ));

    headers.insert(USER_TYPE_HEADER, "company".parse().expect("header value"));
    let claims = claims_from_headers(&headers).expect("claims");
    assert_eq!(claims.user_id.as_str(), "u-1");
}

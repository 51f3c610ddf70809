use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::warn;

use super::domain::{
    Claims, Decision, EntityId, EntityKind, EntityRef, PlanId, ProofUpload, RequestId, UserId,
    UserType,
};
use super::error::SubscriptionError;
use super::service::{NewRequest, SubscriptionService};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_TYPE_HEADER: &str = "x-user-type";
const DEFAULT_PENDING_LIMIT: usize = 50;

/// Shared handler state: the service plus the per-request time bound.
#[derive(Clone)]
pub struct BillingApi {
    pub service: Arc<SubscriptionService>,
    pub timeout: Duration,
}

impl BillingApi {
    pub fn new(service: Arc<SubscriptionService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }
}

/// Router builder exposing the subscription workflow over HTTP.
pub fn billing_router(api: BillingApi) -> Router {
    Router::new()
        .route("/api/v1/subscription-requests", post(create_request_handler))
        .route(
            "/api/v1/subscription-requests/pending",
            get(pending_requests_handler),
        )
        .route(
            "/api/v1/subscription-requests/:request_id/resolve",
            post(resolve_handler),
        )
        .route("/api/v1/plans/:entity_kind", get(plans_handler))
        .route(
            "/api/v1/entities/:entity_kind/:entity_id/subscription/status",
            get(status_handler),
        )
        .route(
            "/api/v1/entities/:entity_kind/:entity_id/subscription/current",
            get(current_handler),
        )
        .route(
            "/api/v1/entities/:entity_kind/:entity_id/subscription/cancel",
            post(cancel_handler),
        )
        .route(
            "/api/v1/entities/:entity_kind/:entity_id/subscription/remaining-time",
            get(remaining_time_handler),
        )
        .with_state(api)
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRequestBody {
    entity_kind: String,
    entity_id: String,
    plan_id: String,
    #[serde(default)]
    proof: Option<ProofUpload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveBody {
    decision: String,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PendingQuery {
    limit: Option<usize>,
}

pub(crate) fn claims_from_headers(headers: &HeaderMap) -> Result<Claims, SubscriptionError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let (Some(user_id), Some(user_type)) = (header(USER_ID_HEADER), header(USER_TYPE_HEADER))
    else {
        return Err(SubscriptionError::Unauthenticated);
    };
    let user_type = UserType::parse(user_type)
        .ok_or_else(|| SubscriptionError::forbidden(format!("unknown user type '{user_type}'")))?;
    Ok(Claims {
        user_id: UserId::parse(user_id)?,
        user_type,
    })
}

fn entity_ref(kind: &str, id: &str) -> Result<EntityRef, SubscriptionError> {
    let kind = EntityKind::parse(kind)
        .ok_or_else(|| SubscriptionError::invalid(format!("unknown entity kind '{kind}'")))?;
    Ok(EntityRef::new(kind, EntityId::parse(id)?))
}

/// Runs synchronous service work on the blocking pool under the configured bound.
async fn run_bounded<T, F>(timeout: Duration, work: F) -> Result<T, SubscriptionError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SubscriptionError> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(SubscriptionError::Internal(join.to_string())),
        Err(_) => {
            warn!(?timeout, "billing operation timed out");
            Err(SubscriptionError::Timeout(timeout))
        }
    }
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, SubscriptionError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn create_request_handler(
    State(api): State<BillingApi>,
    headers: HeaderMap,
    Json(body): Json<CreateRequestBody>,
) -> Response {
    let result = async {
        let claims = claims_from_headers(&headers)?;
        let request = NewRequest {
            entity: entity_ref(&body.entity_kind, &body.entity_id)?,
            plan_id: PlanId::parse(&body.plan_id)?,
            proof: body.proof,
        };
        let service = api.service.clone();
        run_bounded(api.timeout, move || service.create_request(&claims, request)).await
    }
    .await;
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn pending_requests_handler(
    State(api): State<BillingApi>,
    headers: HeaderMap,
    Query(query): Query<PendingQuery>,
) -> Response {
    let result = async {
        let claims = claims_from_headers(&headers)?;
        let limit = query.limit.unwrap_or(DEFAULT_PENDING_LIMIT);
        let service = api.service.clone();
        run_bounded(api.timeout, move || service.pending_requests(&claims, limit)).await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn resolve_handler(
    State(api): State<BillingApi>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> Response {
    let result = async {
        let claims = claims_from_headers(&headers)?;
        let request_id = RequestId::parse(&request_id)?;
        let decision = Decision::parse(&body.decision).ok_or_else(|| {
            SubscriptionError::invalid("decision must be 'approved' or 'rejected'")
        })?;
        let note = body.note;
        let service = api.service.clone();
        run_bounded(api.timeout, move || {
            service.resolve(&claims, &request_id, decision, note)
        })
        .await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn plans_handler(
    State(api): State<BillingApi>,
    headers: HeaderMap,
    Path(entity_kind): Path<String>,
) -> Response {
    let result = async {
        let claims = claims_from_headers(&headers)?;
        let kind = EntityKind::parse(&entity_kind).ok_or_else(|| {
            SubscriptionError::invalid(format!("unknown entity kind '{entity_kind}'"))
        })?;
        let service = api.service.clone();
        run_bounded(api.timeout, move || service.plans(&claims, kind)).await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn status_handler(
    State(api): State<BillingApi>,
    headers: HeaderMap,
    Path((entity_kind, entity_id)): Path<(String, String)>,
) -> Response {
    let result = async {
        let claims = claims_from_headers(&headers)?;
        let entity = entity_ref(&entity_kind, &entity_id)?;
        let service = api.service.clone();
        run_bounded(api.timeout, move || service.status(&claims, &entity)).await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn current_handler(
    State(api): State<BillingApi>,
    headers: HeaderMap,
    Path((entity_kind, entity_id)): Path<(String, String)>,
) -> Response {
    let result = async {
        let claims = claims_from_headers(&headers)?;
        let entity = entity_ref(&entity_kind, &entity_id)?;
        let service = api.service.clone();
        run_bounded(api.timeout, move || {
            service.current_subscription(&claims, &entity)
        })
        .await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn cancel_handler(
    State(api): State<BillingApi>,
    headers: HeaderMap,
    Path((entity_kind, entity_id)): Path<(String, String)>,
) -> Response {
    let result = async {
        let claims = claims_from_headers(&headers)?;
        let entity = entity_ref(&entity_kind, &entity_id)?;
        let service = api.service.clone();
        run_bounded(api.timeout, move || service.cancel(&claims, &entity)).await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn remaining_time_handler(
    State(api): State<BillingApi>,
    headers: HeaderMap,
    Path((entity_kind, entity_id)): Path<(String, String)>,
) -> Response {
    let result = async {
        let claims = claims_from_headers(&headers)?;
        let entity = entity_ref(&entity_kind, &entity_id)?;
        let service = api.service.clone();
        run_bounded(api.timeout, move || service.remaining_time(&claims, &entity)).await
    }
    .await;
    respond(StatusCode::OK, result)
}

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde_json::json;

use super::domain::{InvalidIdentifier, PlanId, RequestId};
use super::repository::RepositoryError;

/// Workflow-level failure surfaced to callers of the subscription service.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("request {0} has already been processed")]
    AlreadyProcessed(RequestId),
    #[error("missing caller identity")]
    Unauthenticated,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("plan {plan_id} has unsupported duration {duration}")]
    InvalidPlanDuration { plan_id: PlanId, duration: u8 },
    #[error("plan {plan_id} has negative price {price}")]
    InvalidPlanPrice { plan_id: PlanId, price: Decimal },
    #[error(transparent)]
    Repository(RepositoryError),
    #[error("operation exceeded {0:?}")]
    Timeout(Duration),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SubscriptionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SubscriptionError::NotFound(_) => StatusCode::NOT_FOUND,
            SubscriptionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            SubscriptionError::Conflict(_) | SubscriptionError::AlreadyProcessed(_) => {
                StatusCode::CONFLICT
            }
            SubscriptionError::Unauthenticated => StatusCode::UNAUTHORIZED,
            SubscriptionError::Forbidden(_) => StatusCode::FORBIDDEN,
            SubscriptionError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SubscriptionError::InvalidPlanDuration { .. }
            | SubscriptionError::InvalidPlanPrice { .. }
            | SubscriptionError::Repository(_)
            | SubscriptionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable tag for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SubscriptionError::NotFound(_) => "not_found",
            SubscriptionError::InvalidInput(_) => "invalid_input",
            SubscriptionError::Conflict(_) => "conflict",
            SubscriptionError::AlreadyProcessed(_) => "already_processed",
            SubscriptionError::Unauthenticated => "unauthenticated",
            SubscriptionError::Forbidden(_) => "forbidden",
            SubscriptionError::InvalidPlanDuration { .. } => "invalid_plan_duration",
            SubscriptionError::InvalidPlanPrice { .. } => "invalid_plan_price",
            SubscriptionError::Repository(_) => "repository_unavailable",
            SubscriptionError::Timeout(_) => "timeout",
            SubscriptionError::Internal(_) => "internal",
        }
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        SubscriptionError::NotFound(what.into())
    }

    pub(crate) fn forbidden(why: impl Into<String>) -> Self {
        SubscriptionError::Forbidden(why.into())
    }

    pub(crate) fn invalid(why: impl Into<String>) -> Self {
        SubscriptionError::InvalidInput(why.into())
    }
}

impl From<RepositoryError> for SubscriptionError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict => SubscriptionError::Conflict(value.to_string()),
            RepositoryError::NotFound => SubscriptionError::NotFound("record".to_string()),
            RepositoryError::Unavailable(_) => SubscriptionError::Repository(value),
        }
    }
}

impl From<InvalidIdentifier> for SubscriptionError {
    fn from(value: InvalidIdentifier) -> Self {
        SubscriptionError::InvalidInput(value.to_string())
    }
}

impl IntoResponse for SubscriptionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

//! Lifecycle of subscription requests: pending to approved or rejected.
//!
//! Every reviewer action goes through [`RequestRepository::apply_review`], a single
//! conditional update. Only the write that actually moves a request out of `pending`
//! triggers subscription creation and commission posting, so concurrent reviewers can
//! never materialize the same request twice.

mod policy;

pub use policy::{AnyReviewerPolicy, ApprovalPolicy, ApprovalPolicyKind, UnanimousPolicy};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::catalog::PlanCatalog;
use super::clock::Clock;
use super::commission::{CommissionEngine, CommissionOutcome};
use super::directory::{self, EntityDirectory};
use super::domain::{
    ApprovalShape, Decision, Plan, PlanId, RequestId, RequestStatus, ReviewerRole, Subscription,
    SubscriptionId, SubscriptionRequest, SubscriptionStatus,
};
use super::error::SubscriptionError;
use super::repository::{
    Notification, NotificationSender, RequestRepository, Review, StatusTransition,
};
use super::subscription::SubscriptionFactory;

/// Compact view of a freshly created subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionSummary {
    pub subscription_id: SubscriptionId,
    pub plan_id: PlanId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
}

impl From<&Subscription> for SubscriptionSummary {
    fn from(subscription: &Subscription) -> Self {
        Self {
            subscription_id: subscription.id.clone(),
            plan_id: subscription.plan_id.clone(),
            start_date: subscription.start_date,
            end_date: subscription.end_date,
            status: subscription.status,
        }
    }
}

/// Everything a reviewer action produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub request_id: RequestId,
    pub status: RequestStatus,
    /// False when the action only recorded a reviewer flag.
    pub status_changed: bool,
    pub admin_approved: Option<bool>,
    pub manager_approved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<CommissionOutcome>,
}

pub struct ApprovalStateMachine {
    requests: Arc<dyn RequestRepository>,
    plans: Arc<dyn PlanCatalog>,
    directory: Arc<dyn EntityDirectory>,
    factory: SubscriptionFactory,
    commissions: CommissionEngine,
    notifier: Arc<dyn NotificationSender>,
    policy: Box<dyn ApprovalPolicy>,
    clock: Arc<dyn Clock>,
}

impl ApprovalStateMachine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        plans: Arc<dyn PlanCatalog>,
        directory: Arc<dyn EntityDirectory>,
        factory: SubscriptionFactory,
        commissions: CommissionEngine,
        notifier: Arc<dyn NotificationSender>,
        policy: Box<dyn ApprovalPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            requests,
            plans,
            directory,
            factory,
            commissions,
            notifier,
            policy,
            clock,
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn resolve(
        &self,
        request_id: &RequestId,
        role: ReviewerRole,
        decision: Decision,
        note: Option<String>,
    ) -> Result<Resolution, SubscriptionError> {
        let current = self.requests.fetch(request_id)?.ok_or_else(|| {
            SubscriptionError::not_found(format!("subscription request {request_id}"))
        })?;

        let shape = current.entity.kind.approval_shape();
        if shape == ApprovalShape::Dual && role == ReviewerRole::SalesManager {
            return Err(SubscriptionError::forbidden(
                "wholesaler requests are reviewed by admin and manager only",
            ));
        }

        let guard = policy::guard_for(shape, role);
        let already_processed = (guard.require_pending && !current.is_pending())
            || matches!(current.flag(role), Some(Some(_)) if shape == ApprovalShape::Dual);
        if already_processed {
            return Err(SubscriptionError::AlreadyProcessed(request_id.clone()));
        }

        let transition = if current.is_pending() {
            self.policy.transition(shape, decision)
        } else {
            StatusTransition::Unchanged
        };

        // Plan problems must abort before the first durable write.
        let now = self.clock.now();
        let plan = if decision == Decision::Approved && transition != StatusTransition::Unchanged {
            let plan = self.load_plan(&current.plan_id)?;
            SubscriptionFactory::validate_plan(&plan, now)?;
            Some(plan)
        } else {
            None
        };

        let review = Review {
            role,
            approved: decision == Decision::Approved,
            transition,
            note: note.filter(|note| !note.trim().is_empty()),
            at: now,
        };
        let applied = self
            .requests
            .apply_review(request_id, guard, &review)?
            .ok_or_else(|| SubscriptionError::AlreadyProcessed(request_id.clone()))?;

        let request = applied.request;
        info!(
            request_id = %request.id,
            role = role.label(),
            ?decision,
            status = request.status.label(),
            status_changed = applied.status_changed,
            policy = self.policy.name(),
            "review recorded"
        );

        let mut resolution = Resolution {
            request_id: request.id.clone(),
            status: request.status,
            status_changed: applied.status_changed,
            admin_approved: request.admin_approved,
            manager_approved: request.manager_approved,
            subscription: None,
            commission: None,
        };

        if !applied.status_changed {
            return Ok(resolution);
        }

        match request.status {
            RequestStatus::Approved => {
                let plan = match plan {
                    Some(plan) => plan,
                    None => self.load_plan(&request.plan_id)?,
                };
                let (subscription, outcome) = self.materialize(&request, &plan, now)?;
                resolution.subscription = Some(subscription);
                resolution.commission = Some(outcome);
            }
            RequestStatus::Rejected => self.on_rejected(&request),
            RequestStatus::Pending => {}
        }

        Ok(resolution)
    }

    fn load_plan(&self, plan_id: &PlanId) -> Result<Plan, SubscriptionError> {
        self.plans
            .plan(plan_id)?
            .ok_or_else(|| SubscriptionError::not_found(format!("plan {plan_id}")))
    }

    /// Subscription creation must succeed; commission posting may not block it.
    fn materialize(
        &self,
        request: &SubscriptionRequest,
        plan: &Plan,
        now: DateTime<Utc>,
    ) -> Result<(SubscriptionSummary, CommissionOutcome), SubscriptionError> {
        let subscription = self.factory.create(request, plan, now).map_err(|error| {
            error!(request_id = %request.id, %error, "approved request has no subscription");
            error
        })?;

        let owner = directory::resolve(self.directory.as_ref(), &request.entity).unwrap_or_else(
            |error| {
                warn!(request_id = %request.id, %error, "owner lookup failed");
                None
            },
        );
        let outcome = self.commissions.post(
            &subscription,
            plan,
            owner.as_ref().map(|resolved| &resolved.owner),
            now,
        );

        if let Some(resolved) = &owner {
            self.notify(
                resolved.owner.contact(),
                request,
                "Subscription approved",
                format!(
                    "Your {} subscription for {} is active until {}.",
                    plan.title,
                    resolved.display_name(),
                    subscription.end_date.format("%Y-%m-%d")
                ),
            );
        }

        Ok((SubscriptionSummary::from(&subscription), outcome))
    }

    fn on_rejected(&self, request: &SubscriptionRequest) {
        self.factory.deactivate(&request.entity);
        let contact = match directory::resolve(self.directory.as_ref(), &request.entity) {
            Ok(resolved) => resolved.and_then(|resolved| resolved.owner.contact().map(str::to_string)),
            Err(error) => {
                warn!(request_id = %request.id, %error, "owner lookup failed");
                None
            }
        };
        let reason = request
            .reviewer_note
            .as_deref()
            .unwrap_or("no reason given");
        self.notify(
            contact.as_deref(),
            request,
            "Subscription request rejected",
            format!("Your subscription request was rejected: {reason}"),
        );
    }

    fn notify(
        &self,
        recipient: Option<&str>,
        request: &SubscriptionRequest,
        subject: &str,
        body: String,
    ) {
        let Some(recipient) = recipient else {
            warn!(request_id = %request.id, "no contact on file; notification dropped");
            return;
        };
        let notification = Notification {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body,
        };
        if let Err(error) = self.notifier.send(&notification) {
            warn!(request_id = %request.id, %error, "notification failed");
        }
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use super::catalog::PlanDuration;
use super::directory::EntityDirectory;
use super::domain::{
    EntityRef, Plan, PlanId, Subscription, SubscriptionId, SubscriptionRequest,
    SubscriptionStatus, VisibleStatus,
};
use super::error::SubscriptionError;
use super::repository::SubscriptionRepository;

/// Materializes subscriptions for approved requests and flips entity visibility.
pub struct SubscriptionFactory {
    subscriptions: Arc<dyn SubscriptionRepository>,
    directory: Arc<dyn EntityDirectory>,
}

impl SubscriptionFactory {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        directory: Arc<dyn EntityDirectory>,
    ) -> Self {
        Self {
            subscriptions,
            directory,
        }
    }

    /// End of the active window starting at `start`.
    pub fn end_date(plan: &Plan, start: DateTime<Utc>) -> Result<DateTime<Utc>, SubscriptionError> {
        let invalid = || SubscriptionError::InvalidPlanDuration {
            plan_id: plan.id.clone(),
            duration: plan.duration,
        };
        PlanDuration::from_months(plan.duration)
            .ok_or_else(invalid)?
            .end_after(start)
            .ok_or_else(invalid)
    }

    /// Rejects catalog rows that cannot be sold: negative prices or unsupported
    /// durations. Returns the end date for a window starting at `start`.
    pub fn validate_plan(
        plan: &Plan,
        start: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SubscriptionError> {
        if plan.price < Decimal::ZERO {
            return Err(SubscriptionError::InvalidPlanPrice {
                plan_id: plan.id.clone(),
                price: plan.price,
            });
        }
        Self::end_date(plan, start)
    }

    /// Persists an active subscription and marks the owning entity active.
    ///
    /// Performs no duplicate check; callers must only invoke this for the write
    /// that moved the request out of `pending`.
    pub fn create(
        &self,
        request: &SubscriptionRequest,
        plan: &Plan,
        start: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let end_date = Self::validate_plan(plan, start)?;
        let subscription = Subscription {
            id: SubscriptionId::generate(),
            request_id: request.id.clone(),
            entity: request.entity.clone(),
            plan_id: plan.id.clone(),
            start_date: start,
            end_date,
            status: SubscriptionStatus::Active,
            auto_renew: false,
            created_at: start,
            updated_at: start,
        };

        let stored = self.subscriptions.insert(subscription)?;
        info!(
            subscription_id = %stored.id,
            request_id = %request.id,
            entity = %stored.entity,
            end_date = %stored.end_date,
            "subscription created"
        );

        self.set_visibility(&stored.entity, VisibleStatus::Active);
        Ok(stored)
    }

    pub fn deactivate(&self, entity: &EntityRef) {
        self.set_visibility(entity, VisibleStatus::Inactive);
    }

    fn set_visibility(&self, entity: &EntityRef, status: VisibleStatus) {
        if let Err(error) = self.directory.set_status(entity, status) {
            warn!(%entity, ?status, %error, "unable to update entity visibility");
        }
    }
}

/// Time left on an entity's active subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemainingTime {
    pub has_active_subscription: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<SubscriptionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<PlanId>,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub formatted: String,
    pub percentage_used: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

impl RemainingTime {
    pub fn none() -> Self {
        Self {
            has_active_subscription: false,
            subscription_id: None,
            plan_id: None,
            days: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
            formatted: "0d 0h 0m 0s".to_string(),
            percentage_used: 0.0,
            start_date: None,
            end_date: None,
        }
    }

    pub fn of(subscription: &Subscription, now: DateTime<Utc>) -> Self {
        if !subscription.is_active_at(now) {
            return Self::none();
        }

        let remaining = (subscription.end_date - now).num_seconds().max(0);
        let days = remaining / 86_400;
        let hours = (remaining % 86_400) / 3_600;
        let minutes = (remaining % 3_600) / 60;
        let seconds = remaining % 60;

        let total = (subscription.end_date - subscription.start_date).num_seconds();
        let used = (now - subscription.start_date).num_seconds().clamp(0, total.max(0));
        let percentage_used = if total > 0 {
            ((used as f64 / total as f64) * 1000.0).round() / 10.0
        } else {
            100.0
        };

        Self {
            has_active_subscription: true,
            subscription_id: Some(subscription.id.clone()),
            plan_id: Some(subscription.plan_id.clone()),
            days,
            hours,
            minutes,
            seconds,
            formatted: format!("{days}d {hours}h {minutes}m {seconds}s"),
            percentage_used,
            start_date: Some(subscription.start_date),
            end_date: Some(subscription.end_date),
        }
    }
}

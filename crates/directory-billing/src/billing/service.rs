use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::approval::{ApprovalPolicyKind, ApprovalStateMachine, Resolution};
use super::catalog::{self, PlanCatalog};
use super::clock::Clock;
use super::commission::CommissionEngine;
use super::directory::{self, EntityDirectory, ResolvedEntity};
use super::domain::{
    Claims, Decision, EntityKind, EntityRef, Plan, PlanId, ProofUpload, RequestId,
    RequestStatus, ReviewerRole, Subscription, SubscriptionRequest, VisibleStatus,
};
use super::error::SubscriptionError;
use super::ledger::WalletLedger;
use super::memory::InMemoryStore;
use super::repository::{
    CommissionRepository, FileStore, Notification, NotificationSender, RequestRepository,
    SubscriptionRepository, WalletStore,
};
use super::subscription::{RemainingTime, SubscriptionFactory};
use crate::config::BillingConfig;

const MAX_PENDING_PAGE: usize = 200;

/// Storage and collaborator handles injected into the workflow.
#[derive(Clone)]
pub struct BillingStores {
    pub requests: Arc<dyn RequestRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub plans: Arc<dyn PlanCatalog>,
    pub directory: Arc<dyn EntityDirectory>,
    pub commissions: Arc<dyn CommissionRepository>,
    pub wallet: Arc<dyn WalletStore>,
    pub notifier: Arc<dyn NotificationSender>,
    pub files: Arc<dyn FileStore>,
}

impl BillingStores {
    /// Backs every storage trait with the same in-memory store.
    pub fn in_memory(
        store: Arc<InMemoryStore>,
        notifier: Arc<dyn NotificationSender>,
        files: Arc<dyn FileStore>,
    ) -> Self {
        Self {
            requests: store.clone(),
            subscriptions: store.clone(),
            plans: store.clone(),
            directory: store.clone(),
            commissions: store.clone(),
            wallet: store,
            notifier,
            files,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub approval_policy: ApprovalPolicyKind,
    pub admin_email: Option<String>,
    pub manager_email: Option<String>,
    pub proof_directory: String,
    pub max_proof_bytes: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from(&BillingConfig::default())
    }
}

impl From<&BillingConfig> for ServiceSettings {
    fn from(config: &BillingConfig) -> Self {
        Self {
            approval_policy: config.approval_policy,
            admin_email: config.admin_email.clone(),
            manager_email: config.manager_email.clone(),
            proof_directory: config.proof_directory.clone(),
            max_proof_bytes: config.max_proof_bytes,
        }
    }
}

/// Self-service request submitted by an entity owner.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewRequest {
    pub entity: EntityRef,
    pub plan_id: PlanId,
    #[serde(default)]
    pub proof: Option<ProofUpload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestReceipt {
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_path: Option<String>,
}

/// Latest request and live subscription for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSnapshot {
    pub entity: EntityRef,
    pub entity_status: VisibleStatus,
    pub request: Option<SubscriptionRequest>,
    pub subscription: Option<Subscription>,
    pub has_active_subscription: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentSubscription {
    pub subscription: Subscription,
    pub plan: Plan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySummary {
    pub id: String,
    pub business_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSummary {
    pub id: PlanId,
    pub title: String,
    pub price: Decimal,
    pub duration: u8,
}

/// A pending request enriched for reviewer dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRequestView {
    pub request_id: RequestId,
    pub entity_kind: EntityKind,
    pub entity: EntitySummary,
    pub plan: PlanSummary,
    pub requested_at: DateTime<Utc>,
    pub admin_approved: Option<bool>,
    pub manager_approved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_path: Option<String>,
}

/// Entry point composing the six workflow components behind authorization checks.
pub struct SubscriptionService {
    stores: BillingStores,
    settings: ServiceSettings,
    machine: ApprovalStateMachine,
    ledger: WalletLedger,
    clock: Arc<dyn Clock>,
}

impl SubscriptionService {
    pub fn new(stores: BillingStores, settings: ServiceSettings, clock: Arc<dyn Clock>) -> Self {
        let ledger = WalletLedger::new(stores.wallet.clone());
        let factory = SubscriptionFactory::new(stores.subscriptions.clone(), stores.directory.clone());
        let commissions = CommissionEngine::new(
            stores.directory.clone(),
            stores.commissions.clone(),
            ledger.clone(),
        );
        let machine = ApprovalStateMachine::new(
            stores.requests.clone(),
            stores.plans.clone(),
            stores.directory.clone(),
            factory,
            commissions,
            stores.notifier.clone(),
            settings.approval_policy.build(),
            clock.clone(),
        );

        Self {
            stores,
            settings,
            machine,
            ledger,
            clock,
        }
    }

    pub fn ledger(&self) -> &WalletLedger {
        &self.ledger
    }

    pub fn approval_policy(&self) -> &'static str {
        self.machine.policy_name()
    }

    pub fn create_request(
        &self,
        claims: &Claims,
        request: NewRequest,
    ) -> Result<RequestReceipt, SubscriptionError> {
        let resolved = self.resolve_entity(&request.entity)?;
        self.require_owner(claims, &resolved)?;

        let plan = self
            .stores
            .plans
            .plan(&request.plan_id)?
            .ok_or_else(|| SubscriptionError::not_found(format!("plan {}", request.plan_id)))?;
        if plan.price < Decimal::ZERO {
            return Err(SubscriptionError::InvalidPlanPrice {
                plan_id: plan.id.clone(),
                price: plan.price,
            });
        }
        if !plan.is_active {
            return Err(SubscriptionError::invalid(format!("plan {} is not active", plan.id)));
        }
        if plan.entity_kind != request.entity.kind {
            return Err(SubscriptionError::invalid(format!(
                "plan {} is not offered to {}",
                plan.id,
                request.entity.kind.label()
            )));
        }

        let now = self.clock.now();
        if let Some(latest) = self.stores.requests.latest_for_entity(&request.entity)? {
            if latest.is_pending() {
                return Err(SubscriptionError::Conflict(format!(
                    "request {} is still pending",
                    latest.id
                )));
            }
        }
        if let Some(active) = self.stores.subscriptions.active_for(&request.entity, now)? {
            return Err(SubscriptionError::Conflict(format!(
                "subscription {} is active until {}",
                active.id, active.end_date
            )));
        }

        let proof_path = match &request.proof {
            Some(upload) => {
                self.validate_proof(upload)?;
                let path = self
                    .stores
                    .files
                    .save(upload, &self.settings.proof_directory)
                    .map_err(|error| SubscriptionError::Internal(error.to_string()))?;
                Some(path)
            }
            None => None,
        };

        let pending = SubscriptionRequest::pending(
            request.entity.clone(),
            plan.id.clone(),
            now,
            proof_path.clone(),
        );
        let stored = match self.stores.requests.insert(pending) {
            Ok(stored) => stored,
            Err(error) => {
                if let Some(path) = &proof_path {
                    if let Err(cleanup) = self.stores.files.remove(path) {
                        warn!(%path, error = %cleanup, "unable to remove orphaned proof");
                    }
                }
                return Err(error.into());
            }
        };

        info!(
            request_id = %stored.id,
            entity = %stored.entity,
            plan_id = %stored.plan_id,
            "subscription request created"
        );
        self.notify_reviewers(&stored, &resolved, &plan);

        Ok(RequestReceipt {
            request_id: stored.id,
            status: stored.status,
            requested_at: stored.requested_at,
            proof_path: stored.proof_path,
        })
    }

    pub fn resolve(
        &self,
        claims: &Claims,
        request_id: &RequestId,
        decision: Decision,
        note: Option<String>,
    ) -> Result<Resolution, SubscriptionError> {
        let role = Self::reviewer_role(claims)?;
        self.machine.resolve(request_id, role, decision, note)
    }

    pub fn status(
        &self,
        claims: &Claims,
        entity: &EntityRef,
    ) -> Result<RequestSnapshot, SubscriptionError> {
        let resolved = self.resolve_entity(entity)?;
        self.require_reader(claims, &resolved)?;

        let now = self.clock.now();
        let request = self.stores.requests.latest_for_entity(entity)?;
        let subscription = self.stores.subscriptions.active_for(entity, now)?;
        Ok(RequestSnapshot {
            entity: entity.clone(),
            entity_status: resolved.status(),
            has_active_subscription: subscription.is_some(),
            request,
            subscription,
        })
    }

    pub fn cancel(
        &self,
        claims: &Claims,
        entity: &EntityRef,
    ) -> Result<Subscription, SubscriptionError> {
        let resolved = self.resolve_entity(entity)?;
        self.require_owner(claims, &resolved)?;

        let now = self.clock.now();
        let cancelled = self
            .stores
            .subscriptions
            .cancel_active(entity, now)?
            .ok_or_else(|| SubscriptionError::not_found(format!("active subscription for {entity}")))?;

        info!(subscription_id = %cancelled.id, %entity, "subscription cancelled");
        if let Some(contact) = resolved.owner.contact() {
            let notification = Notification {
                recipient: contact.to_string(),
                subject: "Subscription cancelled".to_string(),
                body: format!(
                    "The subscription for {} has been cancelled and will not renew.",
                    resolved.display_name()
                ),
            };
            if let Err(error) = self.stores.notifier.send(&notification) {
                warn!(subscription_id = %cancelled.id, %error, "cancellation notice failed");
            }
        }

        Ok(cancelled)
    }

    pub fn remaining_time(
        &self,
        claims: &Claims,
        entity: &EntityRef,
    ) -> Result<RemainingTime, SubscriptionError> {
        let resolved = self.resolve_entity(entity)?;
        self.require_reader(claims, &resolved)?;

        let now = self.clock.now();
        Ok(match self.stores.subscriptions.active_for(entity, now)? {
            Some(subscription) => RemainingTime::of(&subscription, now),
            None => RemainingTime::none(),
        })
    }

    pub fn current_subscription(
        &self,
        claims: &Claims,
        entity: &EntityRef,
    ) -> Result<Option<CurrentSubscription>, SubscriptionError> {
        let resolved = self.resolve_entity(entity)?;
        self.require_reader(claims, &resolved)?;

        let now = self.clock.now();
        let Some(subscription) = self.stores.subscriptions.active_for(entity, now)? else {
            return Ok(None);
        };
        let plan = self.stores.plans.plan(&subscription.plan_id)?.ok_or_else(|| {
            SubscriptionError::not_found(format!("plan {}", subscription.plan_id))
        })?;
        Ok(Some(CurrentSubscription { subscription, plan }))
    }

    pub fn pending_requests(
        &self,
        claims: &Claims,
        limit: usize,
    ) -> Result<Vec<PendingRequestView>, SubscriptionError> {
        Self::reviewer_role(claims)?;
        let limit = limit.clamp(1, MAX_PENDING_PAGE);

        let mut views = Vec::new();
        for request in self.stores.requests.pending(limit)? {
            let resolved = directory::resolve(self.stores.directory.as_ref(), &request.entity)?;
            let plan = self.stores.plans.plan(&request.plan_id)?;
            let (Some(resolved), Some(plan)) = (resolved, plan) else {
                warn!(request_id = %request.id, "pending request references missing entity or plan");
                continue;
            };
            views.push(PendingRequestView {
                request_id: request.id,
                entity_kind: request.entity.kind,
                entity: EntitySummary {
                    id: request.entity.id.to_string(),
                    business_name: resolved.owner.business_name.clone(),
                    branch_name: resolved.branch.as_ref().map(|branch| branch.name.clone()),
                    contact: resolved.owner.contact().map(str::to_string),
                },
                plan: PlanSummary {
                    id: plan.id,
                    title: plan.title,
                    price: plan.price,
                    duration: plan.duration,
                },
                requested_at: request.requested_at,
                admin_approved: request.admin_approved,
                manager_approved: request.manager_approved,
                proof_path: request.proof_path,
            });
        }
        Ok(views)
    }

    pub fn plans(&self, _claims: &Claims, kind: EntityKind) -> Result<Vec<Plan>, SubscriptionError> {
        Ok(catalog::active_plans(self.stores.plans.as_ref(), kind)?)
    }

    fn resolve_entity(&self, entity: &EntityRef) -> Result<ResolvedEntity, SubscriptionError> {
        directory::resolve(self.stores.directory.as_ref(), entity)?
            .ok_or_else(|| SubscriptionError::not_found(format!("entity {entity}")))
    }

    fn reviewer_role(claims: &Claims) -> Result<ReviewerRole, SubscriptionError> {
        claims
            .user_type
            .reviewer_role()
            .ok_or_else(|| SubscriptionError::forbidden("reviewer role required"))
    }

    fn require_owner(
        &self,
        claims: &Claims,
        resolved: &ResolvedEntity,
    ) -> Result<(), SubscriptionError> {
        if &claims.user_id == resolved.owner_user() {
            Ok(())
        } else {
            Err(SubscriptionError::forbidden("entity belongs to another account"))
        }
    }

    fn require_reader(
        &self,
        claims: &Claims,
        resolved: &ResolvedEntity,
    ) -> Result<(), SubscriptionError> {
        if claims.user_type.reviewer_role().is_some() {
            return Ok(());
        }
        self.require_owner(claims, resolved)
    }

    fn validate_proof(&self, upload: &ProofUpload) -> Result<(), SubscriptionError> {
        let is_image = upload
            .content_type
            .trim()
            .parse::<mime::Mime>()
            .map(|parsed| parsed.type_() == mime::IMAGE)
            .unwrap_or(false);
        if !is_image {
            return Err(SubscriptionError::invalid("payment proof must be an image"));
        }
        if upload.bytes.is_empty() {
            return Err(SubscriptionError::invalid("payment proof is empty"));
        }
        if upload.bytes.len() > self.settings.max_proof_bytes {
            return Err(SubscriptionError::invalid(format!(
                "payment proof exceeds {} bytes",
                self.settings.max_proof_bytes
            )));
        }
        Ok(())
    }

    fn notify_reviewers(&self, request: &SubscriptionRequest, resolved: &ResolvedEntity, plan: &Plan) {
        let recipients = [&self.settings.admin_email, &self.settings.manager_email];
        for recipient in recipients.into_iter().flatten() {
            let notification = Notification {
                recipient: recipient.clone(),
                subject: format!("New {} subscription request", request.entity.kind.label()),
                body: format!(
                    "{} requested the {} plan ({} for {} month(s)). Request {}.",
                    resolved.display_name(),
                    plan.title,
                    plan.price,
                    plan.duration,
                    request.id
                ),
            };
            if let Err(error) = self.stores.notifier.send(&notification) {
                warn!(request_id = %request.id, %recipient, %error, "reviewer notification failed");
            }
        }
    }
}

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::catalog::PlanCatalog;
use super::directory::EntityDirectory;
use super::domain::{
    Admin, AdminId, Commission, DirectoryEntity, EntityId, EntityKind, EntityRef, OwnerKind, Plan,
    PlanId, RequestId, RequestStatus, ReviewerRole, SalesManager, SalesManagerId, Salesperson,
    SalespersonId, Subscription, SubscriptionId, SubscriptionRequest, SubscriptionStatus,
    VisibleStatus, WalletBalance, WalletTransaction,
};
use super::fixture::DirectorySeed;
use super::repository::{
    AppliedReview, CommissionRepository, RepositoryError, RequestRepository, Review, ReviewGuard,
    StatusTransition, SubscriptionRepository, WalletStore,
};

#[derive(Debug, Default)]
struct StoreState {
    requests: Vec<SubscriptionRequest>,
    subscriptions: Vec<Subscription>,
    plans: HashMap<PlanId, Plan>,
    entities: Vec<DirectoryEntity>,
    salespersons: HashMap<SalespersonId, Salesperson>,
    sales_managers: HashMap<SalesManagerId, SalesManager>,
    admins: HashMap<AdminId, Admin>,
    commissions: Vec<Commission>,
    transactions: Vec<WalletTransaction>,
    balance: Option<WalletBalance>,
}

/// Document store kept in process memory behind a single lock.
///
/// Every trait method takes the lock once, so conditional updates such as
/// [`RequestRepository::apply_review`] are atomic with respect to each other.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DirectorySeed) -> Self {
        let state = StoreState {
            plans: seed
                .plans
                .into_iter()
                .map(|plan| (plan.id.clone(), plan))
                .collect(),
            entities: seed.entities,
            salespersons: seed
                .salespersons
                .into_iter()
                .map(|person| (person.id.clone(), person))
                .collect(),
            sales_managers: seed
                .sales_managers
                .into_iter()
                .map(|manager| (manager.id.clone(), manager))
                .collect(),
            admins: seed
                .admins
                .into_iter()
                .map(|admin| (admin.id.clone(), admin))
                .collect(),
            ..StoreState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }

    pub fn subscriptions(&self) -> Result<Vec<Subscription>, RepositoryError> {
        Ok(self.lock()?.subscriptions.clone())
    }

    pub fn entity_status(&self, entity: &EntityRef) -> Result<Option<VisibleStatus>, RepositoryError> {
        let state = self.lock()?;
        let owner_kind = entity.kind.owner_kind();
        let status = if entity.kind.is_branch() {
            state
                .entities
                .iter()
                .filter(|record| record.kind == owner_kind)
                .find_map(|record| record.branch(&entity.id).map(|branch| branch.status))
        } else {
            state
                .entities
                .iter()
                .find(|record| record.kind == owner_kind && record.id == entity.id)
                .map(|record| record.status)
        };
        Ok(status)
    }
}

impl RequestRepository for InMemoryStore {
    fn insert(
        &self,
        request: SubscriptionRequest,
    ) -> Result<SubscriptionRequest, RepositoryError> {
        let mut state = self.lock()?;
        let duplicate = state.requests.iter().any(|existing| {
            existing.id == request.id
                || (existing.entity == request.entity && existing.is_pending())
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        state.requests.push(request.clone());
        Ok(request)
    }

    fn fetch(&self, id: &RequestId) -> Result<Option<SubscriptionRequest>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.requests.iter().find(|request| &request.id == id).cloned())
    }

    fn latest_for_entity(
        &self,
        entity: &EntityRef,
    ) -> Result<Option<SubscriptionRequest>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .requests
            .iter()
            .filter(|request| &request.entity == entity)
            .max_by_key(|request| request.requested_at)
            .cloned())
    }

    fn pending(&self, limit: usize) -> Result<Vec<SubscriptionRequest>, RepositoryError> {
        let state = self.lock()?;
        let mut pending: Vec<SubscriptionRequest> = state
            .requests
            .iter()
            .filter(|request| request.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|request| request.requested_at);
        pending.truncate(limit);
        Ok(pending)
    }

    fn apply_review(
        &self,
        id: &RequestId,
        guard: ReviewGuard,
        review: &Review,
    ) -> Result<Option<AppliedReview>, RepositoryError> {
        let mut state = self.lock()?;
        let request = state
            .requests
            .iter_mut()
            .find(|request| &request.id == id)
            .ok_or(RepositoryError::NotFound)?;

        if guard.require_pending && !request.is_pending() {
            return Ok(None);
        }
        if let Some(role) = guard.require_unset_flag {
            if matches!(request.flag(role), Some(Some(_))) {
                return Ok(None);
            }
        }

        match review.role {
            ReviewerRole::Admin => request.admin_approved = Some(review.approved),
            ReviewerRole::Manager => request.manager_approved = Some(review.approved),
            ReviewerRole::SalesManager => {}
        }
        // Notes only land while the request is still open.
        if review.note.is_some() && request.is_pending() {
            request.reviewer_note = review.note.clone();
        }

        let target = match review.transition {
            StatusTransition::Unchanged => None,
            StatusTransition::Set(status) => Some(status),
            StatusTransition::ApproveWhenBothFlagged => {
                let both = request.admin_approved == Some(true)
                    && request.manager_approved == Some(true);
                both.then_some(RequestStatus::Approved)
            }
        };

        let mut status_changed = false;
        let target = target.filter(|status| *status != RequestStatus::Pending);
        if let Some(status) = target.filter(|_| request.is_pending()) {
            match status {
                RequestStatus::Approved => {
                    request.approved_by = Some(review.role);
                    request.approved_at = Some(review.at);
                }
                RequestStatus::Rejected => {
                    request.rejected_by = Some(review.role);
                    request.rejected_at = Some(review.at);
                }
                RequestStatus::Pending => {}
            }
            request.status = status;
            request.processed_at = Some(review.at);
            status_changed = true;
        }

        Ok(Some(AppliedReview {
            request: request.clone(),
            status_changed,
        }))
    }
}

impl SubscriptionRepository for InMemoryStore {
    fn insert(&self, subscription: Subscription) -> Result<Subscription, RepositoryError> {
        let mut state = self.lock()?;
        if state
            .subscriptions
            .iter()
            .any(|existing| existing.id == subscription.id)
        {
            return Err(RepositoryError::Conflict);
        }
        state.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    fn active_for(
        &self,
        entity: &EntityRef,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .subscriptions
            .iter()
            .filter(|subscription| &subscription.entity == entity && subscription.is_active_at(now))
            .max_by_key(|subscription| subscription.start_date)
            .cloned())
    }

    fn cancel_active(
        &self,
        entity: &EntityRef,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let mut state = self.lock()?;
        let Some(subscription) = state
            .subscriptions
            .iter_mut()
            .filter(|subscription| &subscription.entity == entity && subscription.is_active_at(now))
            .max_by_key(|subscription| subscription.start_date)
        else {
            return Ok(None);
        };
        subscription.status = SubscriptionStatus::Cancelled;
        subscription.auto_renew = false;
        subscription.updated_at = now;
        Ok(Some(subscription.clone()))
    }
}

impl PlanCatalog for InMemoryStore {
    fn plan(&self, id: &PlanId) -> Result<Option<Plan>, RepositoryError> {
        Ok(self.lock()?.plans.get(id).cloned())
    }

    fn plans_for(&self, kind: EntityKind) -> Result<Vec<Plan>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .plans
            .values()
            .filter(|plan| plan.entity_kind == kind)
            .cloned()
            .collect())
    }
}

impl EntityDirectory for InMemoryStore {
    fn entity(
        &self,
        kind: OwnerKind,
        id: &EntityId,
    ) -> Result<Option<DirectoryEntity>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .entities
            .iter()
            .find(|record| record.kind == kind && &record.id == id)
            .cloned())
    }

    fn entity_with_branch(
        &self,
        kind: OwnerKind,
        branch: &EntityId,
    ) -> Result<Option<DirectoryEntity>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .entities
            .iter()
            .find(|record| record.kind == kind && record.branch(branch).is_some())
            .cloned())
    }

    fn salesperson(&self, id: &SalespersonId) -> Result<Option<Salesperson>, RepositoryError> {
        Ok(self.lock()?.salespersons.get(id).cloned())
    }

    fn sales_manager(
        &self,
        id: &SalesManagerId,
    ) -> Result<Option<SalesManager>, RepositoryError> {
        Ok(self.lock()?.sales_managers.get(id).cloned())
    }

    fn admin(&self, id: &AdminId) -> Result<Option<Admin>, RepositoryError> {
        Ok(self.lock()?.admins.get(id).cloned())
    }

    fn set_status(
        &self,
        entity: &EntityRef,
        status: VisibleStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let owner_kind = entity.kind.owner_kind();
        let slot = if entity.kind.is_branch() {
            state
                .entities
                .iter_mut()
                .filter(|record| record.kind == owner_kind)
                .find_map(|record| {
                    record
                        .branches
                        .iter_mut()
                        .find(|branch| branch.id == entity.id)
                        .map(|branch| &mut branch.status)
                })
        } else {
            state
                .entities
                .iter_mut()
                .find(|record| record.kind == owner_kind && record.id == entity.id)
                .map(|record| &mut record.status)
        };

        match slot {
            Some(current) => {
                *current = status;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}

impl CommissionRepository for InMemoryStore {
    fn insert(&self, commission: Commission) -> Result<Commission, RepositoryError> {
        let mut state = self.lock()?;
        if state
            .commissions
            .iter()
            .any(|existing| existing.subscription_id == commission.subscription_id)
        {
            return Err(RepositoryError::Conflict);
        }
        state.commissions.push(commission.clone());
        Ok(commission)
    }

    fn for_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Commission>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .commissions
            .iter()
            .find(|commission| &commission.subscription_id == id)
            .cloned())
    }

    fn all(&self) -> Result<Vec<Commission>, RepositoryError> {
        Ok(self.lock()?.commissions.clone())
    }
}

impl WalletStore for InMemoryStore {
    fn record_income(
        &self,
        transaction: WalletTransaction,
    ) -> Result<WalletBalance, RepositoryError> {
        let mut state = self.lock()?;
        let (amount, at) = (transaction.amount, transaction.updated_at);
        state.transactions.push(transaction);
        let balance = state.balance.get_or_insert_with(|| WalletBalance {
            total_income: Decimal::ZERO,
            total_withdrawal_income: Decimal::ZERO,
            total_commissions_paid: Decimal::ZERO,
            net_balance: Decimal::ZERO,
            last_updated: at,
        });
        balance.total_income += amount;
        balance.net_balance += amount;
        balance.last_updated = at;
        Ok(balance.clone())
    }

    fn balance(&self) -> Result<Option<WalletBalance>, RepositoryError> {
        Ok(self.lock()?.balance.clone())
    }

    fn transactions(&self) -> Result<Vec<WalletTransaction>, RepositoryError> {
        Ok(self.lock()?.transactions.clone())
    }
}

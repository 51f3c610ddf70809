use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Commission, EntityRef, ProofUpload, RequestId, RequestStatus, ReviewerRole, Subscription,
    SubscriptionId, SubscriptionRequest, WalletBalance, WalletTransaction,
};

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Preconditions checked atomically by [`RequestRepository::apply_review`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewGuard {
    pub require_pending: bool,
    pub require_unset_flag: Option<ReviewerRole>,
}

/// How a recorded review moves the request's overall status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// Record the reviewer's flag only.
    Unchanged,
    /// Move to the given terminal status if the request is still pending.
    Set(RequestStatus),
    /// Approve once both the admin and manager flags are true.
    ApproveWhenBothFlagged,
}

/// One reviewer action as written by the transition primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub role: ReviewerRole,
    pub approved: bool,
    pub transition: StatusTransition,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedReview {
    pub request: SubscriptionRequest,
    /// True only for the single write that moved the request out of `pending`.
    pub status_changed: bool,
}

/// Persistence for subscription requests.
pub trait RequestRepository: Send + Sync {
    /// Fails with [`RepositoryError::Conflict`] while the entity has a pending request.
    fn insert(&self, request: SubscriptionRequest)
        -> Result<SubscriptionRequest, RepositoryError>;
    fn fetch(&self, id: &RequestId) -> Result<Option<SubscriptionRequest>, RepositoryError>;
    fn latest_for_entity(
        &self,
        entity: &EntityRef,
    ) -> Result<Option<SubscriptionRequest>, RepositoryError>;
    /// Oldest first.
    fn pending(&self, limit: usize) -> Result<Vec<SubscriptionRequest>, RepositoryError>;
    /// Conditional update: returns `None` when the guard did not match.
    fn apply_review(
        &self,
        id: &RequestId,
        guard: ReviewGuard,
        review: &Review,
    ) -> Result<Option<AppliedReview>, RepositoryError>;
}

pub trait SubscriptionRepository: Send + Sync {
    fn insert(&self, subscription: Subscription) -> Result<Subscription, RepositoryError>;
    /// Active subscription whose end date is still in the future.
    fn active_for(
        &self,
        entity: &EntityRef,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, RepositoryError>;
    /// Marks the active subscription cancelled and clears auto-renew in one step.
    fn cancel_active(
        &self,
        entity: &EntityRef,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, RepositoryError>;
}

pub trait CommissionRepository: Send + Sync {
    /// One commission per subscription; a second insert is a conflict.
    fn insert(&self, commission: Commission) -> Result<Commission, RepositoryError>;
    fn for_subscription(&self, id: &SubscriptionId)
        -> Result<Option<Commission>, RepositoryError>;
    fn all(&self) -> Result<Vec<Commission>, RepositoryError>;
}

/// House ledger storage: an append-only log plus the cached balance.
pub trait WalletStore: Send + Sync {
    /// Appends the transaction and adds its amount to total income and net balance
    /// as one atomic step, creating the balance record on first use.
    fn record_income(
        &self,
        transaction: WalletTransaction,
    ) -> Result<WalletBalance, RepositoryError>;
    fn balance(&self) -> Result<Option<WalletBalance>, RepositoryError>;
    fn transactions(&self) -> Result<Vec<WalletTransaction>, RepositoryError>;
}

/// Outbound message handed to the delivery collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

pub trait NotificationSender: Send + Sync {
    fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error("unable to store file in {directory}: {reason}")]
    Write { directory: String, reason: String },
    #[error("unable to remove {path}: {reason}")]
    Remove { path: String, reason: String },
}

/// Storage for payment-proof artifacts.
pub trait FileStore: Send + Sync {
    /// Returns the stored path.
    fn save(&self, upload: &ProofUpload, directory: &str) -> Result<String, FileStoreError>;
    fn remove(&self, path: &str) -> Result<(), FileStoreError>;
}

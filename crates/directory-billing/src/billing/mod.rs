//! Subscription approval and commission workflow for the business directory.
//!
//! A directory entity requests a paid plan, reviewers approve or reject it, and an
//! approval materializes a time-bounded subscription whose price is split across the
//! entity's referral lineage or booked as house income.

pub mod approval;
pub mod catalog;
pub mod clock;
pub mod commission;
pub mod directory;
pub mod domain;
pub mod error;
pub mod fixture;
pub mod ledger;
pub mod memory;
pub mod repository;
pub mod router;
pub mod service;
pub mod subscription;

#[cfg(test)]
mod tests;

pub use approval::{
    AnyReviewerPolicy, ApprovalPolicy, ApprovalPolicyKind, ApprovalStateMachine, Resolution,
    SubscriptionSummary, UnanimousPolicy,
};
pub use catalog::{PlanCatalog, PlanDuration};
pub use clock::{Clock, FixedClock, SystemClock};
pub use commission::{CommissionEngine, CommissionOutcome, Lineage, SkipReason};
pub use directory::{EntityDirectory, ResolvedEntity};
pub use domain::{
    Claims, Commission, Decision, DirectoryEntity, EntityId, EntityKind, EntityRef, Plan, PlanId,
    ProofUpload, RequestId, RequestStatus, ReviewerRole, Subscription, SubscriptionRequest,
    SubscriptionStatus, UserId, UserType, VisibleStatus, WalletBalance, WalletTransaction,
};
pub use error::SubscriptionError;
pub use fixture::{DirectorySeed, FixtureError};
pub use ledger::{LedgerError, LedgerReconciliation, WalletLedger};
pub use memory::InMemoryStore;
pub use repository::{
    CommissionRepository, FileStore, FileStoreError, Notification, NotificationError,
    NotificationSender, RepositoryError, RequestRepository, SubscriptionRepository, WalletStore,
};
pub use router::{billing_router, BillingApi, USER_ID_HEADER, USER_TYPE_HEADER};
pub use service::{
    BillingStores, CurrentSubscription, NewRequest, PendingRequestView, RequestReceipt,
    RequestSnapshot, ServiceSettings, SubscriptionService,
};
pub use subscription::{RemainingTime, SubscriptionFactory};

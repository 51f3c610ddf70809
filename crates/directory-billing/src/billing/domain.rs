use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_ID_LEN: usize = 64;

/// Raised when an externally supplied identifier is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} '{value}'")]
pub struct InvalidIdentifier {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4().simple().to_string())
            }

            /// Validates an identifier received from a caller.
            pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
                let trimmed = raw.trim();
                let valid = !trimmed.is_empty()
                    && trimmed.len() <= MAX_ID_LEN
                    && trimmed
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
                if valid {
                    Ok(Self(trimmed.to_string()))
                } else {
                    Err(InvalidIdentifier {
                        kind: $label,
                        value: raw.to_string(),
                    })
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(RequestId, "request id");
opaque_id!(SubscriptionId, "subscription id");
opaque_id!(PlanId, "plan id");
opaque_id!(
    /// Identifies a directory entity or one of its nested branches.
    EntityId,
    "entity id"
);
opaque_id!(UserId, "user id");
opaque_id!(SalespersonId, "salesperson id");
opaque_id!(SalesManagerId, "sales manager id");
opaque_id!(AdminId, "admin id");
opaque_id!(CommissionId, "commission id");
opaque_id!(TransactionId, "transaction id");

/// Which business-entity type a request or subscription belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Wholesaler,
    WholesalerBranch,
    ServiceProvider,
    CompanyBranch,
}

impl EntityKind {
    pub const fn label(self) -> &'static str {
        match self {
            EntityKind::Wholesaler => "wholesaler",
            EntityKind::WholesalerBranch => "wholesaler_branch",
            EntityKind::ServiceProvider => "service_provider",
            EntityKind::CompanyBranch => "company_branch",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "wholesaler" => Some(EntityKind::Wholesaler),
            "wholesaler_branch" => Some(EntityKind::WholesalerBranch),
            "service_provider" | "serviceprovider" => Some(EntityKind::ServiceProvider),
            "company_branch" => Some(EntityKind::CompanyBranch),
            _ => None,
        }
    }

    /// Branch kinds are nested inside an owning directory entity.
    pub const fn is_branch(self) -> bool {
        matches!(self, EntityKind::WholesalerBranch | EntityKind::CompanyBranch)
    }

    pub const fn owner_kind(self) -> OwnerKind {
        match self {
            EntityKind::Wholesaler | EntityKind::WholesalerBranch => OwnerKind::Wholesaler,
            EntityKind::ServiceProvider => OwnerKind::ServiceProvider,
            EntityKind::CompanyBranch => OwnerKind::Company,
        }
    }

    pub const fn approval_shape(self) -> ApprovalShape {
        match self {
            EntityKind::Wholesaler => ApprovalShape::Dual,
            _ => ApprovalShape::Single,
        }
    }
}

/// Top-level directory record type that can own branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Wholesaler,
    ServiceProvider,
    Company,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalShape {
    Single,
    Dual,
}

/// Reference to the subscribing party.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.label(), self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" => Some(Decision::Approved),
            "rejected" | "reject" => Some(Decision::Rejected),
            _ => None,
        }
    }

    pub const fn resulting_status(self) -> RequestStatus {
        match self {
            Decision::Approved => RequestStatus::Approved,
            Decision::Rejected => RequestStatus::Rejected,
        }
    }
}

/// Roles allowed to act on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerRole {
    Admin,
    Manager,
    SalesManager,
}

impl ReviewerRole {
    pub const fn label(self) -> &'static str {
        match self {
            ReviewerRole::Admin => "admin",
            ReviewerRole::Manager => "manager",
            ReviewerRole::SalesManager => "sales_manager",
        }
    }
}

/// Caller type asserted by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserType {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "manager")]
    Manager,
    #[serde(rename = "sales_manager")]
    SalesManager,
    #[serde(rename = "wholesaler")]
    Wholesaler,
    #[serde(rename = "serviceProvider")]
    ServiceProvider,
    #[serde(rename = "company")]
    Company,
}

impl UserType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "admin" => Some(UserType::Admin),
            "manager" => Some(UserType::Manager),
            "sales_manager" => Some(UserType::SalesManager),
            "wholesaler" => Some(UserType::Wholesaler),
            "serviceProvider" | "service_provider" => Some(UserType::ServiceProvider),
            "company" => Some(UserType::Company),
            _ => None,
        }
    }

    pub const fn reviewer_role(self) -> Option<ReviewerRole> {
        match self {
            UserType::Admin => Some(ReviewerRole::Admin),
            UserType::Manager => Some(ReviewerRole::Manager),
            UserType::SalesManager => Some(ReviewerRole::SalesManager),
            UserType::Wholesaler | UserType::ServiceProvider | UserType::Company => None,
        }
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub user_type: UserType,
}

/// A party's request for a paid plan. Never deleted; retained for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub id: RequestId,
    pub entity: EntityRef,
    pub plan_id: PlanId,
    pub status: RequestStatus,
    pub admin_approved: Option<bool>,
    pub manager_approved: Option<bool>,
    pub approved_by: Option<ReviewerRole>,
    pub rejected_by: Option<ReviewerRole>,
    pub reviewer_note: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub proof_path: Option<String>,
}

impl SubscriptionRequest {
    pub fn pending(
        entity: EntityRef,
        plan_id: PlanId,
        requested_at: DateTime<Utc>,
        proof_path: Option<String>,
    ) -> Self {
        Self {
            id: RequestId::generate(),
            entity,
            plan_id,
            status: RequestStatus::Pending,
            admin_approved: None,
            manager_approved: None,
            approved_by: None,
            rejected_by: None,
            reviewer_note: None,
            requested_at,
            approved_at: None,
            rejected_at: None,
            processed_at: None,
            proof_path,
        }
    }

    /// The reviewer's own approval flag; `None` for roles without one.
    pub fn flag(&self, role: ReviewerRole) -> Option<Option<bool>> {
        match role {
            ReviewerRole::Admin => Some(self.admin_approved),
            ReviewerRole::Manager => Some(self.manager_approved),
            ReviewerRole::SalesManager => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

/// Time-bounded entitlement materialized from an approved request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub request_id: RequestId,
    pub entity: EntityRef,
    pub plan_id: PlanId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub auto_renew: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.end_date > now
    }
}

/// Immutable catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub title: String,
    pub price: Decimal,
    /// Months; only 1, 6 and 12 are valid.
    pub duration: u8,
    pub entity_kind: EntityKind,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Visibility flag on directory entities and branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibleStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default = "default_inactive")]
    pub status: VisibleStatus,
}

fn default_inactive() -> VisibleStatus {
    VisibleStatus::Inactive
}

/// Wholesaler, service provider or company record in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntity {
    pub id: EntityId,
    pub kind: OwnerKind,
    pub user_id: UserId,
    pub business_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Salesperson id, or the entity's own user id for self sign-ups.
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default = "default_inactive")]
    pub status: VisibleStatus,
    #[serde(default)]
    pub branches: Vec<Branch>,
}

/// How an entity entered the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Onboarding {
    SelfSignup,
    Salesperson(SalespersonId),
    Unattributed,
}

impl DirectoryEntity {
    pub fn onboarding(&self) -> Onboarding {
        match self.created_by.as_deref().map(str::trim) {
            Some(creator) if creator == self.user_id.as_str() => Onboarding::SelfSignup,
            Some(creator) if !creator.is_empty() => {
                Onboarding::Salesperson(SalespersonId(creator.to_string()))
            }
            _ => Onboarding::Unattributed,
        }
    }

    pub fn branch(&self, id: &EntityId) -> Option<&Branch> {
        self.branches.iter().find(|branch| &branch.id == id)
    }

    /// Preferred notification address: email, then phone.
    pub fn contact(&self) -> Option<&str> {
        self.email
            .as_deref()
            .or(self.phone.as_deref())
            .filter(|value| !value.trim().is_empty())
    }
}

/// Commission percentages are shares of the plan price and must lie in `0..=100`.
pub fn is_valid_percent(percent: Decimal) -> bool {
    (Decimal::ZERO..=Decimal::ONE_HUNDRED).contains(&percent)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Salesperson {
    pub id: SalespersonId,
    pub full_name: String,
    pub commission_percent: Decimal,
    #[serde(default)]
    pub sales_manager_id: Option<SalesManagerId>,
    #[serde(default)]
    pub created_by: Option<AdminId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesManager {
    pub id: SalesManagerId,
    pub full_name: String,
    pub commission_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admin {
    pub id: AdminId,
    pub email: String,
    #[serde(default)]
    pub commission_percent: Decimal,
}

/// Monetary split posted for one approved subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    pub id: CommissionId,
    pub subscription_id: SubscriptionId,
    pub entity_id: EntityId,
    pub plan_id: PlanId,
    pub plan_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<CommissionShare<AdminId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salesperson: Option<CommissionShare<SalespersonId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_manager: Option<CommissionShare<SalesManagerId>>,
    pub created_at: DateTime<Utc>,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

/// One tier's cut of the plan price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionShare<Id> {
    pub recipient: Id,
    pub amount: Decimal,
    pub percent: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionKind {
    SubscriptionIncome,
}

/// What a ledger entry was booked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub subscription_id: SubscriptionId,
    pub entity: EntityRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: TransactionId,
    pub kind: WalletTransactionKind,
    pub amount: Decimal,
    pub description: String,
    pub related: RelatedEntity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cached projection over the house ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub total_income: Decimal,
    pub total_withdrawal_income: Decimal,
    pub total_commissions_paid: Decimal,
    pub net_balance: Decimal,
    pub last_updated: DateTime<Utc>,
}

/// Payment proof supplied with a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofUpload {
    pub content_type: String,
    #[serde(default)]
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use super::directory::EntityDirectory;
use super::domain::{
    is_valid_percent, Admin, Commission, CommissionId, CommissionShare, DirectoryEntity,
    Onboarding, Plan, RelatedEntity, SalesManager, Salesperson, SalespersonId, Subscription,
    WalletTransaction,
};
use super::ledger::WalletLedger;
use super::repository::{CommissionRepository, RepositoryError};

/// Result of posting commission for one subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommissionOutcome {
    Posted(Commission),
    HouseIncome(WalletTransaction),
    Skipped { reason: SkipReason },
}

/// Why no commission or income was booked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// The entity carries no creator reference.
    NoLineage,
    OwnerNotFound,
    SalespersonNotFound(String),
    SalesManagerNotFound(String),
    AdminNotFound,
    /// A referrer's commission percent lies outside `0..=100`.
    InvalidPercent(String),
    Lookup(String),
    Storage(String),
    Ledger(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoLineage => write!(f, "entity has no creator lineage"),
            SkipReason::OwnerNotFound => write!(f, "owning entity not found"),
            SkipReason::SalespersonNotFound(id) => write!(f, "salesperson {id} not found"),
            SkipReason::SalesManagerNotFound(id) => write!(f, "sales manager {id} not found"),
            SkipReason::AdminNotFound => write!(f, "creating admin not found"),
            SkipReason::InvalidPercent(id) => {
                write!(f, "commission percent for {id} is outside 0..=100")
            }
            SkipReason::Lookup(error) => write!(f, "lineage lookup failed: {error}"),
            SkipReason::Storage(error) => write!(f, "commission write failed: {error}"),
            SkipReason::Ledger(error) => write!(f, "ledger write failed: {error}"),
        }
    }
}

/// Resolved referral chain for a created entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Lineage {
    SelfOnboarded,
    /// Salesperson reporting to the admin that created them; shares are complementary.
    ViaAdmin { salesperson: Salesperson, admin: Admin },
    /// Salesperson under a sales manager; shares are independent cuts of the price.
    ViaSalesManager {
        salesperson: Salesperson,
        sales_manager: SalesManager,
    },
}

/// Monetary split for a lineage, before it is stamped with ids.
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionSplit {
    pub salesperson: Option<(Decimal, Decimal)>,
    pub sales_manager: Option<(Decimal, Decimal)>,
    pub admin: Option<(Decimal, Decimal)>,
}

fn share(price: Decimal, percent: Decimal) -> Decimal {
    (price * percent / Decimal::ONE_HUNDRED).round_dp(2)
}

/// Pure split computation. Each tuple is `(amount, percent)`.
pub fn split(price: Decimal, lineage: &Lineage) -> CommissionSplit {
    match lineage {
        Lineage::SelfOnboarded => CommissionSplit {
            salesperson: None,
            sales_manager: None,
            admin: None,
        },
        Lineage::ViaAdmin { salesperson, .. } => {
            let salesperson_amount = share(price, salesperson.commission_percent);
            // Admin takes the remainder; the shares sum to the price exactly.
            CommissionSplit {
                salesperson: Some((salesperson_amount, salesperson.commission_percent)),
                sales_manager: None,
                admin: Some((
                    price - salesperson_amount,
                    Decimal::ONE_HUNDRED - salesperson.commission_percent,
                )),
            }
        }
        Lineage::ViaSalesManager {
            salesperson,
            sales_manager,
        } => CommissionSplit {
            salesperson: Some((
                share(price, salesperson.commission_percent),
                salesperson.commission_percent,
            )),
            sales_manager: Some((
                share(price, sales_manager.commission_percent),
                sales_manager.commission_percent,
            )),
            admin: None,
        },
    }
}

/// Walks `createdBy` into the referral hierarchy.
pub fn resolve_lineage(
    directory: &dyn EntityDirectory,
    entity: &DirectoryEntity,
) -> Result<Lineage, SkipReason> {
    let lookup = |error: RepositoryError| SkipReason::Lookup(error.to_string());

    let salesperson_id: SalespersonId = match entity.onboarding() {
        Onboarding::SelfSignup => return Ok(Lineage::SelfOnboarded),
        Onboarding::Unattributed => return Err(SkipReason::NoLineage),
        Onboarding::Salesperson(id) => id,
    };

    let salesperson = directory
        .salesperson(&salesperson_id)
        .map_err(lookup)?
        .ok_or_else(|| SkipReason::SalespersonNotFound(salesperson_id.to_string()))?;
    if !is_valid_percent(salesperson.commission_percent) {
        return Err(SkipReason::InvalidPercent(salesperson.id.to_string()));
    }

    if let Some(manager_id) = salesperson.sales_manager_id.clone() {
        let sales_manager = directory
            .sales_manager(&manager_id)
            .map_err(lookup)?
            .ok_or_else(|| SkipReason::SalesManagerNotFound(manager_id.to_string()))?;
        if !is_valid_percent(sales_manager.commission_percent) {
            return Err(SkipReason::InvalidPercent(sales_manager.id.to_string()));
        }
        return Ok(Lineage::ViaSalesManager {
            salesperson,
            sales_manager,
        });
    }

    let admin_id = salesperson.created_by.clone().ok_or(SkipReason::AdminNotFound)?;
    let admin = directory
        .admin(&admin_id)
        .map_err(lookup)?
        .ok_or(SkipReason::AdminNotFound)?;
    Ok(Lineage::ViaAdmin { salesperson, admin })
}

/// Posts commission shares, or house income for self-onboarded entities.
///
/// Never fails: any lookup or write problem becomes [`CommissionOutcome::Skipped`].
pub struct CommissionEngine {
    directory: Arc<dyn EntityDirectory>,
    commissions: Arc<dyn CommissionRepository>,
    ledger: WalletLedger,
}

impl CommissionEngine {
    pub fn new(
        directory: Arc<dyn EntityDirectory>,
        commissions: Arc<dyn CommissionRepository>,
        ledger: WalletLedger,
    ) -> Self {
        Self {
            directory,
            commissions,
            ledger,
        }
    }

    pub fn post(
        &self,
        subscription: &Subscription,
        plan: &Plan,
        owner: Option<&DirectoryEntity>,
        now: DateTime<Utc>,
    ) -> CommissionOutcome {
        let outcome = match owner {
            Some(owner) => self.post_for(subscription, plan, owner, now),
            None => CommissionOutcome::Skipped {
                reason: SkipReason::OwnerNotFound,
            },
        };

        if let CommissionOutcome::Skipped { reason } = &outcome {
            warn!(
                subscription_id = %subscription.id,
                plan_id = %plan.id,
                %reason,
                "commission skipped"
            );
        }
        outcome
    }

    fn post_for(
        &self,
        subscription: &Subscription,
        plan: &Plan,
        owner: &DirectoryEntity,
        now: DateTime<Utc>,
    ) -> CommissionOutcome {
        let lineage = match resolve_lineage(self.directory.as_ref(), owner) {
            Ok(lineage) => lineage,
            Err(reason) => return CommissionOutcome::Skipped { reason },
        };

        if lineage == Lineage::SelfOnboarded {
            let related = RelatedEntity {
                subscription_id: subscription.id.clone(),
                entity: subscription.entity.clone(),
            };
            let description = format!(
                "{} subscription for {}",
                plan.title, owner.business_name
            );
            return match self.ledger.record_income(plan.price, description, related, now) {
                Ok(transaction) => CommissionOutcome::HouseIncome(transaction),
                Err(error) => CommissionOutcome::Skipped {
                    reason: SkipReason::Ledger(error.to_string()),
                },
            };
        }

        let amounts = split(plan.price, &lineage);
        let (salesperson_id, admin_id, manager_id) = match &lineage {
            Lineage::ViaAdmin { salesperson, admin } => {
                (salesperson.id.clone(), Some(admin.id.clone()), None)
            }
            Lineage::ViaSalesManager {
                salesperson,
                sales_manager,
            } => (salesperson.id.clone(), None, Some(sales_manager.id.clone())),
            Lineage::SelfOnboarded => {
                return CommissionOutcome::Skipped {
                    reason: SkipReason::NoLineage,
                }
            }
        };

        let commission = Commission {
            id: CommissionId::generate(),
            subscription_id: subscription.id.clone(),
            entity_id: subscription.entity.id.clone(),
            plan_id: plan.id.clone(),
            plan_price: plan.price,
            admin: admin_id.zip(amounts.admin).map(|(recipient, (amount, percent))| {
                CommissionShare {
                    recipient,
                    amount,
                    percent,
                }
            }),
            salesperson: amounts.salesperson.map(|(amount, percent)| CommissionShare {
                recipient: salesperson_id,
                amount,
                percent,
            }),
            sales_manager: manager_id.zip(amounts.sales_manager).map(
                |(recipient, (amount, percent))| CommissionShare {
                    recipient,
                    amount,
                    percent,
                },
            ),
            created_at: now,
            paid: false,
            paid_at: None,
        };

        match self.commissions.insert(commission) {
            Ok(stored) => {
                info!(
                    commission_id = %stored.id,
                    subscription_id = %stored.subscription_id,
                    plan_price = %stored.plan_price,
                    "commission posted"
                );
                CommissionOutcome::Posted(stored)
            }
            Err(error) => CommissionOutcome::Skipped {
                reason: SkipReason::Storage(error.to_string()),
            },
        }
    }
}

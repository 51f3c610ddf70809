use crate::infra::{built_in_seed, parse_date, InMemoryOutbox, LocalFileStore};
use chrono::{Duration, NaiveDate, Utc};
use clap::Args;
use directory_billing::billing::{
    ApprovalPolicyKind, BillingStores, Claims, CommissionOutcome, Decision, EntityId, EntityKind,
    EntityRef, FixedClock, InMemoryStore, NewRequest, PlanId, Resolution, ServiceSettings,
    SubscriptionError, SubscriptionService, UserId, UserType,
};
use directory_billing::error::AppError;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the requests are filed (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) start: Option<NaiveDate>,
    /// Days to fast-forward before reporting remaining time.
    #[arg(long, default_value_t = 30)]
    pub(crate) elapsed_days: i64,
    /// Require both reviewers on wholesaler requests.
    #[arg(long)]
    pub(crate) unanimous: bool,
}

fn claims(user: &str, user_type: UserType) -> Claims {
    Claims {
        user_id: UserId(user.to_string()),
        user_type,
    }
}

fn entity(kind: EntityKind, id: &str) -> EntityRef {
    EntityRef::new(kind, EntityId(id.to_string()))
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        start,
        elapsed_days,
        unanimous,
    } = args;

    let start = start
        .and_then(|date| date.and_hms_opt(9, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now);
    let clock = Arc::new(FixedClock::new(start));
    let outbox = InMemoryOutbox::default();
    let store = Arc::new(InMemoryStore::from_seed(built_in_seed()?));
    let stores = BillingStores::in_memory(store, Arc::new(outbox.clone()), Arc::new(LocalFileStore));
    let settings = ServiceSettings {
        approval_policy: if unanimous {
            ApprovalPolicyKind::Unanimous
        } else {
            ApprovalPolicyKind::AnyReviewer
        },
        admin_email: Some("admin@example.com".to_string()),
        manager_email: Some("manager@example.com".to_string()),
        ..ServiceSettings::default()
    };
    let service = SubscriptionService::new(stores, settings, clock.clone());

    println!("Directory billing demo ({} policy)", service.approval_policy());
    println!("Filed at {}", start.format("%Y-%m-%d %H:%M UTC"));

    let admin = claims("admin-root", UserType::Admin);
    let manager = claims("manager-1", UserType::Manager);

    println!("\nService provider plans");
    let provider = claims("user-atlas", UserType::ServiceProvider);
    for plan in service.plans(&provider, EntityKind::ServiceProvider)? {
        println!("  - {} | {} | {} month(s)", plan.title, plan.price, plan.duration);
    }

    println!("\nAtlas Repairs (onboarded by a salesperson)");
    let atlas = entity(EntityKind::ServiceProvider, "sp-atlas");
    let receipt = service.create_request(
        &provider,
        NewRequest {
            entity: atlas.clone(),
            plan_id: PlanId("provider-half-year".to_string()),
            proof: None,
        },
    )?;
    println!("- Request {} filed -> {}", receipt.request_id, receipt.status.label());
    let resolution = service.resolve(&admin, &receipt.request_id, Decision::Approved, None)?;
    render_resolution(&resolution);

    println!("\nCedar Wholesale (self signup, dual review)");
    let cedar_owner = claims("user-cedar", UserType::Wholesaler);
    let receipt = service.create_request(
        &cedar_owner,
        NewRequest {
            entity: entity(EntityKind::Wholesaler, "wh-cedar"),
            plan_id: PlanId("wholesaler-annual".to_string()),
            proof: None,
        },
    )?;
    println!("- Request {} filed -> {}", receipt.request_id, receipt.status.label());
    for reviewer in [&manager, &admin] {
        let resolution = service.resolve(reviewer, &receipt.request_id, Decision::Approved, None)?;
        render_resolution(&resolution);
    }

    println!("\nLumen Foods north branch (salesperson under a sales manager)");
    let lumen_owner = claims("user-lumen", UserType::Company);
    let receipt = service.create_request(
        &lumen_owner,
        NewRequest {
            entity: entity(EntityKind::CompanyBranch, "co-lumen-north"),
            plan_id: PlanId("company-branch-monthly".to_string()),
            proof: None,
        },
    )?;
    let resolution = service.resolve(
        &claims("sm-rania", UserType::SalesManager),
        &receipt.request_id,
        Decision::Approved,
        None,
    )?;
    render_resolution(&resolution);

    println!("\nCedar Wholesale port depot (rejected)");
    let receipt = service.create_request(
        &cedar_owner,
        NewRequest {
            entity: entity(EntityKind::WholesalerBranch, "wh-cedar-port"),
            plan_id: PlanId("wholesaler-branch-half-year".to_string()),
            proof: None,
        },
    )?;
    let resolution = service.resolve(
        &manager,
        &receipt.request_id,
        Decision::Rejected,
        Some("Transfer reference does not match".to_string()),
    )?;
    render_resolution(&resolution);

    clock.advance(Duration::days(elapsed_days));
    println!("\nAfter {elapsed_days} day(s)");
    let remaining = service.remaining_time(&provider, &atlas)?;
    println!(
        "- Atlas Repairs: {} left | {:.1}% used",
        remaining.formatted, remaining.percentage_used
    );

    let reconciliation = service
        .ledger()
        .reconcile()
        .map_err(SubscriptionError::from)?;
    println!(
        "\nHouse ledger: {} across {} transaction(s) ({})",
        reconciliation.cached_net_balance,
        reconciliation.transaction_count,
        if reconciliation.is_consistent() {
            "consistent"
        } else {
            "drift detected"
        }
    );

    println!("\nNotifications");
    for notification in outbox.drain() {
        println!("  - {} <- {}", notification.recipient, notification.subject);
    }

    Ok(())
}

fn render_resolution(resolution: &Resolution) {
    println!(
        "- Review recorded -> {}{}",
        resolution.status.label(),
        if resolution.status_changed {
            ""
        } else {
            " (flag only)"
        }
    );
    if let Some(subscription) = &resolution.subscription {
        println!(
            "  Subscription {} runs until {}",
            subscription.subscription_id,
            subscription.end_date.format("%Y-%m-%d")
        );
    }
    match &resolution.commission {
        Some(CommissionOutcome::Posted(commission)) => {
            println!("  Commission on {}:", commission.plan_price);
            if let Some(share) = &commission.salesperson {
                println!("    - salesperson {}: {} ({}%)", share.recipient, share.amount, share.percent);
            }
            if let Some(share) = &commission.sales_manager {
                println!("    - sales manager {}: {} ({}%)", share.recipient, share.amount, share.percent);
            }
            if let Some(share) = &commission.admin {
                println!("    - admin {}: {} ({}%)", share.recipient, share.amount, share.percent);
            }
        }
        Some(CommissionOutcome::HouseIncome(transaction)) => {
            println!("  House income booked: {}", transaction.amount);
        }
        Some(CommissionOutcome::Skipped { reason }) => {
            println!("  Commission skipped: {reason}");
        }
        None => {}
    }
}

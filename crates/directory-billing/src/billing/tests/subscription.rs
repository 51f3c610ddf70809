use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

use super::common::*;

use crate::billing::domain::{
    EntityKind, Plan, PlanId, RequestId, Subscription, SubscriptionId, SubscriptionStatus,
    UserType,
};
use crate::billing::subscription::{RemainingTime, SubscriptionFactory};
use crate::billing::SubscriptionError;

fn plan_with_duration(duration: u8) -> Plan {
    Plan {
        id: PlanId(format!("plan-{duration}")),
        title: "Duration probe".to_string(),
        price: dec!(10),
        duration,
        entity_kind: EntityKind::ServiceProvider,
        is_active: true,
    }
}

#[test]
fn end_date_follows_calendar_months() {
    let start = Utc.with_ymd_and_hms(2025, 3, 15, 8, 30, 0).unwrap();
    let cases = [
        (1, Utc.with_ymd_and_hms(2025, 4, 15, 8, 30, 0).unwrap()),
        (6, Utc.with_ymd_and_hms(2025, 9, 15, 8, 30, 0).unwrap()),
        (12, Utc.with_ymd_and_hms(2026, 3, 15, 8, 30, 0).unwrap()),
    ];

    for (duration, expected) in cases {
        let end = SubscriptionFactory::end_date(&plan_with_duration(duration), start)
            .expect("supported duration");
        assert_eq!(end, expected, "duration {duration}");
    }
}

#[test]
fn end_date_clamps_at_month_end() {
    let end = SubscriptionFactory::end_date(&plan_with_duration(1), start()).expect("supported");
    assert_eq!(end, Utc.with_ymd_and_hms(2025, 2, 28, 10, 0, 0).unwrap());
}

#[test]
fn unsupported_duration_is_rejected() {
    for duration in [0, 2, 3, 24] {
        let result = SubscriptionFactory::end_date(&plan_with_duration(duration), start());
        assert!(
            matches!(result, Err(SubscriptionError::InvalidPlanDuration { duration: d, .. }) if d == duration),
            "duration {duration}"
        );
    }
}

fn active_subscription() -> Subscription {
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    Subscription {
        id: SubscriptionId("sub-1".to_string()),
        request_id: RequestId("req-1".to_string()),
        entity: entity_ref(EntityKind::ServiceProvider, "sp-1"),
        plan_id: PlanId("plan-annual".to_string()),
        start_date: start,
        end_date: start + Duration::days(10),
        status: SubscriptionStatus::Active,
        auto_renew: false,
        created_at: start,
        updated_at: start,
    }
}

#[test]
fn remaining_time_breaks_down_the_window() {
    let subscription = active_subscription();
    let now = subscription.start_date + Duration::days(2) + Duration::hours(6);

    let remaining = RemainingTime::of(&subscription, now);
    assert!(remaining.has_active_subscription);
    assert_eq!(remaining.days, 7);
    assert_eq!(remaining.hours, 18);
    assert_eq!(remaining.minutes, 0);
    assert_eq!(remaining.seconds, 0);
    assert_eq!(remaining.formatted, "7d 18h 0m 0s");
    assert_eq!(remaining.percentage_used, 22.5);
}

#[test]
fn expired_or_cancelled_subscription_has_no_remaining_time() {
    let mut subscription = active_subscription();
    let after_end = subscription.end_date + Duration::seconds(1);
    assert!(!RemainingTime::of(&subscription, after_end).has_active_subscription);

    subscription.status = SubscriptionStatus::Cancelled;
    let remaining = RemainingTime::of(&subscription, subscription.start_date);
    assert_eq!(remaining, RemainingTime::none());
}

#[test]
fn cancel_clears_auto_renew_and_remaining_time() {
    let harness = harness();
    let request_id = file_request(
        &harness,
        "u-sp",
        UserType::ServiceProvider,
        EntityKind::ServiceProvider,
        "sp-1",
        "plan-annual",
    );
    approve(&harness, &admin(), &request_id).expect("approved");

    let entity = entity_ref(EntityKind::ServiceProvider, "sp-1");
    let owner = owner("u-sp", UserType::ServiceProvider);
    harness.clock.advance(Duration::days(30));

    let before = harness
        .service
        .remaining_time(&owner, &entity)
        .expect("remaining time");
    assert!(before.has_active_subscription);
    assert!(before.percentage_used > 0.0);

    let cancelled = harness.service.cancel(&owner, &entity).expect("cancelled");
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert!(!cancelled.auto_renew);

    let after = harness
        .service
        .remaining_time(&owner, &entity)
        .expect("remaining time");
    assert!(!after.has_active_subscription);

    let again = harness.service.cancel(&owner, &entity);
    assert!(matches!(again, Err(SubscriptionError::NotFound(_))));
}

#[test]
fn only_the_owner_may_cancel() {
    let harness = harness();
    let request_id = file_request(
        &harness,
        "u-sp",
        UserType::ServiceProvider,
        EntityKind::ServiceProvider,
        "sp-1",
        "plan-annual",
    );
    approve(&harness, &admin(), &request_id).expect("approved");

    let entity = entity_ref(EntityKind::ServiceProvider, "sp-1");
    let stranger = owner("u-other", UserType::ServiceProvider);
    assert!(matches!(
        harness.service.cancel(&stranger, &entity),
        Err(SubscriptionError::Forbidden(_))
    ));
    assert!(matches!(
        harness.service.cancel(&admin(), &entity),
        Err(SubscriptionError::Forbidden(_))
    ));
}

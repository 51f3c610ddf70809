use chrono::{DateTime, Months, Utc};

use super::domain::{EntityKind, Plan, PlanId};
use super::repository::RepositoryError;

/// Read-only lookup of plan price and duration.
pub trait PlanCatalog: Send + Sync {
    fn plan(&self, id: &PlanId) -> Result<Option<Plan>, RepositoryError>;
    fn plans_for(&self, kind: EntityKind) -> Result<Vec<Plan>, RepositoryError>;
}

/// The duration categories a plan may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDuration {
    OneMonth,
    SixMonths,
    TwelveMonths,
}

impl PlanDuration {
    pub fn from_months(months: u8) -> Option<Self> {
        match months {
            1 => Some(PlanDuration::OneMonth),
            6 => Some(PlanDuration::SixMonths),
            12 => Some(PlanDuration::TwelveMonths),
            _ => None,
        }
    }

    pub const fn months(self) -> u32 {
        match self {
            PlanDuration::OneMonth => 1,
            PlanDuration::SixMonths => 6,
            PlanDuration::TwelveMonths => 12,
        }
    }

    /// Same day N months later; a missing day clamps to the month's last day.
    pub fn end_after(self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        start.checked_add_months(Months::new(self.months()))
    }
}

/// Active plans for an entity kind, cheapest first.
pub fn active_plans(
    catalog: &dyn PlanCatalog,
    kind: EntityKind,
) -> Result<Vec<Plan>, RepositoryError> {
    let mut plans: Vec<Plan> = catalog
        .plans_for(kind)?
        .into_iter()
        .filter(|plan| plan.is_active)
        .collect();
    plans.sort_by(|left, right| left.price.cmp(&right.price).then(left.id.cmp(&right.id)));
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn only_three_duration_categories_exist() {
        assert_eq!(PlanDuration::from_months(1), Some(PlanDuration::OneMonth));
        assert_eq!(PlanDuration::from_months(6), Some(PlanDuration::SixMonths));
        assert_eq!(PlanDuration::from_months(12), Some(PlanDuration::TwelveMonths));
        assert_eq!(PlanDuration::from_months(3), None);
        assert_eq!(PlanDuration::from_months(0), None);
    }

    #[test]
    fn month_end_clamps_to_shorter_month() {
        let start = Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap();
        let end = PlanDuration::OneMonth.end_after(start).expect("in range");
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 2, 28, 12, 0, 0).unwrap());

        let leap = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        let end = PlanDuration::TwelveMonths.end_after(leap).expect("in range");
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 2, 28, 0, 0, 0).unwrap());
    }
}

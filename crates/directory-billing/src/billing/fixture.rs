use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{
    is_valid_percent, Admin, DirectoryEntity, Plan, SalesManager, Salesperson,
};

/// Directory snapshot used to populate the in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub plans: Vec<Plan>,
    #[serde(default)]
    pub entities: Vec<DirectoryEntity>,
    #[serde(default)]
    pub salespersons: Vec<Salesperson>,
    #[serde(default)]
    pub sales_managers: Vec<SalesManager>,
    #[serde(default)]
    pub admins: Vec<Admin>,
}

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("unable to read fixture {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed directory fixture: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid directory fixture: {0}")]
    Invalid(String),
}

impl DirectorySeed {
    pub fn from_path(path: &Path) -> Result<Self, FixtureError> {
        let file = File::open(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FixtureError> {
        let seed: Self = serde_json::from_reader(reader)?;
        seed.validate()
    }

    pub fn from_json(raw: &str) -> Result<Self, FixtureError> {
        let seed: Self = serde_json::from_str(raw)?;
        seed.validate()
    }

    /// Rejects reference data the money math cannot handle.
    fn validate(self) -> Result<Self, FixtureError> {
        if let Some(plan) = self.plans.iter().find(|plan| plan.price < Decimal::ZERO) {
            return Err(FixtureError::Invalid(format!(
                "plan {} has negative price {}",
                plan.id, plan.price
            )));
        }
        let percents = self
            .salespersons
            .iter()
            .map(|person| (person.id.to_string(), person.commission_percent))
            .chain(
                self.sales_managers
                    .iter()
                    .map(|manager| (manager.id.to_string(), manager.commission_percent)),
            )
            .chain(
                self.admins
                    .iter()
                    .map(|admin| (admin.id.to_string(), admin.commission_percent)),
            );
        for (id, percent) in percents {
            if !is_valid_percent(percent) {
                return Err(FixtureError::Invalid(format!(
                    "{id} has commission percent {percent} outside 0..=100"
                )));
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::domain::{EntityKind, OwnerKind, VisibleStatus};

    #[test]
    fn parses_minimal_fixture_with_defaults() {
        let seed = DirectorySeed::from_json(
            r#"{
                "plans": [
                    {"id": "plan-basic", "title": "Basic", "price": "25.00", "duration": 1, "entity_kind": "wholesaler"}
                ],
                "entities": [
                    {"id": "w-1", "kind": "wholesaler", "user_id": "u-1", "business_name": "North Depot",
                     "branches": [{"id": "wb-1", "name": "Harbor"}]}
                ]
            }"#,
        )
        .expect("fixture parses");

        assert_eq!(seed.plans.len(), 1);
        assert!(seed.plans[0].is_active);
        assert_eq!(seed.plans[0].entity_kind, EntityKind::Wholesaler);
        assert_eq!(seed.entities[0].kind, OwnerKind::Wholesaler);
        assert_eq!(seed.entities[0].branches[0].status, VisibleStatus::Inactive);
        assert!(seed.admins.is_empty());
    }

    #[test]
    fn reports_parse_errors() {
        let err = DirectorySeed::from_json("{\"plans\": 4}").expect_err("invalid shape");
        assert!(matches!(err, FixtureError::Parse(_)));
    }

    #[test]
    fn rejects_negative_prices_and_out_of_range_percents() {
        let negative = DirectorySeed::from_json(
            r#"{"plans": [{"id": "plan-x", "title": "X", "price": "-50", "duration": 1, "entity_kind": "wholesaler"}]}"#,
        )
        .expect_err("negative price");
        assert!(matches!(negative, FixtureError::Invalid(_)));

        let greedy = DirectorySeed::from_json(
            r#"{"salespersons": [{"id": "sp-x", "full_name": "Greedy", "commission_percent": "120"}]}"#,
        )
        .expect_err("percent above 100");
        assert!(matches!(greedy, FixtureError::Invalid(_)));

        let negative_manager = DirectorySeed::from_json(
            r#"{"sales_managers": [{"id": "sm-x", "full_name": "Minus", "commission_percent": "-1"}]}"#,
        )
        .expect_err("negative percent");
        assert!(matches!(negative_manager, FixtureError::Invalid(_)));
    }

    #[test]
    fn reports_missing_files() {
        let err = DirectorySeed::from_path(Path::new("/nonexistent/seed.json"))
            .expect_err("missing file");
        assert!(matches!(err, FixtureError::Io { .. }));
    }
}

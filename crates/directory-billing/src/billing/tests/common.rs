use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::billing::domain::{
    Admin, AdminId, Branch, Claims, Decision, DirectoryEntity, EntityId, EntityKind, EntityRef,
    OwnerKind, Plan, PlanId, ProofUpload, RequestId, SalesManager, SalesManagerId, Salesperson,
    SalespersonId, UserId, UserType, VisibleStatus,
};
use crate::billing::repository::{
    FileStore, FileStoreError, Notification, NotificationError, NotificationSender,
};
use crate::billing::{
    ApprovalPolicyKind, BillingStores, DirectorySeed, FixedClock, InMemoryStore, NewRequest,
    Resolution, ServiceSettings, SubscriptionError, SubscriptionService,
};

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 31, 10, 0, 0).unwrap()
}

fn plan(id: &str, price: rust_decimal::Decimal, duration: u8, kind: EntityKind) -> Plan {
    Plan {
        id: PlanId(id.to_string()),
        title: id.trim_start_matches("plan-").replace('-', " "),
        price,
        duration,
        entity_kind: kind,
        is_active: true,
    }
}

fn entity(
    id: &str,
    kind: OwnerKind,
    user: &str,
    created_by: &str,
    branches: Vec<Branch>,
) -> DirectoryEntity {
    DirectoryEntity {
        id: EntityId(id.to_string()),
        kind,
        user_id: UserId(user.to_string()),
        business_name: format!("{id} trading"),
        email: Some(format!("{user}@directory.test")),
        phone: None,
        created_by: Some(created_by.to_string()),
        status: VisibleStatus::Inactive,
        branches,
    }
}

fn branch(id: &str, name: &str) -> Branch {
    Branch {
        id: EntityId(id.to_string()),
        name: name.to_string(),
        phone: None,
        status: VisibleStatus::Inactive,
    }
}

pub(super) fn seed() -> DirectorySeed {
    let mut retired = plan("plan-retired", dec!(10), 1, EntityKind::ServiceProvider);
    retired.is_active = false;

    DirectorySeed {
        plans: vec![
            plan("plan-monthly", dec!(100), 1, EntityKind::Wholesaler),
            plan("plan-half-year", dec!(200), 6, EntityKind::Wholesaler),
            plan("plan-annual", dec!(100), 12, EntityKind::ServiceProvider),
            plan("plan-quarterly", dec!(50), 3, EntityKind::ServiceProvider),
            plan("plan-starter", dec!(40), 1, EntityKind::ServiceProvider),
            plan("plan-branch", dec!(200), 1, EntityKind::WholesalerBranch),
            plan("plan-company-branch", dec!(100), 1, EntityKind::CompanyBranch),
            retired,
        ],
        entities: vec![
            entity("w-self", OwnerKind::Wholesaler, "u-self", "u-self", Vec::new()),
            entity(
                "w-lineage",
                OwnerKind::Wholesaler,
                "u-whole",
                "sp-managed",
                vec![branch("wb-harbor", "Harbor")],
            ),
            entity("sp-1", OwnerKind::ServiceProvider, "u-sp", "sp-direct", Vec::new()),
            entity("sp-orphan", OwnerKind::ServiceProvider, "u-orphan", "sp-ghost", Vec::new()),
            entity(
                "c-1",
                OwnerKind::Company,
                "u-co",
                "sp-direct",
                vec![branch("cb-downtown", "Downtown")],
            ),
        ],
        salespersons: vec![
            Salesperson {
                id: SalespersonId("sp-direct".to_string()),
                full_name: "Dana Direct".to_string(),
                commission_percent: dec!(20),
                sales_manager_id: None,
                created_by: Some(AdminId("admin-1".to_string())),
            },
            Salesperson {
                id: SalespersonId("sp-managed".to_string()),
                full_name: "Milo Managed".to_string(),
                commission_percent: dec!(15),
                sales_manager_id: Some(SalesManagerId("sm-1".to_string())),
                created_by: None,
            },
        ],
        sales_managers: vec![SalesManager {
            id: SalesManagerId("sm-1".to_string()),
            full_name: "Sam Manager".to_string(),
            commission_percent: dec!(10),
        }],
        admins: vec![Admin {
            id: AdminId("admin-1".to_string()),
            email: "admin@directory.test".to_string(),
            commission_percent: dec!(0),
        }],
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub(super) fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationSender for RecordingNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        if self.fail {
            return Err(NotificationError::Transport("smtp offline".to_string()));
        }
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryFiles {
    saved: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
}

impl MemoryFiles {
    pub(super) fn saved(&self) -> Vec<String> {
        self.saved.lock().expect("files mutex poisoned").clone()
    }

    pub(super) fn removed(&self) -> Vec<String> {
        self.removed.lock().expect("files mutex poisoned").clone()
    }
}

impl FileStore for MemoryFiles {
    fn save(&self, upload: &ProofUpload, directory: &str) -> Result<String, FileStoreError> {
        let mut saved = self.saved.lock().expect("files mutex poisoned");
        let name = upload.file_name.clone().unwrap_or_else(|| "proof".to_string());
        let path = format!("{directory}/{}-{name}", saved.len() + 1);
        saved.push(path.clone());
        Ok(path)
    }

    fn remove(&self, path: &str) -> Result<(), FileStoreError> {
        self.removed
            .lock()
            .expect("files mutex poisoned")
            .push(path.to_string());
        Ok(())
    }
}

pub(super) struct Harness {
    pub(super) service: Arc<SubscriptionService>,
    pub(super) store: Arc<InMemoryStore>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) files: Arc<MemoryFiles>,
    pub(super) clock: Arc<FixedClock>,
}

pub(super) fn settings(policy: ApprovalPolicyKind) -> ServiceSettings {
    ServiceSettings {
        approval_policy: policy,
        admin_email: Some("admin@directory.test".to_string()),
        manager_email: Some("manager@directory.test".to_string()),
        proof_directory: "proofs".to_string(),
        max_proof_bytes: 1024,
    }
}

pub(super) fn harness() -> Harness {
    harness_with(ApprovalPolicyKind::AnyReviewer)
}

pub(super) fn harness_with(policy: ApprovalPolicyKind) -> Harness {
    harness_from(seed(), policy)
}

/// Harness over a hand-edited seed; bypasses fixture validation on purpose.
pub(super) fn harness_from(seed: DirectorySeed, policy: ApprovalPolicyKind) -> Harness {
    let store = Arc::new(InMemoryStore::from_seed(seed));
    let notifier = Arc::new(RecordingNotifier::default());
    let files = Arc::new(MemoryFiles::default());
    let clock = Arc::new(FixedClock::new(start()));
    let stores = BillingStores::in_memory(store.clone(), notifier.clone(), files.clone());
    let service = Arc::new(SubscriptionService::new(
        stores,
        settings(policy),
        clock.clone(),
    ));
    Harness {
        service,
        store,
        notifier,
        files,
        clock,
    }
}

pub(super) fn owner(user: &str, user_type: UserType) -> Claims {
    Claims {
        user_id: UserId(user.to_string()),
        user_type,
    }
}

pub(super) fn admin() -> Claims {
    owner("admin-1", UserType::Admin)
}

pub(super) fn manager() -> Claims {
    owner("manager-1", UserType::Manager)
}

pub(super) fn sales_manager() -> Claims {
    owner("sm-1", UserType::SalesManager)
}

pub(super) fn entity_ref(kind: EntityKind, id: &str) -> EntityRef {
    EntityRef::new(kind, EntityId(id.to_string()))
}

pub(super) fn new_request(kind: EntityKind, id: &str, plan: &str) -> NewRequest {
    NewRequest {
        entity: entity_ref(kind, id),
        plan_id: PlanId(plan.to_string()),
        proof: None,
    }
}

/// Files a request as the entity's owner and returns its id.
pub(super) fn file_request(
    harness: &Harness,
    user: &str,
    user_type: UserType,
    kind: EntityKind,
    id: &str,
    plan: &str,
) -> RequestId {
    harness
        .service
        .create_request(&owner(user, user_type), new_request(kind, id, plan))
        .expect("request accepted")
        .request_id
}

pub(super) fn approve(
    harness: &Harness,
    reviewer: &Claims,
    request_id: &RequestId,
) -> Result<Resolution, SubscriptionError> {
    harness
        .service
        .resolve(reviewer, request_id, Decision::Approved, None)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

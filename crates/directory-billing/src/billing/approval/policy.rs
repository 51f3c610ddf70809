use serde::{Deserialize, Serialize};

use super::super::domain::{ApprovalShape, Decision, ReviewerRole};
use super::super::repository::{ReviewGuard, StatusTransition};

/// Decides how a reviewer's decision moves a request.
pub trait ApprovalPolicy: Send + Sync {
    fn name(&self) -> &'static str;
    fn transition(&self, shape: ApprovalShape, decision: Decision) -> StatusTransition;
}

/// Either reviewer settles a dual-approval request on their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyReviewerPolicy;

impl ApprovalPolicy for AnyReviewerPolicy {
    fn name(&self) -> &'static str {
        "any_reviewer"
    }

    fn transition(&self, _shape: ApprovalShape, decision: Decision) -> StatusTransition {
        StatusTransition::Set(decision.resulting_status())
    }
}

/// Dual-approval requests need both flags before they are approved; one rejection suffices.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnanimousPolicy;

impl ApprovalPolicy for UnanimousPolicy {
    fn name(&self) -> &'static str {
        "unanimous"
    }

    fn transition(&self, shape: ApprovalShape, decision: Decision) -> StatusTransition {
        match (shape, decision) {
            (ApprovalShape::Dual, Decision::Approved) => StatusTransition::ApproveWhenBothFlagged,
            (_, decision) => StatusTransition::Set(decision.resulting_status()),
        }
    }
}

/// Configured selection between the shipped policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicyKind {
    AnyReviewer,
    Unanimous,
}

impl ApprovalPolicyKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "any_reviewer" | "any" => Some(ApprovalPolicyKind::AnyReviewer),
            "unanimous" | "both" => Some(ApprovalPolicyKind::Unanimous),
            _ => None,
        }
    }

    pub fn build(self) -> Box<dyn ApprovalPolicy> {
        match self {
            ApprovalPolicyKind::AnyReviewer => Box::new(AnyReviewerPolicy),
            ApprovalPolicyKind::Unanimous => Box::new(UnanimousPolicy),
        }
    }
}

/// Precondition for a reviewer's write given the request's approval shape.
///
/// Single-approval requests must still be pending. On dual-approval requests each
/// reviewer may record a flag they have not set yet, even after the other reviewer
/// settled the status.
pub(crate) fn guard_for(shape: ApprovalShape, role: ReviewerRole) -> ReviewGuard {
    match shape {
        ApprovalShape::Single => ReviewGuard {
            require_pending: true,
            require_unset_flag: None,
        },
        ApprovalShape::Dual => ReviewGuard {
            require_pending: false,
            require_unset_flag: Some(role),
        },
    }
}

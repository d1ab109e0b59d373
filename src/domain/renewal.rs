use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::member::{PaymentMethod, PlanCode};

/// A proposed plan change awaiting admin gatekeeping. Both the legacy
/// inline renewal form and the token-link workflow create rows here, so
/// there is exactly one pending-renewal state machine per member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalProposal {
    pub id: Uuid,
    pub member_id: Uuid,
    pub source: ProposalSource,
    pub plan: PlanCode,
    pub amount: i64,
    pub payment_method: PaymentMethod,
    pub status: ProposalStatus,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalSource {
    Legacy,
    Token,
}

impl ProposalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalSource::Legacy => "legacy",
            ProposalSource::Token => "token",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "legacy" => Some(ProposalSource::Legacy),
            "token" => Some(ProposalSource::Token),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProposalStatus::Pending),
            "approved" => Some(ProposalStatus::Approved),
            "rejected" => Some(ProposalStatus::Rejected),
            _ => None,
        }
    }
}

/// Everything the repository applies, in one transaction, when a renewal
/// is submitted: the new window on the member row, the audit entry, and
/// the pending proposal. The previous plan/amount are captured by the
/// service BEFORE any mutation.
#[derive(Debug, Clone)]
pub struct RenewalApplication {
    pub plan: PlanCode,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub previous_plan: PlanCode,
    pub previous_amount: i64,
    pub new_amount: i64,
    pub source: ProposalSource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRenewalRequest {
    pub token: String,
    pub plan: PlanCode,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub payment_method: PaymentMethod,
}

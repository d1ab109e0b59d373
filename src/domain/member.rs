use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;

/// A gym member together with their current subscription window. The
/// financial history lives in `membership_history` (see [`LedgerEntry`]),
/// which outlives the member's display fields: members are only ever
/// soft-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub plan: PlanCode,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub subscription_status: SubscriptionStatus,
    /// Frozen to the member's `start_date` on their first renewal, so the
    /// true join date survives any number of later window rewrites.
    pub original_join_date: Option<NaiveDate>,
    pub renewal_count: i64,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    /// The date the member first joined, regardless of renewals.
    pub fn join_date(&self) -> NaiveDate {
        self.original_join_date.unwrap_or(self.start_date)
    }

    pub fn has_renewed(&self) -> bool {
        self.renewal_count > 0
    }
}

/// The five recognized membership durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanCode {
    #[serde(rename = "1month")]
    OneMonth,
    #[serde(rename = "2month")]
    TwoMonth,
    #[serde(rename = "3month")]
    ThreeMonth,
    #[serde(rename = "6month")]
    SixMonth,
    #[serde(rename = "yearly")]
    Yearly,
}

impl PlanCode {
    pub const ALL: [PlanCode; 5] = [
        PlanCode::OneMonth,
        PlanCode::TwoMonth,
        PlanCode::ThreeMonth,
        PlanCode::SixMonth,
        PlanCode::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanCode::OneMonth => "1month",
            PlanCode::TwoMonth => "2month",
            PlanCode::ThreeMonth => "3month",
            PlanCode::SixMonth => "6month",
            PlanCode::Yearly => "yearly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1month" => Some(PlanCode::OneMonth),
            "2month" => Some(PlanCode::TwoMonth),
            "3month" => Some(PlanCode::ThreeMonth),
            "6month" => Some(PlanCode::SixMonth),
            "yearly" => Some(PlanCode::Yearly),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        Self::from_str(s).ok_or_else(|| AppError::UnknownPlan(s.to_string()))
    }

    /// Plan duration in calendar months.
    pub fn months(&self) -> u32 {
        match self {
            PlanCode::OneMonth => 1,
            PlanCode::TwoMonth => 2,
            PlanCode::ThreeMonth => 3,
            PlanCode::SixMonth => 6,
            PlanCode::Yearly => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Pending,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Pending => "pending",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "expired" => Some(SubscriptionStatus::Expired),
            "pending" => Some(SubscriptionStatus::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "confirmed" => Some(PaymentStatus::Confirmed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Online => "online",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "online" => Some(PaymentMethod::Online),
            _ => None,
        }
    }
}

/// One immutable row of the membership ledger. This is the authoritative
/// revenue record: rows are appended when payment is recognized and never
/// touched again, including across member soft-deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub member_id: Uuid,
    pub kind: LedgerEntryKind,
    pub effective_date: NaiveDate,
    pub duration_months: i64,
    /// Minor-unit-free integer amount (whole rupees).
    pub amount: i64,
    pub payment_mode: PaymentMethod,
    pub plan: PlanCode,
    pub payment_status: PaymentStatus,
    pub transaction_ref: Option<String>,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEntryKind {
    Join,
    Renewal,
}

impl LedgerEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryKind::Join => "join",
            LedgerEntryKind::Renewal => "renewal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "join" => Some(LedgerEntryKind::Join),
            "renewal" => Some(LedgerEntryKind::Renewal),
            _ => None,
        }
    }
}

/// Ledger entry payload, built by the orchestrator and written by the
/// repository inside the settlement transaction.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub kind: LedgerEntryKind,
    pub effective_date: NaiveDate,
    pub duration_months: i64,
    pub amount: i64,
    pub payment_mode: PaymentMethod,
    pub plan: PlanCode,
    pub payment_status: PaymentStatus,
    pub transaction_ref: Option<String>,
    pub note: Option<String>,
}

/// Informational audit row written on every renewal submission. Distinct
/// from the ledger: it records intent, not recognized revenue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalAudit {
    pub id: Uuid,
    pub member_id: Uuid,
    pub plan: PlanCode,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub previous_plan: PlanCode,
    pub previous_amount: i64,
    pub new_amount: i64,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMemberRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 7, max = 15))]
    pub phone: String,
    pub plan: PlanCode,
    pub payment_method: PaymentMethod,
    /// Defaults to today when omitted; the end date is derived from the
    /// plan duration.
    pub start_date: Option<NaiveDate>,
}

/// Repository-level payload for member creation, with the subscription
/// window already resolved by the service layer.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub plan: PlanCode,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateMemberRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub plan: Option<PlanCode>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    pub subscription_status: Option<SubscriptionStatus>,
}

/// What a renewal-token holder is allowed to see about the member the
/// token binds to. No ids, no phone, and the email is masked.
#[derive(Debug, Clone, Serialize)]
pub struct MemberSummary {
    pub name: String,
    pub email: String,
    pub plan: PlanCode,
    pub end_date: NaiveDate,
}

impl MemberSummary {
    pub fn from_member(member: &Member) -> Self {
        Self {
            name: member.name.clone(),
            email: mask_email(&member.email),
            plan: member.plan,
            end_date: member.end_date,
        }
    }
}

/// Masks the local part of an email address, keeping the first character
/// and the domain: `priya@example.com` becomes `p***@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first = local.chars().next().unwrap_or('*');
            format!("{}***@{}", first, domain)
        }
        _ => "***".to_string(),
    }
}

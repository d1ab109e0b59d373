use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::*;
use crate::error::Result;

pub mod member_repository;
pub mod order_repository;

pub use member_repository::SqliteMemberRepository;
pub use order_repository::SqliteOrderRepository;

/// Outcome of the paid-settlement transaction. `AlreadyPaid` is the
/// idempotent no-op branch: the stored order is returned unchanged and
/// nothing was written.
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    Settled(PaymentOrder),
    AlreadyPaid(PaymentOrder),
}

#[async_trait]
pub trait MemberRepository: Send + Sync {
    async fn create(&self, member: NewMember) -> Result<Member>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Member>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Member>>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Member>>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Member>>;
    async fn update(&self, id: Uuid, update: UpdateMemberRequest) -> Result<Member>;

    /// Recognize payment for a member with no open order: flips the
    /// member to confirmed/active, appends the ledger entry, and resolves
    /// any pending renewal proposal, all in one transaction.
    async fn confirm_subscription(&self, id: Uuid, entry: NewLedgerEntry) -> Result<Member>;

    /// Apply a renewal submission: rewrite the member's window, freeze
    /// the original join date on first renewal, bump the renewal counter,
    /// and record the audit row plus the pending proposal, all in one
    /// transaction.
    async fn apply_renewal(&self, id: Uuid, renewal: RenewalApplication) -> Result<Member>;

    /// Admin rejection: subscription goes back to expired, the pending
    /// proposal is resolved, the ledger is left untouched.
    async fn reject_pending_renewal(&self, id: Uuid) -> Result<Member>;

    async fn find_pending_proposal(&self, member_id: Uuid) -> Result<Option<RenewalProposal>>;

    /// Soft delete: flags the row and anonymizes display fields. Ledger
    /// rows are not touched.
    async fn soft_delete(&self, id: Uuid) -> Result<Member>;

    async fn ledger(&self, member_id: Uuid) -> Result<Vec<LedgerEntry>>;
    async fn renewal_audits(&self, member_id: Uuid) -> Result<Vec<RenewalAudit>>;

    /// Members whose window has lapsed but are not yet marked expired.
    async fn list_lapsed(&self, today: NaiveDate) -> Result<Vec<Member>>;

    /// Guarded expiry flip; returns false when another sweep got there
    /// first (or the member is already expired).
    async fn mark_expired(&self, id: Uuid) -> Result<bool>;

    /// Active members whose window ends within `[today, today + days)`.
    async fn list_expiring_within(&self, today: NaiveDate, days: i64) -> Result<Vec<Member>>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: PaymentOrder) -> Result<PaymentOrder>;
    async fn find_by_id(&self, id: &str) -> Result<Option<PaymentOrder>>;
    async fn find_by_member(&self, member_id: Uuid) -> Result<Vec<PaymentOrder>>;

    /// The most recent order still in `created` state for this member,
    /// if any. Used by the admin confirmation path.
    async fn find_open_by_member(&self, member_id: Uuid) -> Result<Option<PaymentOrder>>;

    /// The one logical transaction of the payment lifecycle: order to
    /// paid, member to confirmed/active, ledger entry appended, pending
    /// proposal resolved. The paid flip is a status-guarded UPDATE, so a
    /// concurrent duplicate confirmation loses the race and surfaces as
    /// `AlreadyPaid` with zero additional writes.
    async fn settle_paid(
        &self,
        order_id: &str,
        member_id: Uuid,
        external_ref: &str,
        entry: NewLedgerEntry,
    ) -> Result<SettleOutcome>;

    /// Marks a non-paid order failed with a reason. A paid order is
    /// immutable and is returned unchanged.
    async fn mark_failed(&self, order_id: &str, reason: &str) -> Result<PaymentOrder>;

    /// Flips `created` orders whose expiry has passed to `expired`.
    /// Returns the number of orders touched.
    async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<u64>;
}

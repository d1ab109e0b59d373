use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{
        LedgerEntry, LedgerEntryKind, Member, NewLedgerEntry, NewMember, PaymentMethod,
        PaymentStatus, PlanCode, ProposalSource, ProposalStatus, RenewalApplication,
        RenewalAudit, RenewalProposal, SubscriptionStatus, UpdateMemberRequest,
    },
    error::{AppError, Result},
    repository::MemberRepository,
};

// Database row struct that matches the SQLite schema
#[derive(FromRow)]
struct MemberRow {
    id: String,
    name: String,
    email: String,
    phone: String,
    plan: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    payment_method: String,
    payment_status: String,
    subscription_status: String,
    original_join_date: Option<NaiveDate>,
    renewal_count: i64,
    deleted: i32,
    deleted_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct LedgerRow {
    id: String,
    member_id: String,
    kind: String,
    effective_date: NaiveDate,
    duration_months: i64,
    amount: i64,
    payment_mode: String,
    plan: String,
    payment_status: String,
    transaction_ref: Option<String>,
    note: Option<String>,
    recorded_at: NaiveDateTime,
}

#[derive(FromRow)]
struct AuditRow {
    id: String,
    member_id: String,
    plan: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    payment_method: String,
    previous_plan: String,
    previous_amount: i64,
    new_amount: i64,
    requested_at: NaiveDateTime,
}

#[derive(FromRow)]
struct ProposalRow {
    id: String,
    member_id: String,
    source: String,
    plan: String,
    amount: i64,
    payment_method: String,
    status: String,
    requested_at: NaiveDateTime,
    processed_at: Option<NaiveDateTime>,
}

const MEMBER_COLUMNS: &str = r#"
    id, name, email, phone, plan, start_date, end_date,
    payment_method, payment_status, subscription_status,
    original_join_date, renewal_count, deleted, deleted_at,
    created_at, updated_at
"#;

pub struct SqliteMemberRepository {
    pool: SqlitePool,
}

impl SqliteMemberRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_member(row: MemberRow) -> Result<Member> {
        Ok(Member {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            name: row.name,
            email: row.email,
            phone: row.phone,
            plan: parse_plan(&row.plan)?,
            start_date: row.start_date,
            end_date: row.end_date,
            payment_method: parse_payment_method(&row.payment_method)?,
            payment_status: parse_payment_status(&row.payment_status)?,
            subscription_status: parse_subscription_status(&row.subscription_status)?,
            original_join_date: row.original_join_date,
            renewal_count: row.renewal_count,
            deleted: row.deleted != 0,
            deleted_at: row.deleted_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn row_to_ledger_entry(row: LedgerRow) -> Result<LedgerEntry> {
        Ok(LedgerEntry {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            member_id: Uuid::parse_str(&row.member_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            kind: LedgerEntryKind::from_str(&row.kind)
                .ok_or_else(|| AppError::Database(format!("Invalid ledger kind: {}", row.kind)))?,
            effective_date: row.effective_date,
            duration_months: row.duration_months,
            amount: row.amount,
            payment_mode: parse_payment_method(&row.payment_mode)?,
            plan: parse_plan(&row.plan)?,
            payment_status: parse_payment_status(&row.payment_status)?,
            transaction_ref: row.transaction_ref,
            note: row.note,
            recorded_at: DateTime::from_naive_utc_and_offset(row.recorded_at, Utc),
        })
    }

    fn row_to_audit(row: AuditRow) -> Result<RenewalAudit> {
        Ok(RenewalAudit {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            member_id: Uuid::parse_str(&row.member_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            plan: parse_plan(&row.plan)?,
            start_date: row.start_date,
            end_date: row.end_date,
            payment_method: parse_payment_method(&row.payment_method)?,
            previous_plan: parse_plan(&row.previous_plan)?,
            previous_amount: row.previous_amount,
            new_amount: row.new_amount,
            requested_at: DateTime::from_naive_utc_and_offset(row.requested_at, Utc),
        })
    }

    fn row_to_proposal(row: ProposalRow) -> Result<RenewalProposal> {
        Ok(RenewalProposal {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            member_id: Uuid::parse_str(&row.member_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            source: ProposalSource::from_str(&row.source).ok_or_else(|| {
                AppError::Database(format!("Invalid proposal source: {}", row.source))
            })?,
            plan: parse_plan(&row.plan)?,
            amount: row.amount,
            payment_method: parse_payment_method(&row.payment_method)?,
            status: ProposalStatus::from_str(&row.status).ok_or_else(|| {
                AppError::Database(format!("Invalid proposal status: {}", row.status))
            })?,
            requested_at: DateTime::from_naive_utc_and_offset(row.requested_at, Utc),
            processed_at: row
                .processed_at
                .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
        })
    }
}

fn parse_plan(s: &str) -> Result<PlanCode> {
    PlanCode::from_str(s).ok_or_else(|| AppError::Database(format!("Invalid plan code: {}", s)))
}

fn parse_payment_method(s: &str) -> Result<PaymentMethod> {
    PaymentMethod::from_str(s)
        .ok_or_else(|| AppError::Database(format!("Invalid payment method: {}", s)))
}

fn parse_payment_status(s: &str) -> Result<PaymentStatus> {
    PaymentStatus::from_str(s)
        .ok_or_else(|| AppError::Database(format!("Invalid payment status: {}", s)))
}

fn parse_subscription_status(s: &str) -> Result<SubscriptionStatus> {
    SubscriptionStatus::from_str(s)
        .ok_or_else(|| AppError::Database(format!("Invalid subscription status: {}", s)))
}

#[async_trait]
impl MemberRepository for SqliteMemberRepository {
    async fn create(&self, member: NewMember) -> Result<Member> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();
        let id_str = id.to_string();

        sqlx::query(
            r#"
            INSERT INTO members (
                id, name, email, phone, plan, start_date, end_date,
                payment_method, payment_status, subscription_status,
                renewal_count, deleted, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', 'pending', 0, 0, ?, ?)
            "#,
        )
        .bind(&id_str)
        .bind(&member.name)
        .bind(&member.email)
        .bind(&member.phone)
        .bind(member.plan.as_str())
        .bind(member.start_date)
        .bind(member.end_date)
        .bind(member.payment_method.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created member".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Member>> {
        let id_str = id.to_string();
        let row = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {} FROM members WHERE id = ?",
            MEMBER_COLUMNS
        ))
        .bind(id_str)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_member(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Member>> {
        let row = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {} FROM members WHERE email = ?",
            MEMBER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_member(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Member>> {
        let row = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {} FROM members WHERE phone = ?",
            MEMBER_COLUMNS
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_member(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Member>> {
        let rows = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {} FROM members WHERE deleted = 0 ORDER BY created_at DESC LIMIT ? OFFSET ?",
            MEMBER_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_member).collect()
    }

    async fn update(&self, id: Uuid, update: UpdateMemberRequest) -> Result<Member> {
        let id_str = id.to_string();
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE members
            SET name = COALESCE(?, name),
                email = COALESCE(?, email),
                phone = COALESCE(?, phone),
                plan = COALESCE(?, plan),
                start_date = COALESCE(?, start_date),
                end_date = COALESCE(?, end_date),
                payment_method = COALESCE(?, payment_method),
                payment_status = COALESCE(?, payment_status),
                subscription_status = COALESCE(?, subscription_status),
                updated_at = ?
            WHERE id = ? AND deleted = 0
            "#,
        )
        .bind(&update.name)
        .bind(&update.email)
        .bind(&update.phone)
        .bind(update.plan.map(|p| p.as_str()))
        .bind(update.start_date)
        .bind(update.end_date)
        .bind(update.payment_method.map(|m| m.as_str()))
        .bind(update.payment_status.map(|s| s.as_str()))
        .bind(update.subscription_status.map(|s| s.as_str()))
        .bind(now)
        .bind(&id_str)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Member not found".to_string()));
        }

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve updated member".to_string()))
    }

    async fn confirm_subscription(&self, id: Uuid, entry: NewLedgerEntry) -> Result<Member> {
        let id_str = id.to_string();
        let now = Utc::now().naive_utc();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE members
            SET payment_status = 'confirmed',
                subscription_status = 'active',
                updated_at = ?
            WHERE id = ? AND deleted = 0
            "#,
        )
        .bind(now)
        .bind(&id_str)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Member not found".to_string()));
        }

        insert_ledger_entry(&mut tx, &id_str, &entry, now).await?;
        resolve_pending_proposals(&mut tx, &id_str, ProposalStatus::Approved, now).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve confirmed member".to_string()))
    }

    async fn apply_renewal(&self, id: Uuid, renewal: RenewalApplication) -> Result<Member> {
        let id_str = id.to_string();
        let now = Utc::now().naive_utc();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // COALESCE freezes the original join date to the pre-renewal
        // start_date exactly once: column references on the right-hand
        // side of SET read the old row.
        let result = sqlx::query(
            r#"
            UPDATE members
            SET original_join_date = COALESCE(original_join_date, start_date),
                plan = ?,
                start_date = ?,
                end_date = ?,
                payment_method = ?,
                payment_status = 'pending',
                subscription_status = 'pending',
                renewal_count = renewal_count + 1,
                updated_at = ?
            WHERE id = ? AND deleted = 0
            "#,
        )
        .bind(renewal.plan.as_str())
        .bind(renewal.start_date)
        .bind(renewal.end_date)
        .bind(renewal.payment_method.as_str())
        .bind(now)
        .bind(&id_str)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Member not found".to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO renewal_audit (
                id, member_id, plan, start_date, end_date, payment_method,
                previous_plan, previous_amount, new_amount, requested_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&id_str)
        .bind(renewal.plan.as_str())
        .bind(renewal.start_date)
        .bind(renewal.end_date)
        .bind(renewal.payment_method.as_str())
        .bind(renewal.previous_plan.as_str())
        .bind(renewal.previous_amount)
        .bind(renewal.new_amount)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        // A resubmission supersedes any proposal still pending, so there
        // is at most one live proposal per member.
        resolve_pending_proposals(&mut tx, &id_str, ProposalStatus::Rejected, now).await?;

        sqlx::query(
            r#"
            INSERT INTO renewal_proposals (
                id, member_id, source, plan, amount, payment_method,
                status, requested_at
            ) VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&id_str)
        .bind(renewal.source.as_str())
        .bind(renewal.plan.as_str())
        .bind(renewal.new_amount)
        .bind(renewal.payment_method.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve renewed member".to_string()))
    }

    async fn reject_pending_renewal(&self, id: Uuid) -> Result<Member> {
        let id_str = id.to_string();
        let now = Utc::now().naive_utc();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE members
            SET subscription_status = 'expired',
                updated_at = ?
            WHERE id = ? AND deleted = 0
            "#,
        )
        .bind(now)
        .bind(&id_str)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Member not found".to_string()));
        }

        resolve_pending_proposals(&mut tx, &id_str, ProposalStatus::Rejected, now).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve member".to_string()))
    }

    async fn find_pending_proposal(&self, member_id: Uuid) -> Result<Option<RenewalProposal>> {
        let row = sqlx::query_as::<_, ProposalRow>(
            r#"
            SELECT id, member_id, source, plan, amount, payment_method,
                   status, requested_at, processed_at
            FROM renewal_proposals
            WHERE member_id = ? AND status = 'pending'
            ORDER BY requested_at DESC
            LIMIT 1
            "#,
        )
        .bind(member_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_proposal(r)?)),
            None => Ok(None),
        }
    }

    async fn soft_delete(&self, id: Uuid) -> Result<Member> {
        let existing = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;

        if existing.deleted {
            return Ok(existing);
        }

        let id_str = id.to_string();
        let now = Utc::now().naive_utc();
        let short = &id_str[..8];

        // Display fields are irreversibly anonymized; the ledger tables
        // reference the id only and are left untouched.
        sqlx::query(
            r#"
            UPDATE members
            SET name = 'Deleted Member',
                email = ?,
                phone = ?,
                deleted = 1,
                deleted_at = ?,
                updated_at = ?
            WHERE id = ? AND deleted = 0
            "#,
        )
        .bind(format!("deleted-{}@anonymized.invalid", short))
        .bind(format!("del-{}", short))
        .bind(now)
        .bind(now)
        .bind(&id_str)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve deleted member".to_string()))
    }

    async fn ledger(&self, member_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT id, member_id, kind, effective_date, duration_months,
                   amount, payment_mode, plan, payment_status,
                   transaction_ref, note, recorded_at
            FROM membership_history
            WHERE member_id = ?
            ORDER BY recorded_at, id
            "#,
        )
        .bind(member_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_ledger_entry).collect()
    }

    async fn renewal_audits(&self, member_id: Uuid) -> Result<Vec<RenewalAudit>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, member_id, plan, start_date, end_date, payment_method,
                   previous_plan, previous_amount, new_amount, requested_at
            FROM renewal_audit
            WHERE member_id = ?
            ORDER BY requested_at, id
            "#,
        )
        .bind(member_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_audit).collect()
    }

    async fn list_lapsed(&self, today: NaiveDate) -> Result<Vec<Member>> {
        let rows = sqlx::query_as::<_, MemberRow>(&format!(
            r#"
            SELECT {} FROM members
            WHERE end_date < ? AND subscription_status <> 'expired' AND deleted = 0
            ORDER BY end_date
            "#,
            MEMBER_COLUMNS
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_member).collect()
    }

    async fn mark_expired(&self, id: Uuid) -> Result<bool> {
        let now = Utc::now().naive_utc();

        // The status guard makes the sweep idempotent: a rerun (or a
        // concurrent sweep) affects zero rows.
        let result = sqlx::query(
            r#"
            UPDATE members
            SET subscription_status = 'expired',
                updated_at = ?
            WHERE id = ? AND subscription_status <> 'expired' AND deleted = 0
            "#,
        )
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_expiring_within(&self, today: NaiveDate, days: i64) -> Result<Vec<Member>> {
        let until = today + chrono::Duration::days(days);
        let rows = sqlx::query_as::<_, MemberRow>(&format!(
            r#"
            SELECT {} FROM members
            WHERE subscription_status = 'active' AND deleted = 0
              AND end_date >= ? AND end_date < ?
            ORDER BY end_date
            "#,
            MEMBER_COLUMNS
        ))
        .bind(today)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_member).collect()
    }
}

pub(crate) async fn insert_ledger_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    member_id: &str,
    entry: &NewLedgerEntry,
    now: NaiveDateTime,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO membership_history (
            id, member_id, kind, effective_date, duration_months, amount,
            payment_mode, plan, payment_status, transaction_ref, note,
            recorded_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(member_id)
    .bind(entry.kind.as_str())
    .bind(entry.effective_date)
    .bind(entry.duration_months)
    .bind(entry.amount)
    .bind(entry.payment_mode.as_str())
    .bind(entry.plan.as_str())
    .bind(entry.payment_status.as_str())
    .bind(&entry.transaction_ref)
    .bind(&entry.note)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(())
}

pub(crate) async fn resolve_pending_proposals(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    member_id: &str,
    status: ProposalStatus,
    now: NaiveDateTime,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE renewal_proposals
        SET status = ?, processed_at = ?
        WHERE member_id = ? AND status = 'pending'
        "#,
    )
    .bind(status.as_str())
    .bind(now)
    .bind(member_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(())
}

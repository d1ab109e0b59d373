use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{NewLedgerEntry, OrderStatus, PaymentOrder, PlanCode, ProposalStatus},
    error::{AppError, Result},
    repository::{
        member_repository::{insert_ledger_entry, resolve_pending_proposals},
        OrderRepository, SettleOutcome,
    },
};

#[derive(FromRow)]
struct OrderRow {
    id: String,
    member_id: String,
    amount: i64,
    currency: String,
    status: String,
    intent: String,
    qr_svg: String,
    external_ref: Option<String>,
    expires_at: NaiveDateTime,
    paid_at: Option<NaiveDateTime>,
    plan: Option<String>,
    is_renewal: i32,
    failure_reason: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const ORDER_COLUMNS: &str = r#"
    id, member_id, amount, currency, status, intent, qr_svg,
    external_ref, expires_at, paid_at, plan, is_renewal,
    failure_reason, created_at, updated_at
"#;

pub struct SqliteOrderRepository {
    pool: SqlitePool,
}

impl SqliteOrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: OrderRow) -> Result<PaymentOrder> {
        let plan = match row.plan {
            Some(ref p) => Some(
                PlanCode::from_str(p)
                    .ok_or_else(|| AppError::Database(format!("Invalid plan code: {}", p)))?,
            ),
            None => None,
        };

        Ok(PaymentOrder {
            id: row.id,
            member_id: Uuid::parse_str(&row.member_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            amount: row.amount,
            currency: row.currency,
            status: OrderStatus::from_str(&row.status)
                .ok_or_else(|| AppError::Database(format!("Invalid order status: {}", row.status)))?,
            intent: row.intent,
            qr_svg: row.qr_svg,
            external_ref: row.external_ref,
            expires_at: DateTime::from_naive_utc_and_offset(row.expires_at, Utc),
            paid_at: row.paid_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            plan,
            is_renewal: row.is_renewal != 0,
            failure_reason: row.failure_reason,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    async fn fetch(&self, order_id: &str) -> Result<PaymentOrder> {
        self.find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment order not found: {}", order_id)))
    }
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn create(&self, order: PaymentOrder) -> Result<PaymentOrder> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO payment_orders (
                id, member_id, amount, currency, status, intent, qr_svg,
                external_ref, expires_at, paid_at, plan, is_renewal,
                failure_reason, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.id)
        .bind(order.member_id.to_string())
        .bind(order.amount)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(&order.intent)
        .bind(&order.qr_svg)
        .bind(&order.external_ref)
        .bind(order.expires_at.naive_utc())
        .bind(order.paid_at.map(|dt| dt.naive_utc()))
        .bind(order.plan.map(|p| p.as_str()))
        .bind(if order.is_renewal { 1i32 } else { 0i32 })
        .bind(&order.failure_reason)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.fetch(&order.id).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<PaymentOrder>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM payment_orders WHERE id = ?",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_order(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_member(&self, member_id: Uuid) -> Result<Vec<PaymentOrder>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM payment_orders WHERE member_id = ? ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .bind(member_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn find_open_by_member(&self, member_id: Uuid) -> Result<Option<PaymentOrder>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {} FROM payment_orders
            WHERE member_id = ? AND status = 'created'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            ORDER_COLUMNS
        ))
        .bind(member_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_order(r)?)),
            None => Ok(None),
        }
    }

    async fn settle_paid(
        &self,
        order_id: &str,
        member_id: Uuid,
        external_ref: &str,
        entry: NewLedgerEntry,
    ) -> Result<SettleOutcome> {
        let now = Utc::now().naive_utc();
        let member_id_str = member_id.to_string();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Guarded flip: exactly one caller wins the transition to paid.
        // The loser sees zero rows affected and reads the stored record.
        let result = sqlx::query(
            r#"
            UPDATE payment_orders
            SET status = 'paid',
                paid_at = ?,
                external_ref = ?,
                failure_reason = NULL,
                updated_at = ?
            WHERE id = ? AND status <> 'paid'
            "#,
        )
        .bind(now)
        .bind(external_ref)
        .bind(now)
        .bind(order_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Ok(SettleOutcome::AlreadyPaid(self.fetch(order_id).await?));
        }

        let member_result = sqlx::query(
            r#"
            UPDATE members
            SET payment_status = 'confirmed',
                subscription_status = 'active',
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(&member_id_str)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if member_result.rows_affected() == 0 {
            return Err(AppError::NotFound("Member not found".to_string()));
        }

        insert_ledger_entry(&mut tx, &member_id_str, &entry, now).await?;
        resolve_pending_proposals(&mut tx, &member_id_str, ProposalStatus::Approved, now).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(SettleOutcome::Settled(self.fetch(order_id).await?))
    }

    async fn mark_failed(&self, order_id: &str, reason: &str) -> Result<PaymentOrder> {
        let now = Utc::now().naive_utc();

        // A paid order is immutable; the guard turns a late failure
        // signal into a read.
        sqlx::query(
            r#"
            UPDATE payment_orders
            SET status = 'failed',
                failure_reason = ?,
                updated_at = ?
            WHERE id = ? AND status <> 'paid'
            "#,
        )
        .bind(reason)
        .bind(now)
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.fetch(order_id).await
    }

    async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payment_orders
            SET status = 'expired',
                updated_at = ?
            WHERE status = 'created' AND expires_at < ?
            "#,
        )
        .bind(now.naive_utc())
        .bind(now.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{
    catalog::PlanCatalog,
    config::UpiConfig,
    domain::{
        LedgerEntryKind, Member, NewLedgerEntry, OrderStatus, OrderStatusView, PaymentMethod,
        PaymentOrder, PaymentStatus, PlanCode, SubscriptionStatus,
    },
    error::{AppError, Result},
    notify::{MemberContact, NotificationKind, NotificationManager},
    payments::upi,
    repository::{MemberRepository, OrderRepository, SettleOutcome},
};

/// Owns the payment-order lifecycle and keeps the member record
/// synchronized with ledger truth. Confirmation may arrive through the
/// gateway webhook or through an administrator; both funnel into
/// [`PaymentOrchestrator::mark_paid`].
pub struct PaymentOrchestrator {
    members: Arc<dyn MemberRepository>,
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<PlanCatalog>,
    notifier: Arc<NotificationManager>,
    upi: UpiConfig,
    webhook_secret: Option<String>,
}

impl PaymentOrchestrator {
    pub fn new(
        members: Arc<dyn MemberRepository>,
        orders: Arc<dyn OrderRepository>,
        catalog: Arc<PlanCatalog>,
        notifier: Arc<NotificationManager>,
        upi: UpiConfig,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            members,
            orders,
            catalog,
            notifier,
            upi,
            webhook_secret,
        }
    }

    /// Creates a payment order for a member. The amount is fixed here,
    /// at creation time; later catalog edits never change it.
    pub async fn create_order(
        &self,
        member_id: Uuid,
        plan: Option<PlanCode>,
        amount: Option<i64>,
        is_renewal: bool,
    ) -> Result<PaymentOrder> {
        let member = self.active_member(member_id).await?;

        let plan = plan.unwrap_or(member.plan);
        let amount = match amount {
            Some(a) if a > 0 => a,
            Some(_) => {
                return Err(AppError::Validation(
                    "Order amount must be positive".to_string(),
                ))
            }
            None => self.catalog.resolve_price(plan).await,
        };

        let payee_vpa = self
            .upi
            .payee_vpa
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::ServiceUnavailable("UPI payee VPA is not configured".to_string())
            })?;

        let id = format!("order_{}", Uuid::new_v4().simple());
        let note = format!("Gym membership {}", plan.as_str());
        let intent = upi::build_intent(
            payee_vpa,
            &self.upi.payee_name,
            amount,
            &self.upi.currency,
            &note,
            &id,
        );
        let qr_svg = upi::render_qr_svg(&intent)?;

        let now = Utc::now();
        let order = PaymentOrder {
            id,
            member_id,
            amount,
            currency: self.upi.currency.clone(),
            status: OrderStatus::Created,
            intent,
            qr_svg,
            external_ref: None,
            expires_at: now + Duration::minutes(self.upi.order_expiry_minutes),
            paid_at: None,
            plan: Some(plan),
            is_renewal,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };

        let order = self.orders.create(order).await?;
        tracing::info!(
            order_id = %order.id,
            member_id = %member_id,
            amount = order.amount,
            "Created payment order"
        );
        Ok(order)
    }

    /// Confirms an order. Idempotent: an already-paid order is returned
    /// unchanged with no further writes, so duplicate webhook deliveries
    /// and a racing admin confirmation cannot double-append the ledger.
    pub async fn mark_paid(
        &self,
        order_id: &str,
        external_ref: Option<String>,
    ) -> Result<PaymentOrder> {
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment order not found: {}", order_id)))?;

        if order.status == OrderStatus::Paid {
            tracing::debug!(order_id = %order.id, "Order already paid, returning stored record");
            return Ok(order);
        }

        let member = self
            .members
            .find_by_id(order.member_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;

        let plan = order.plan.unwrap_or(member.plan);
        let external_ref = external_ref
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| order.id.clone());

        let entry = NewLedgerEntry {
            kind: self.entry_kind(&member, order.is_renewal),
            effective_date: Utc::now().date_naive(),
            duration_months: PlanCatalog::resolve_duration(plan) as i64,
            // The order's recorded amount is authoritative for this
            // transaction; the member's plan may have changed since.
            amount: order.amount,
            payment_mode: PaymentMethod::Online,
            plan,
            payment_status: PaymentStatus::Confirmed,
            transaction_ref: Some(external_ref.clone()),
            note: None,
        };

        match self
            .orders
            .settle_paid(&order.id, order.member_id, &external_ref, entry)
            .await?
        {
            SettleOutcome::Settled(order) => {
                tracing::info!(
                    order_id = %order.id,
                    member_id = %order.member_id,
                    external_ref = %external_ref,
                    "Payment confirmed and settled"
                );
                self.notifier
                    .dispatch(
                        &MemberContact::from_member(&member),
                        NotificationKind::PaymentConfirmed,
                        &json!({
                            "plan": plan.as_str(),
                            "amount": order.amount,
                            "transaction_ref": external_ref,
                        }),
                    )
                    .await;
                Ok(order)
            }
            SettleOutcome::AlreadyPaid(order) => {
                tracing::debug!(order_id = %order.id, "Lost settlement race, returning stored record");
                Ok(order)
            }
        }
    }

    /// Records a failed payment attempt. The member record is not
    /// touched; the order keeps its amount for audit.
    pub async fn mark_failed(&self, order_id: &str, reason: &str) -> Result<PaymentOrder> {
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment order not found: {}", order_id)))?;

        if order.status == OrderStatus::Paid {
            tracing::warn!(
                order_id = %order.id,
                "Ignoring failure signal for an already-paid order"
            );
            return Ok(order);
        }

        let order = self.orders.mark_failed(order_id, reason).await?;
        tracing::warn!(order_id = %order.id, reason = %reason, "Payment order failed");
        Ok(order)
    }

    /// Read-only polling view; exposes no member data.
    pub async fn check_status(&self, order_id: &str) -> Result<OrderStatusView> {
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment order not found: {}", order_id)))?;

        Ok(OrderStatusView::from_order(&order))
    }

    /// Constant-time check of the webhook shared secret. An unconfigured
    /// or empty secret never verifies.
    pub fn verify_webhook(&self, supplied: Option<&str>) -> bool {
        verify_shared_secret(self.webhook_secret.as_deref(), supplied)
    }

    /// Admin confirmation path: cash collections and manual approvals.
    /// When the member has an open online order, that order (and its
    /// recorded amount) is settled through `mark_paid`; otherwise the
    /// amount comes from the catalog for the member's current plan.
    pub async fn admin_confirm(&self, member_id: Uuid) -> Result<Member> {
        let member = self.active_member(member_id).await?;

        if let Some(order) = self.orders.find_open_by_member(member_id).await? {
            self.mark_paid(&order.id, None).await?;
            return self
                .members
                .find_by_id(member_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Member not found".to_string()));
        }

        // Nothing pending to confirm: treat the repeat click as a no-op.
        if member.payment_status == PaymentStatus::Confirmed
            && member.subscription_status == SubscriptionStatus::Active
            && self.members.find_pending_proposal(member_id).await?.is_none()
        {
            return Ok(member);
        }

        let amount = self.catalog.resolve_price(member.plan).await;
        let entry = NewLedgerEntry {
            kind: self.entry_kind(&member, false),
            effective_date: Utc::now().date_naive(),
            duration_months: PlanCatalog::resolve_duration(member.plan) as i64,
            amount,
            payment_mode: member.payment_method,
            plan: member.plan,
            payment_status: PaymentStatus::Confirmed,
            transaction_ref: None,
            note: None,
        };

        let updated = self.members.confirm_subscription(member_id, entry).await?;
        tracing::info!(
            member_id = %member_id,
            plan = member.plan.as_str(),
            amount,
            "Payment confirmed by admin"
        );
        self.notifier
            .dispatch(
                &MemberContact::from_member(&updated),
                NotificationKind::PaymentConfirmed,
                &json!({
                    "plan": updated.plan.as_str(),
                    "amount": amount,
                }),
            )
            .await;
        Ok(updated)
    }

    /// Admin rejection of a pending payment: fails any open order and
    /// drops the subscription to expired. No ledger entry is written.
    pub async fn admin_reject(&self, member_id: Uuid, reason: &str) -> Result<Member> {
        let member = self.active_member(member_id).await?;

        if let Some(order) = self.orders.find_open_by_member(member_id).await? {
            self.orders.mark_failed(&order.id, reason).await?;
        }

        let updated = self.members.reject_pending_renewal(member_id).await?;
        tracing::info!(member_id = %member_id, reason = %reason, "Payment rejected by admin");
        self.notifier
            .dispatch(
                &MemberContact::from_member(&member),
                NotificationKind::PaymentRejected,
                &json!({ "reason": reason }),
            )
            .await;
        Ok(updated)
    }

    fn entry_kind(&self, member: &Member, order_is_renewal: bool) -> LedgerEntryKind {
        // The renewal counter is the single source of truth here; ledger
        // length is never inspected.
        if order_is_renewal || member.has_renewed() {
            LedgerEntryKind::Renewal
        } else {
            LedgerEntryKind::Join
        }
    }

    async fn active_member(&self, member_id: Uuid) -> Result<Member> {
        let member = self
            .members
            .find_by_id(member_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;

        if member.deleted {
            return Err(AppError::NotFound("Member not found".to_string()));
        }
        Ok(member)
    }
}

/// Shared-secret comparison for webhook callers. Constant-time over the
/// supplied bytes; absent or empty values on either side never match.
pub fn verify_shared_secret(configured: Option<&str>, supplied: Option<&str>) -> bool {
    let Some(configured) = configured.filter(|s| !s.is_empty()) else {
        return false;
    };
    let Some(supplied) = supplied.filter(|s| !s.is_empty()) else {
        return false;
    };
    configured.as_bytes().ct_eq(supplied.as_bytes()).into()
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::member::PlanCode;

/// One attempt to collect money through a UPI push-payment intent.
/// Orders are retained forever for audit; `amount` and `status` are
/// immutable once the order reaches [`OrderStatus::Paid`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub id: String,
    pub member_id: Uuid,
    /// Minor-unit-free integer amount, fixed at creation time. Never
    /// recomputed from the member's current plan.
    pub amount: i64,
    pub currency: String,
    pub status: OrderStatus,
    /// The `upi://pay?...` deep link handed to the payer's UPI app.
    pub intent: String,
    pub qr_svg: String,
    pub external_ref: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub plan: Option<PlanCode>,
    pub is_renewal: bool,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
    Paid,
    Failed,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(OrderStatus::Created),
            "paid" => Some(OrderStatus::Paid),
            "failed" => Some(OrderStatus::Failed),
            "expired" => Some(OrderStatus::Expired),
            _ => None,
        }
    }
}

/// The polling view of an order. Safe for unauthenticated callers: no
/// member reference, no intent string.
#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusView {
    pub order_id: String,
    pub status: OrderStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub external_ref: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl OrderStatusView {
    pub fn from_order(order: &PaymentOrder) -> Self {
        Self {
            order_id: order.id.clone(),
            status: order.status,
            paid_at: order.paid_at,
            external_ref: order.external_ref.clone(),
            expires_at: order.expires_at,
        }
    }
}

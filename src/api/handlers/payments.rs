use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{client_key, handlers::members::MemberDto, state::AppState},
    domain::{OrderStatus, OrderStatusView, PaymentOrder, PlanCode},
    error::{AppError, Result},
};

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub member_id: Uuid,
    pub plan: Option<PlanCode>,
    pub amount: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OrderDto {
    pub order_id: String,
    pub intent: String,
    pub qr_svg: String,
    pub amount: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub expires_at: DateTime<Utc>,
}

impl From<PaymentOrder> for OrderDto {
    fn from(order: PaymentOrder) -> Self {
        Self {
            order_id: order.id,
            intent: order.intent,
            qr_svg: order.qr_svg,
            amount: order.amount,
            currency: order.currency,
            status: order.status,
            expires_at: order.expires_at,
        }
    }
}

/// Gateway callback body. The shared secret travels in the
/// `x-webhook-secret` header, not the body.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub order_id: String,
    pub event: String,
    pub transaction_id: Option<String>,
    pub reason: Option<String>,
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderDto>)> {
    let order = state
        .services
        .orchestrator
        .create_order(request.member_id, request.plan, request.amount, false)
        .await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// Unauthenticated polling endpoint; rate-limited and stripped down to
/// non-sensitive fields.
pub async fn order_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<Json<OrderStatusView>> {
    if !state.services.rate_limiter.allow(&client_key(&headers)).await {
        return Err(AppError::BadRequest("Too many requests".to_string()));
    }

    let view = state.services.orchestrator.check_status(&order_id).await?;
    Ok(Json(view))
}

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<WebhookEvent>,
) -> Result<Json<OrderStatusView>> {
    if !state.services.rate_limiter.allow(&client_key(&headers)).await {
        return Err(AppError::BadRequest("Too many requests".to_string()));
    }

    let supplied = headers
        .get("x-webhook-secret")
        .and_then(|value| value.to_str().ok());

    // Authenticity is checked before any state is touched. The log line
    // keeps this distinguishable from an unknown order id; the response
    // body does not.
    if !state.services.orchestrator.verify_webhook(supplied) {
        tracing::warn!(order_id = %event.order_id, "Webhook rejected: bad shared secret");
        return Err(AppError::Unauthorized);
    }

    let order = match event.event.as_str() {
        "paid" => {
            state
                .services
                .orchestrator
                .mark_paid(&event.order_id, event.transaction_id)
                .await?
        }
        "failed" => {
            let reason = event.reason.as_deref().unwrap_or("reported by gateway");
            state
                .services
                .orchestrator
                .mark_failed(&event.order_id, reason)
                .await?
        }
        other => {
            return Err(AppError::BadRequest(format!(
                "Unsupported webhook event: {}",
                other
            )))
        }
    };

    Ok(Json(OrderStatusView::from_order(&order)))
}

#[derive(Debug, Deserialize)]
pub struct RejectPaymentRequest {
    pub reason: Option<String>,
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<MemberDto>> {
    let member = state.services.orchestrator.admin_confirm(member_id).await?;
    Ok(Json(member.into()))
}

pub async fn reject_payment(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Json(request): Json<RejectPaymentRequest>,
) -> Result<Json<MemberDto>> {
    let reason = request.reason.as_deref().unwrap_or("rejected by admin");
    let member = state
        .services
        .orchestrator
        .admin_reject(member_id, reason)
        .await?;
    Ok(Json(member.into()))
}

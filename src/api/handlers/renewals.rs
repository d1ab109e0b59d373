use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{client_key, handlers::members::MemberDto, handlers::payments::OrderDto, state::AppState},
    domain::{MemberSummary, PaymentMethod, PlanCode, SubmitRenewalRequest},
    error::{AppError, Result},
    service::RenewalOutcome,
};

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    token: String,
}

#[derive(Debug, Serialize)]
pub struct RenewalOutcomeDto {
    pub status: &'static str,
    pub member: MemberDto,
    pub payment: Option<OrderDto>,
}

impl From<RenewalOutcome> for RenewalOutcomeDto {
    fn from(outcome: RenewalOutcome) -> Self {
        Self {
            status: "pending",
            member: outcome.member.into(),
            payment: outcome.order.map(Into::into),
        }
    }
}

pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<VerifyParams>,
) -> Result<Json<MemberSummary>> {
    if !state.services.rate_limiter.allow(&client_key(&headers)).await {
        return Err(AppError::BadRequest("Too many requests".to_string()));
    }

    let summary = state
        .services
        .renewal_service
        .verify_renewal_token(&params.token)
        .await?;
    Ok(Json(summary))
}

pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<SubmitRenewalRequest>,
) -> Result<Json<RenewalOutcomeDto>> {
    let outcome = state
        .services
        .renewal_service
        .submit_renewal(request)
        .await?;
    Ok(Json(outcome.into()))
}

#[derive(Debug, Deserialize)]
pub struct LegacyRenewalRequest {
    pub member_id: Uuid,
    pub plan: PlanCode,
    pub payment_method: PaymentMethod,
}

/// Deprecated inline renewal form, kept for the front-desk flow. Routes
/// through the same state machine as the token path.
pub async fn submit_legacy(
    State(state): State<AppState>,
    Json(request): Json<LegacyRenewalRequest>,
) -> Result<Json<RenewalOutcomeDto>> {
    let outcome = state
        .services
        .renewal_service
        .submit_renewal_legacy(request.member_id, request.plan, request.payment_method)
        .await?;
    Ok(Json(outcome.into()))
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

pub async fn issue_token(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<TokenResponse>> {
    let token = state
        .services
        .renewal_service
        .issue_renewal_token(member_id)
        .await?;
    Ok(Json(TokenResponse { token }))
}

pub async fn approve(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<MemberDto>> {
    let member = state
        .services
        .renewal_service
        .approve_renewal(member_id)
        .await?;
    Ok(Json(member.into()))
}

pub async fn reject(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<MemberDto>> {
    let member = state
        .services
        .renewal_service
        .reject_renewal(member_id)
        .await?;
    Ok(Json(member.into()))
}

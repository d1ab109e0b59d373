use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::state::AppState,
    domain::{
        CreateMemberRequest, LedgerEntry, Member, PaymentMethod, PaymentStatus, PlanCode,
        RenewalAudit, SubscriptionStatus, UpdateMemberRequest,
    },
    error::Result,
};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    members: Vec<MemberDto>,
    total: usize,
}

#[derive(Debug, Serialize)]
pub struct MemberDto {
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
    pub original_join_date: Option<NaiveDate>,
    pub renewal_count: i64,
    pub deleted: bool,
    pub created_at: String,
}

impl From<Member> for MemberDto {
    fn from(member: Member) -> Self {
        Self {
            id: member.id,
            name: member.name,
            email: member.email,
            phone: member.phone,
            plan: member.plan,
            start_date: member.start_date,
            end_date: member.end_date,
            payment_method: member.payment_method,
            payment_status: member.payment_status,
            subscription_status: member.subscription_status,
            original_join_date: member.original_join_date,
            renewal_count: member.renewal_count,
            deleted: member.deleted,
            created_at: member.created_at.to_rfc3339(),
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<CreateMemberRequest>,
) -> Result<(StatusCode, Json<MemberDto>)> {
    let member = state.services.member_service.register(request).await?;
    Ok((StatusCode::CREATED, Json(member.into())))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MemberDto>> {
    let member = state.services.member_service.get(id).await?;
    Ok(Json(member.into()))
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>> {
    let members = state
        .services
        .member_service
        .list(params.limit, params.offset)
        .await?;

    let members: Vec<MemberDto> = members.into_iter().map(Into::into).collect();
    let total = members.len();
    Ok(Json(ListResponse { members, total }))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateMemberRequest>,
) -> Result<Json<MemberDto>> {
    let member = state.services.member_service.update(id, request).await?;
    Ok(Json(member.into()))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MemberDto>> {
    let member = state.services.member_service.soft_delete(id).await?;
    Ok(Json(member.into()))
}

pub async fn ledger(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LedgerEntry>>> {
    let entries = state.services.member_service.ledger(id).await?;
    Ok(Json(entries))
}

pub async fn renewal_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RenewalAudit>>> {
    let audits = state.services.member_service.renewal_history(id).await?;
    Ok(Json(audits))
}

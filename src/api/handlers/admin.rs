use std::collections::HashMap;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    api::state::AppState,
    domain::PlanCode,
    error::{AppError, Result},
    service::SweepReport,
};

#[derive(Debug, Serialize)]
pub struct Stats {
    pub members_total: i64,
    pub members_active: i64,
    pub members_expired: i64,
    pub members_pending: i64,
    pub orders_paid: i64,
    pub revenue_confirmed: i64,
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<Stats>> {
    let pool = &state.services.db_pool;

    let members_total =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM members WHERE deleted = 0")
            .fetch_one(pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

    let by_status = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT subscription_status, COUNT(*) FROM members
        WHERE deleted = 0
        GROUP BY subscription_status
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    let mut counts: HashMap<String, i64> = by_status.into_iter().collect();

    let orders_paid =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM payment_orders WHERE status = 'paid'")
            .fetch_one(pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

    // Revenue reporting reads the ledger, so soft-deleted members still
    // count.
    let revenue_confirmed = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(amount), 0) FROM membership_history WHERE payment_status = 'confirmed'",
    )
    .fetch_one(pool)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(Stats {
        members_total,
        members_active: counts.remove("active").unwrap_or(0),
        members_expired: counts.remove("expired").unwrap_or(0),
        members_pending: counts.remove("pending").unwrap_or(0),
        orders_paid,
        revenue_confirmed,
    }))
}

/// On-demand run of the daily sweep.
pub async fn run_sweep(State(state): State<AppState>) -> Result<Json<SweepReport>> {
    let report = state.services.expiry_service.run_sweep().await?;
    Ok(Json(report))
}

pub async fn get_pricing(State(state): State<AppState>) -> Result<Json<HashMap<String, i64>>> {
    let prices = state.services.catalog.all_prices().await;
    Ok(Json(
        prices
            .into_iter()
            .map(|(plan, amount)| (plan.as_str().to_string(), amount))
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct SetPriceRequest {
    pub plan: PlanCode,
    pub amount: i64,
}

pub async fn set_price(
    State(state): State<AppState>,
    Json(request): Json<SetPriceRequest>,
) -> Result<Json<HashMap<String, i64>>> {
    state
        .services
        .catalog
        .set_price(request.plan, request.amount)
        .await?;
    get_pricing(State(state)).await
}

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::helpers::dec_to_f64;
use crate::services::budget::evaluate_budget;
use crate::state::AppState;

/// Current provider spend and degradation flags.
#[derive(Debug, Serialize, ToSchema)]
pub struct UsageResponse {
    /// Spend for the current UTC day (USD)
    pub daily_total_usd: f64,
    /// Spend for the current calendar month (USD)
    pub monthly_total_usd: f64,
    /// Route sampling is widened to save provider calls
    pub reduce_sampling: bool,
    /// Secondary analyses (departure alternatives) are suppressed
    pub low_frequency: bool,
    /// Pipeline is fully disabled until spend drops
    pub disabled: bool,
}

/// Get current API spend and budget degradation state.
#[utoipa::path(
    get,
    path = "/api/v1/usage",
    tag = "Usage",
    responses(
        (status = 200, description = "Current budget state", body = UsageResponse),
    )
)]
pub async fn get_usage(State(state): State<AppState>) -> Result<Json<UsageResponse>, AppError> {
    let budget = evaluate_budget(&state.pool).await?;
    Ok(Json(UsageResponse {
        daily_total_usd: dec_to_f64(budget.daily_total),
        monthly_total_usd: dec_to_f64(budget.monthly_total),
        reduce_sampling: budget.reduce_sampling,
        low_frequency: budget.low_frequency,
        disabled: budget.disabled,
    }))
}

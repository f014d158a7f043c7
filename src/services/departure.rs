//! Departure-time alternatives.
//!
//! Cheap probe: one weather fetch per candidate offset at the route midpoint,
//! scored without the UV and visibility terms (a single mid-route sample says
//! nothing reliable about either across the whole trip). The resulting risk
//! table feeds a model-generated departure analysis.

use chrono::{Duration, Utc};

use crate::db::models::Trip;
use crate::db::queries;
use crate::errors::AppError;
use crate::services::budget::BudgetState;
use crate::services::llm::LlmClient;
use crate::services::pipeline::secondary_analyses_allowed;
use crate::services::risk::{calculate_point_risk, WeatherSample};
use crate::state::AppState;

/// Candidate departure offsets in hours relative to the planned departure.
const HOUR_OFFSETS: [i64; 6] = [-3, -2, -1, 1, 2, 3];

/// Evaluate alternative departure times for a trip.
///
/// Skipped entirely under budget degradation; individual offset failures are
/// logged and dropped rather than failing the analysis.
pub async fn analyze_alternatives(
    state: &AppState,
    trip: &Trip,
    current_risk: i32,
    budget: &BudgetState,
) -> Result<(), AppError> {
    if !secondary_analyses_allowed(budget) {
        tracing::debug!("Budget degraded, skipping departure analysis for trip {}", trip.id);
        return Ok(());
    }

    let mid_lat = (trip.origin_lat + trip.dest_lat) / 2.0;
    let mid_lon = (trip.origin_lon + trip.dest_lon) / 2.0;
    let now = Utc::now();

    let mut alternatives: Vec<serde_json::Value> = Vec::new();

    for offset in HOUR_OFFSETS {
        let alt_departure = trip.departure_at + Duration::hours(offset);
        if alt_departure < now {
            continue;
        }

        match state.weather.fetch(mid_lat, mid_lon, alt_departure).await {
            Ok(outcome) => {
                for entry in &outcome.usage {
                    queries::log_api_usage(&state.pool, entry, Some(trip.id)).await?;
                }

                let weather = &outcome.observation;
                let risk = calculate_point_risk(&WeatherSample {
                    precip_prob: f64::from(weather.precip_prob),
                    precip_intensity: (weather.precip_intensity > 0.0)
                        .then_some(weather.precip_intensity),
                    wind_speed_kmh: weather.wind_speed_kmh,
                    alert_severity: weather.alert_severity,
                    uv_index: None,
                    visibility_km: None,
                });

                alternatives.push(serde_json::json!({
                    "hourOffset": offset,
                    "risk": risk.score,
                }));
            }
            Err(err) => {
                tracing::warn!(
                    "Departure analysis fetch failed for trip {} offset {}h: {}",
                    trip.id,
                    offset,
                    err,
                );
            }
        }
    }

    if alternatives.is_empty() {
        return Ok(());
    }

    let narrative = state
        .llm
        .generate_departure_analysis(
            trip.departure_at,
            current_risk,
            &serde_json::to_string(&alternatives)
                .map_err(|e| AppError::InternalError(e.to_string()))?,
        )
        .await?;

    queries::log_api_usage(&state.pool, &LlmClient::usage(), Some(trip.id)).await?;
    queries::insert_ai_summary(
        &state.pool,
        trip.id,
        trip.departure_at,
        &narrative,
        "departure_analysis",
    )
    .await?;
    Ok(())
}

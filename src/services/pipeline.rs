//! Trip computation pipeline.
//!
//! One run: claim the trip, check budget, compute the route, persist legs,
//! sample the polyline, fetch weather in parallel batches, score risk, persist
//! weather points, update the trip, then best-effort narrative generation.
//! Route and weather data are replaced wholesale on every run, so a rerun
//! never leaves a half-updated mix of old and new points.

use chrono::{Duration, Utc};
use futures::future::join_all;
use uuid::Uuid;

use crate::db::models::Trip;
use crate::db::queries::{self, InsertLegParams, InsertWeatherPointParams};
use crate::errors::AppError;
use crate::services::budget::{evaluate_budget, BudgetState};
use crate::services::{day_scores, departure};
use crate::services::google_routes::{RouteResult, Waypoint};
use crate::services::llm::LlmClient;
use crate::services::risk::{calculate_point_risk, calculate_route_risk};
use crate::services::sampler::{sample_route, SampledPoint};
use crate::services::weather_router::FetchOutcome;
use crate::state::AppState;

/// Weather fetches per parallel batch.
const WEATHER_BATCH_SIZE: usize = 5;

/// Google Routes rejects past departure times; clamp to now + 5 min for the
/// route request only. Stored ETAs still use the trip's stated departure.
const MIN_DEPARTURE_LEAD_SECS: i64 = 300;

/// Run the full pipeline for a trip.
///
/// Unknown or cancelled trips are a logged no-op, as is a trip already being
/// computed by another run. The claim is released on success and failure.
pub async fn run_pipeline(state: &AppState, trip_id: Uuid) -> Result<(), AppError> {
    let Some(trip) = queries::get_trip(&state.pool, trip_id).await? else {
        tracing::warn!("Pipeline triggered for unknown trip {}", trip_id);
        return Ok(());
    };
    if trip.status == "cancelled" {
        return Ok(());
    }

    if !queries::try_claim_trip(&state.pool, trip_id).await? {
        tracing::info!("Trip {} is already computing, skipping run", trip_id);
        return Ok(());
    }

    let result = run_stages(state, &trip).await;

    if let Err(err) = queries::release_trip(&state.pool, trip_id).await {
        tracing::error!("Failed to release computing claim for trip {}: {}", trip_id, err);
    }

    result
}

async fn run_stages(state: &AppState, trip: &Trip) -> Result<(), AppError> {
    let budget = evaluate_budget(&state.pool).await?;
    if budget.disabled {
        tracing::warn!("API budget exceeded, pipeline disabled for trip {}", trip.id);
        return Ok(());
    }

    queries::clear_legs_by_trip(&state.pool, trip.id).await?;
    queries::clear_weather_points_by_trip(&state.pool, trip.id).await?;

    let route = compute_route(state, trip).await?;
    persist_legs(state, trip, &route).await?;

    let reduce_sampling = budget.reduce_sampling || budget.low_frequency;
    let sampled = sample_route(
        &route.encoded_polyline,
        trip.departure_at,
        route.duration_seconds,
        reduce_sampling,
    );

    let outcomes = fetch_weather_batched(state, trip, &sampled).await?;

    let mut aqi: Vec<Option<i32>> = vec![None; sampled.len()];
    if trip.show_air_quality {
        aqi = fetch_air_quality_batched(state, &sampled).await;
    }

    let points: Vec<InsertWeatherPointParams> = sampled
        .iter()
        .zip(outcomes.iter())
        .zip(aqi.iter())
        .map(|((point, outcome), aqi)| build_point_params(point, outcome, *aqi))
        .collect();

    queries::insert_weather_points(&state.pool, trip.id, &points).await?;

    let scores: Vec<i32> = points.iter().map(|p| p.risk_score).collect();
    let route_risk = calculate_route_risk(&scores);

    queries::update_trip_from_pipeline(
        &state.pool,
        trip.id,
        route_risk.score,
        route.distance_meters as f64 / 1000.0,
        route.duration_seconds,
        &route.encoded_polyline,
    )
    .await?;

    // Narrative generation is best-effort: the trip is fully usable without it
    if let Err(err) = generate_summary(state, trip, &route, &points, route_risk.score).await {
        tracing::warn!("AI summary generation failed for trip {}: {}", trip.id, err);
    }
    if let Err(err) =
        departure::analyze_alternatives(state, trip, route_risk.score, &budget).await
    {
        tracing::warn!("Departure analysis failed for trip {}: {}", trip.id, err);
    }
    if let Err(err) = day_scores::compute_weekly_scores(state, trip, &budget).await {
        tracing::warn!("Day score computation failed for trip {}: {}", trip.id, err);
    }

    tracing::info!(
        "Pipeline complete for trip {}: {} weather points, risk {} ({})",
        trip.id,
        points.len(),
        route_risk.score,
        route_risk.level.as_str(),
    );
    Ok(())
}

async fn compute_route(state: &AppState, trip: &Trip) -> Result<RouteResult, AppError> {
    let min_departure = Utc::now() + Duration::seconds(MIN_DEPARTURE_LEAD_SECS);
    let effective_departure = trip.departure_at.max(min_departure);

    let stops: Vec<Waypoint> = trip
        .stops
        .iter()
        .map(|s| Waypoint { lat: s.lat, lon: s.lon })
        .collect();

    let route = state
        .routes_client
        .compute_route(
            Waypoint {
                lat: trip.origin_lat,
                lon: trip.origin_lon,
            },
            Waypoint {
                lat: trip.dest_lat,
                lon: trip.dest_lon,
            },
            &stops,
            Some(effective_departure),
        )
        .await?;

    queries::log_api_usage(
        &state.pool,
        &crate::services::google_routes::RoutesClient::compute_usage(),
        Some(trip.id),
    )
    .await?;

    Ok(route)
}

/// Persist legs with ETAs accumulated from the trip's stated departure.
async fn persist_legs(state: &AppState, trip: &Trip, route: &RouteResult) -> Result<(), AppError> {
    let mut cursor = trip.departure_at;
    let legs: Vec<InsertLegParams> = route
        .legs
        .iter()
        .enumerate()
        .map(|(i, leg)| {
            let start_eta = cursor;
            let end_eta = start_eta + Duration::seconds(leg.duration_seconds);
            cursor = end_eta;
            InsertLegParams {
                leg_index: i as i32,
                start_lat: leg.start_lat,
                start_lon: leg.start_lon,
                end_lat: leg.end_lat,
                end_lon: leg.end_lon,
                start_eta,
                end_eta,
                distance_km: leg.distance_meters as f64 / 1000.0,
                duration_seconds: leg.duration_seconds,
            }
        })
        .collect();

    queries::insert_legs(&state.pool, trip.id, &legs).await?;
    Ok(())
}

/// Fetch weather for all sampled points in parallel batches. Any failed point
/// aborts the run; a trip with gaps in its weather data cannot be scored.
/// Successful fetches in the failing batch were still billed, so their usage
/// entries are logged before the error propagates.
async fn fetch_weather_batched(
    state: &AppState,
    trip: &Trip,
    sampled: &[SampledPoint],
) -> Result<Vec<FetchOutcome>, AppError> {
    let mut outcomes = Vec::with_capacity(sampled.len());

    for batch in sampled.chunks(WEATHER_BATCH_SIZE) {
        let fetches = batch
            .iter()
            .map(|point| state.weather.fetch(point.lat, point.lon, point.eta_at));
        let (succeeded, first_error) = split_batch_results(join_all(fetches).await);

        for outcome in succeeded {
            for entry in &outcome.usage {
                queries::log_api_usage(&state.pool, entry, Some(trip.id)).await?;
            }
            outcomes.push(outcome);
        }
        if let Some(err) = first_error {
            return Err(err);
        }
    }

    Ok(outcomes)
}

/// Separate a batch into its successful outcomes and the first error, if any.
fn split_batch_results(
    results: Vec<Result<FetchOutcome, AppError>>,
) -> (Vec<FetchOutcome>, Option<AppError>) {
    let mut succeeded = Vec::with_capacity(results.len());
    let mut first_error = None;

    for result in results {
        match result {
            Ok(outcome) => succeeded.push(outcome),
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    (succeeded, first_error)
}

/// AQI enrichment is opt-in and tolerant: a failed point stays None.
async fn fetch_air_quality_batched(state: &AppState, sampled: &[SampledPoint]) -> Vec<Option<i32>> {
    let mut results = Vec::with_capacity(sampled.len());

    for batch in sampled.chunks(WEATHER_BATCH_SIZE) {
        let fetches = batch
            .iter()
            .map(|point| state.weather.openweather().fetch_air_quality(point.lat, point.lon));
        for result in join_all(fetches).await {
            match result {
                Ok(aqi) => results.push(aqi),
                Err(err) => {
                    tracing::warn!("Air quality fetch failed: {}", err);
                    results.push(None);
                }
            }
        }
    }

    results
}

fn build_point_params(
    point: &SampledPoint,
    outcome: &FetchOutcome,
    air_quality_index: Option<i32>,
) -> InsertWeatherPointParams {
    let weather = &outcome.observation;
    let risk = calculate_point_risk(&weather.to_sample());

    InsertWeatherPointParams {
        point_index: point.point_index,
        lat: point.lat,
        lon: point.lon,
        eta_at: point.eta_at,
        condition_code: weather.condition_code.clone(),
        precip_prob: weather.precip_prob,
        precip_intensity: (weather.precip_intensity > 0.0).then_some(weather.precip_intensity),
        temp_celsius: weather.temp_celsius,
        wind_speed_kmh: weather.wind_speed_kmh,
        alert_type: weather.alert_type.clone(),
        alert_severity: weather.alert_severity.map(|s| s.as_str().to_string()),
        risk_score: risk.score,
        risk_level: risk.level.as_str().to_string(),
        provider: outcome.provider.to_string(),
        uv_index: weather.uv_index,
        visibility_km: weather.visibility_km,
        dew_point_celsius: weather.dew_point_celsius,
        humidity_percent: weather.humidity_percent,
        cloud_cover_percent: weather.cloud_cover_percent,
        air_quality_index,
    }
}

async fn generate_summary(
    state: &AppState,
    trip: &Trip,
    route: &RouteResult,
    points: &[InsertWeatherPointParams],
    overall_risk_score: i32,
) -> Result<(), AppError> {
    let weather_summary: Vec<serde_json::Value> = points
        .iter()
        .map(|p| {
            serde_json::json!({
                "idx": p.point_index,
                "condition": p.condition_code,
                "temp": p.temp_celsius,
                "precip": p.precip_prob,
                "wind": p.wind_speed_kmh,
                "risk": p.risk_score,
                "alert": p.alert_type,
            })
        })
        .collect();

    let narrative = state
        .llm
        .generate_trip_summary(
            trip.departure_at,
            route.distance_meters as f64 / 1000.0,
            route.duration_seconds,
            overall_risk_score,
            &serde_json::to_string(&weather_summary)
                .map_err(|e| AppError::InternalError(e.to_string()))?,
        )
        .await?;

    queries::log_api_usage(&state.pool, &LlmClient::usage(), Some(trip.id)).await?;
    queries::insert_ai_summary(
        &state.pool,
        trip.id,
        trip.departure_at,
        &narrative,
        "trip_summary",
    )
    .await?;
    Ok(())
}

// Re-exported for the departure analyzer, which applies the same degradation
// rules before spending provider calls.
pub(crate) fn secondary_analyses_allowed(budget: &BudgetState) -> bool {
    !budget.disabled && !budget.low_frequency
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::weather_router::WeatherObservation;

    fn outcome(endpoint: &str) -> FetchOutcome {
        FetchOutcome {
            observation: WeatherObservation {
                condition_code: "clear".to_string(),
                precip_prob: 0,
                precip_intensity: 0.0,
                temp_celsius: 20.0,
                wind_speed_kmh: 5.0,
                alert_type: None,
                alert_severity: None,
                uv_index: None,
                visibility_km: None,
                dew_point_celsius: None,
                humidity_percent: None,
                cloud_cover_percent: None,
            },
            provider: "openweather",
            usage: vec![crate::services::budget::UsageEntry::new(
                "openweather",
                endpoint,
                rust_decimal::Decimal::new(15, 4),
            )],
        }
    }

    #[test]
    fn test_split_batch_keeps_successes_alongside_error() {
        // A failed point must not swallow the usage of billed successes
        let results = vec![
            Ok(outcome("onecall-a")),
            Err(AppError::ExternalServiceError("boom".to_string())),
            Ok(outcome("onecall-b")),
        ];
        let (succeeded, first_error) = split_batch_results(results);
        assert_eq!(succeeded.len(), 2);
        assert_eq!(succeeded[0].usage[0].endpoint, "onecall-a");
        assert_eq!(succeeded[1].usage[0].endpoint, "onecall-b");
        assert!(first_error.is_some());
    }

    #[test]
    fn test_split_batch_reports_first_error_only() {
        let results: Vec<Result<FetchOutcome, AppError>> = vec![
            Err(AppError::ExternalServiceError("first".to_string())),
            Err(AppError::ExternalServiceError("second".to_string())),
        ];
        let (succeeded, first_error) = split_batch_results(results);
        assert!(succeeded.is_empty());
        assert!(first_error.unwrap().to_string().contains("first"));
    }

    #[test]
    fn test_split_batch_all_ok() {
        let results = vec![Ok(outcome("a")), Ok(outcome("b"))];
        let (succeeded, first_error) = split_batch_results(results);
        assert_eq!(succeeded.len(), 2);
        assert!(first_error.is_none());
    }
}

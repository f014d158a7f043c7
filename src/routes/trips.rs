use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::{self, TripStop};
use crate::db::queries::{self, InsertTripParams};
use crate::errors::{AppError, ErrorResponse};
use crate::services::pipeline;
use crate::state::AppState;

/// A geographic location in a trip request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LocationRequest {
    /// Latitude (WGS84)
    pub lat: f64,
    /// Longitude (WGS84)
    pub lon: f64,
    /// Optional display address
    pub address: Option<String>,
}

/// Request body for POST /api/v1/trips.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTripRequest {
    pub origin: LocationRequest,
    pub destination: LocationRequest,
    /// Intermediate stops, in visiting order
    #[serde(default)]
    pub stops: Vec<LocationRequest>,
    /// Planned departure time (RFC 3339)
    pub departure_at: DateTime<Utc>,
    /// Enrich weather points with air quality (extra free-tier calls)
    #[serde(default)]
    pub show_air_quality: bool,
}

/// Trip representation returned by all trip endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct TripResponse {
    pub id: Uuid,
    pub origin_lat: f64,
    pub origin_lon: f64,
    pub origin_address: Option<String>,
    pub dest_lat: f64,
    pub dest_lon: f64,
    pub dest_address: Option<String>,
    pub stops: Vec<StopResponse>,
    pub departure_at: String,
    /// planning | active | completed | cancelled
    pub status: String,
    /// True while a pipeline run is in progress
    pub computing: bool,
    pub show_air_quality: bool,
    /// 0 (safe) to 100 (extreme), set once the pipeline has run
    pub overall_risk_score: Option<i32>,
    pub total_distance_km: Option<f64>,
    pub total_duration_seconds: Option<i64>,
    pub encoded_polyline: Option<String>,
    pub last_weather_fetch_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StopResponse {
    pub lat: f64,
    pub lon: f64,
    pub address: Option<String>,
}

impl From<models::Trip> for TripResponse {
    fn from(t: models::Trip) -> Self {
        Self {
            id: t.id,
            origin_lat: t.origin_lat,
            origin_lon: t.origin_lon,
            origin_address: t.origin_address,
            dest_lat: t.dest_lat,
            dest_lon: t.dest_lon,
            dest_address: t.dest_address,
            stops: t
                .stops
                .0
                .into_iter()
                .map(|s| StopResponse {
                    lat: s.lat,
                    lon: s.lon,
                    address: s.address,
                })
                .collect(),
            departure_at: t.departure_at.to_rfc3339(),
            status: t.status,
            computing: t.computing,
            show_air_quality: t.show_air_quality,
            overall_risk_score: t.overall_risk_score,
            total_distance_km: t.total_distance_km,
            total_duration_seconds: t.total_duration_seconds,
            encoded_polyline: t.encoded_polyline,
            last_weather_fetch_at: t.last_weather_fetch_at.map(|d| d.to_rfc3339()),
            created_at: t.created_at.to_rfc3339(),
        }
    }
}

/// One route leg in the weather response.
#[derive(Debug, Serialize, ToSchema)]
pub struct LegResponse {
    pub leg_index: i32,
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    pub start_eta: String,
    pub end_eta: String,
    pub distance_km: f64,
    pub duration_seconds: i64,
}

/// One weather-scored sample point.
#[derive(Debug, Serialize, ToSchema)]
pub struct WeatherPointResponse {
    pub point_index: i32,
    pub lat: f64,
    pub lon: f64,
    pub eta_at: String,
    pub condition_code: String,
    pub precip_prob: i32,
    pub precip_intensity: Option<f64>,
    pub temp_celsius: f64,
    pub wind_speed_kmh: f64,
    pub alert_type: Option<String>,
    pub alert_severity: Option<String>,
    pub risk_score: i32,
    pub risk_level: String,
    pub provider: String,
    pub uv_index: Option<f64>,
    pub visibility_km: Option<f64>,
    pub dew_point_celsius: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub cloud_cover_percent: Option<f64>,
    pub air_quality_index: Option<i32>,
}

/// Response for GET /api/v1/trips/:id/weather.
#[derive(Debug, Serialize, ToSchema)]
pub struct TripWeatherResponse {
    pub legs: Vec<LegResponse>,
    pub points: Vec<WeatherPointResponse>,
}

/// One generated advisory.
#[derive(Debug, Serialize, ToSchema)]
pub struct AlertResponse {
    pub id: Uuid,
    pub alert_type: String,
    pub severity: String,
    pub title: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}

/// Latest narratives for a trip.
#[derive(Debug, Serialize, ToSchema)]
pub struct TripSummaryResponse {
    pub trip_summary: Option<SummaryResponse>,
    pub departure_analysis: Option<SummaryResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryResponse {
    pub recommendation: String,
    pub reasons: Vec<String>,
    pub confidence: f64,
    pub best_window_start_hour: Option<i32>,
    pub best_window_end_hour: Option<i32>,
    pub best_window_risk_reduction: Option<i32>,
    pub created_at: String,
}

impl From<models::AiSummary> for SummaryResponse {
    fn from(s: models::AiSummary) -> Self {
        Self {
            recommendation: s.recommendation,
            reasons: s.reasons.0,
            confidence: s.confidence,
            best_window_start_hour: s.best_window_start_hour,
            best_window_end_hour: s.best_window_end_hour,
            best_window_risk_reduction: s.best_window_risk_reduction,
            created_at: s.created_at.to_rfc3339(),
        }
    }
}

/// One day of the week-ahead departure scores. Score and hour are null for
/// days not yet computed.
#[derive(Debug, Serialize, ToSchema)]
pub struct DayScoreResponse {
    /// ISO date (YYYY-MM-DD)
    pub date: String,
    /// 100 is a perfect driving day, 0 the worst
    pub overall_score: Option<i32>,
    /// Best of the probed departure hours (8, 12, or 16 UTC)
    pub best_departure_hour: Option<i32>,
}

fn validate_location(loc: &LocationRequest, label: &str) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&loc.lat) || !(-180.0..=180.0).contains(&loc.lon) {
        return Err(AppError::BadRequest(format!(
            "Invalid {label} coordinates ({}, {})",
            loc.lat, loc.lon
        )));
    }
    Ok(())
}

/// Create a trip and start its first pipeline run in the background.
#[utoipa::path(
    post,
    path = "/api/v1/trips",
    tag = "Trips",
    request_body = CreateTripRequest,
    responses(
        (status = 201, description = "Trip created, pipeline started", body = TripResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
    )
)]
pub async fn create_trip(
    State(state): State<AppState>,
    Json(body): Json<CreateTripRequest>,
) -> Result<(StatusCode, Json<TripResponse>), AppError> {
    validate_location(&body.origin, "origin")?;
    validate_location(&body.destination, "destination")?;
    for stop in &body.stops {
        validate_location(stop, "stop")?;
    }

    let trip = queries::insert_trip(
        &state.pool,
        InsertTripParams {
            origin_lat: body.origin.lat,
            origin_lon: body.origin.lon,
            origin_address: body.origin.address,
            dest_lat: body.destination.lat,
            dest_lon: body.destination.lon,
            dest_address: body.destination.address,
            stops: body
                .stops
                .into_iter()
                .map(|s| TripStop {
                    lat: s.lat,
                    lon: s.lon,
                    address: s.address,
                })
                .collect(),
            departure_at: body.departure_at,
            show_air_quality: body.show_air_quality,
        },
    )
    .await?;

    spawn_pipeline(state, trip.id);
    Ok((StatusCode::CREATED, Json(TripResponse::from(trip))))
}

/// Get a trip by ID.
#[utoipa::path(
    get,
    path = "/api/v1/trips/{id}",
    tag = "Trips",
    params(("id" = Uuid, Path, description = "Trip UUID")),
    responses(
        (status = 200, description = "The trip", body = TripResponse),
        (status = 404, description = "Trip not found", body = ErrorResponse),
    )
)]
pub async fn get_trip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TripResponse>, AppError> {
    let trip = load_trip(&state, id).await?;
    Ok(Json(TripResponse::from(trip)))
}

/// Trigger a fresh pipeline run for a trip.
#[utoipa::path(
    post,
    path = "/api/v1/trips/{id}/recompute",
    tag = "Trips",
    params(("id" = Uuid, Path, description = "Trip UUID")),
    responses(
        (status = 202, description = "Recomputation started"),
        (status = 404, description = "Trip not found", body = ErrorResponse),
    )
)]
pub async fn recompute_trip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let trip = load_trip(&state, id).await?;
    spawn_pipeline(state, trip.id);
    Ok(StatusCode::ACCEPTED)
}

/// Get the computed legs and weather points for a trip.
#[utoipa::path(
    get,
    path = "/api/v1/trips/{id}/weather",
    tag = "Trips",
    params(("id" = Uuid, Path, description = "Trip UUID")),
    responses(
        (status = 200, description = "Legs and weather points", body = TripWeatherResponse),
        (status = 404, description = "Trip not found", body = ErrorResponse),
    )
)]
pub async fn get_trip_weather(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TripWeatherResponse>, AppError> {
    let trip = load_trip(&state, id).await?;

    let legs = queries::list_trip_legs(&state.pool, trip.id).await?;
    let points = queries::list_weather_points(&state.pool, trip.id).await?;

    Ok(Json(TripWeatherResponse {
        legs: legs
            .into_iter()
            .map(|l| LegResponse {
                leg_index: l.leg_index,
                start_lat: l.start_lat,
                start_lon: l.start_lon,
                end_lat: l.end_lat,
                end_lon: l.end_lon,
                start_eta: l.start_eta.to_rfc3339(),
                end_eta: l.end_eta.to_rfc3339(),
                distance_km: l.distance_km,
                duration_seconds: l.duration_seconds,
            })
            .collect(),
        points: points
            .into_iter()
            .map(|p| WeatherPointResponse {
                point_index: p.point_index,
                lat: p.lat,
                lon: p.lon,
                eta_at: p.eta_at.to_rfc3339(),
                condition_code: p.condition_code,
                precip_prob: p.precip_prob,
                precip_intensity: p.precip_intensity,
                temp_celsius: p.temp_celsius,
                wind_speed_kmh: p.wind_speed_kmh,
                alert_type: p.alert_type,
                alert_severity: p.alert_severity,
                risk_score: p.risk_score,
                risk_level: p.risk_level,
                provider: p.provider,
                uv_index: p.uv_index,
                visibility_km: p.visibility_km,
                dew_point_celsius: p.dew_point_celsius,
                humidity_percent: p.humidity_percent,
                cloud_cover_percent: p.cloud_cover_percent,
                air_quality_index: p.air_quality_index,
            })
            .collect(),
    }))
}

/// List alerts for a trip, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/trips/{id}/alerts",
    tag = "Trips",
    params(("id" = Uuid, Path, description = "Trip UUID")),
    responses(
        (status = 200, description = "Alerts for the trip", body = Vec<AlertResponse>),
        (status = 404, description = "Trip not found", body = ErrorResponse),
    )
)]
pub async fn get_trip_alerts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AlertResponse>>, AppError> {
    let trip = load_trip(&state, id).await?;
    let alerts = queries::list_alerts_by_trip(&state.pool, trip.id).await?;
    Ok(Json(
        alerts
            .into_iter()
            .map(|a| AlertResponse {
                id: a.id,
                alert_type: a.alert_type,
                severity: a.severity,
                title: a.title,
                message: a.message,
                metadata: a.metadata,
                created_at: a.created_at.to_rfc3339(),
            })
            .collect(),
    ))
}

/// Get the latest generated narratives for a trip.
#[utoipa::path(
    get,
    path = "/api/v1/trips/{id}/summary",
    tag = "Trips",
    params(("id" = Uuid, Path, description = "Trip UUID")),
    responses(
        (status = 200, description = "Latest narratives (null when not yet generated)", body = TripSummaryResponse),
        (status = 404, description = "Trip not found", body = ErrorResponse),
    )
)]
pub async fn get_trip_summary(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TripSummaryResponse>, AppError> {
    let trip = load_trip(&state, id).await?;

    let trip_summary = queries::latest_ai_summary(&state.pool, trip.id, "trip_summary").await?;
    let departure_analysis =
        queries::latest_ai_summary(&state.pool, trip.id, "departure_analysis").await?;

    Ok(Json(TripSummaryResponse {
        trip_summary: trip_summary.map(SummaryResponse::from),
        departure_analysis: departure_analysis.map(SummaryResponse::from),
    }))
}

/// Get the week-ahead departure scores for a trip.
#[utoipa::path(
    get,
    path = "/api/v1/trips/{id}/day-scores",
    tag = "Trips",
    params(("id" = Uuid, Path, description = "Trip UUID")),
    responses(
        (status = 200, description = "Seven days of departure scores, starting today", body = Vec<DayScoreResponse>),
        (status = 404, description = "Trip not found", body = ErrorResponse),
    )
)]
pub async fn get_trip_day_scores(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DayScoreResponse>>, AppError> {
    let trip = load_trip(&state, id).await?;
    let scores = queries::list_day_scores(&state.pool, trip.id).await?;

    let week = crate::services::day_scores::week_ahead(Utc::now().date_naive());
    Ok(Json(
        week.into_iter()
            .map(|date| {
                let score = scores.iter().find(|s| s.date == date);
                DayScoreResponse {
                    date: date.to_string(),
                    overall_score: score.map(|s| s.overall_score),
                    best_departure_hour: score.and_then(|s| s.best_departure_hour),
                }
            })
            .collect(),
    ))
}

async fn load_trip(state: &AppState, id: Uuid) -> Result<models::Trip, AppError> {
    queries::get_trip(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Trip {} not found", id)))
}

fn spawn_pipeline(state: AppState, trip_id: Uuid) {
    tokio::spawn(async move {
        if let Err(err) = pipeline::run_pipeline(&state, trip_id).await {
            tracing::error!("Pipeline failed for trip {}: {}", trip_id, err);
        }
    });
}

use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{AiSummary, Alert, Trip, TripDayScore, TripLeg, TripStop, TripWeatherPoint};
use crate::services::budget::UsageEntry;
use crate::services::llm::TripNarrative;

/// Parameters for creating a new trip.
pub struct InsertTripParams {
    pub origin_lat: f64,
    pub origin_lon: f64,
    pub origin_address: Option<String>,
    pub dest_lat: f64,
    pub dest_lon: f64,
    pub dest_address: Option<String>,
    pub stops: Vec<TripStop>,
    pub departure_at: chrono::DateTime<chrono::Utc>,
    pub show_air_quality: bool,
}

/// Parameters for one leg row, written in batch after route computation.
pub struct InsertLegParams {
    pub leg_index: i32,
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    pub start_eta: chrono::DateTime<chrono::Utc>,
    pub end_eta: chrono::DateTime<chrono::Utc>,
    pub distance_km: f64,
    pub duration_seconds: i64,
}

/// Parameters for one weather point row, written in batch per pipeline run.
pub struct InsertWeatherPointParams {
    pub point_index: i32,
    pub lat: f64,
    pub lon: f64,
    pub eta_at: chrono::DateTime<chrono::Utc>,
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

/// Parameters for a generated advisory.
pub struct InsertAlertParams {
    pub trip_id: Uuid,
    pub alert_type: &'static str,
    pub severity: &'static str,
    pub title: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

const TRIP_COLUMNS: &str = "id, origin_lat, origin_lon, origin_address, dest_lat, dest_lon, \
     dest_address, stops, departure_at, status, computing, show_air_quality, overall_risk_score, \
     total_distance_km, total_duration_seconds, encoded_polyline, last_weather_fetch_at, \
     created_at, updated_at";

pub async fn insert_trip(pool: &PgPool, params: InsertTripParams) -> Result<Trip, sqlx::Error> {
    sqlx::query_as::<_, Trip>(&format!(
        "INSERT INTO trips (
            id, origin_lat, origin_lon, origin_address, dest_lat, dest_lon, dest_address,
            stops, departure_at, show_air_quality
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {TRIP_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(params.origin_lat)
    .bind(params.origin_lon)
    .bind(&params.origin_address)
    .bind(params.dest_lat)
    .bind(params.dest_lon)
    .bind(&params.dest_address)
    .bind(Json(params.stops))
    .bind(params.departure_at)
    .bind(params.show_air_quality)
    .fetch_one(pool)
    .await
}

pub async fn get_trip(pool: &PgPool, id: Uuid) -> Result<Option<Trip>, sqlx::Error> {
    sqlx::query_as::<_, Trip>(&format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Trips the background evaluators care about.
pub async fn list_active_trips(pool: &PgPool) -> Result<Vec<Trip>, sqlx::Error> {
    sqlx::query_as::<_, Trip>(&format!(
        "SELECT {TRIP_COLUMNS} FROM trips WHERE status = 'active' ORDER BY departure_at"
    ))
    .fetch_all(pool)
    .await
}

/// Claim the trip for a pipeline run. Returns false when another run already
/// holds the claim; the conditional UPDATE makes the check-and-set atomic.
pub async fn try_claim_trip(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE trips SET computing = TRUE, updated_at = NOW()
         WHERE id = $1 AND computing = FALSE",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn release_trip(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE trips SET computing = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Write pipeline results onto the trip and promote it to active.
pub async fn update_trip_from_pipeline(
    pool: &PgPool,
    id: Uuid,
    overall_risk_score: i32,
    total_distance_km: f64,
    total_duration_seconds: i64,
    encoded_polyline: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE trips
         SET overall_risk_score = $2,
             total_distance_km = $3,
             total_duration_seconds = $4,
             encoded_polyline = $5,
             status = 'active',
             last_weather_fetch_at = NOW(),
             updated_at = NOW()
         WHERE id = $1",
    )
    .bind(id)
    .bind(overall_risk_score)
    .bind(total_distance_km)
    .bind(total_duration_seconds)
    .bind(encoded_polyline)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn clear_legs_by_trip(pool: &PgPool, trip_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM trip_legs WHERE trip_id = $1")
        .bind(trip_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn clear_weather_points_by_trip(pool: &PgPool, trip_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM trip_weather_points WHERE trip_id = $1")
        .bind(trip_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_legs(
    pool: &PgPool,
    trip_id: Uuid,
    legs: &[InsertLegParams],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for leg in legs {
        sqlx::query(
            "INSERT INTO trip_legs (
                id, trip_id, leg_index, start_lat, start_lon, end_lat, end_lon,
                start_eta, end_eta, distance_km, duration_seconds
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(Uuid::new_v4())
        .bind(trip_id)
        .bind(leg.leg_index)
        .bind(leg.start_lat)
        .bind(leg.start_lon)
        .bind(leg.end_lat)
        .bind(leg.end_lon)
        .bind(leg.start_eta)
        .bind(leg.end_eta)
        .bind(leg.distance_km)
        .bind(leg.duration_seconds)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

pub async fn insert_weather_points(
    pool: &PgPool,
    trip_id: Uuid,
    points: &[InsertWeatherPointParams],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for point in points {
        sqlx::query(
            "INSERT INTO trip_weather_points (
                id, trip_id, point_index, lat, lon, eta_at, condition_code,
                precip_prob, precip_intensity, temp_celsius, wind_speed_kmh,
                alert_type, alert_severity, risk_score, risk_level, provider,
                uv_index, visibility_km, dew_point_celsius, humidity_percent,
                cloud_cover_percent, air_quality_index
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22
            )",
        )
        .bind(Uuid::new_v4())
        .bind(trip_id)
        .bind(point.point_index)
        .bind(point.lat)
        .bind(point.lon)
        .bind(point.eta_at)
        .bind(&point.condition_code)
        .bind(point.precip_prob)
        .bind(point.precip_intensity)
        .bind(point.temp_celsius)
        .bind(point.wind_speed_kmh)
        .bind(&point.alert_type)
        .bind(&point.alert_severity)
        .bind(point.risk_score)
        .bind(&point.risk_level)
        .bind(&point.provider)
        .bind(point.uv_index)
        .bind(point.visibility_km)
        .bind(point.dew_point_celsius)
        .bind(point.humidity_percent)
        .bind(point.cloud_cover_percent)
        .bind(point.air_quality_index)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

pub async fn list_trip_legs(pool: &PgPool, trip_id: Uuid) -> Result<Vec<TripLeg>, sqlx::Error> {
    sqlx::query_as::<_, TripLeg>(
        "SELECT id, trip_id, leg_index, start_lat, start_lon, end_lat, end_lon,
                start_eta, end_eta, distance_km, duration_seconds
         FROM trip_legs WHERE trip_id = $1 ORDER BY leg_index",
    )
    .bind(trip_id)
    .fetch_all(pool)
    .await
}

pub async fn list_weather_points(
    pool: &PgPool,
    trip_id: Uuid,
) -> Result<Vec<TripWeatherPoint>, sqlx::Error> {
    sqlx::query_as::<_, TripWeatherPoint>(
        "SELECT id, trip_id, point_index, lat, lon, eta_at, condition_code,
                precip_prob, precip_intensity, temp_celsius, wind_speed_kmh,
                alert_type, alert_severity, risk_score, risk_level, provider,
                uv_index, visibility_km, dew_point_celsius, humidity_percent,
                cloud_cover_percent, air_quality_index
         FROM trip_weather_points WHERE trip_id = $1 ORDER BY point_index",
    )
    .bind(trip_id)
    .fetch_all(pool)
    .await
}

pub async fn insert_alert(pool: &PgPool, params: InsertAlertParams) -> Result<Alert, sqlx::Error> {
    sqlx::query_as::<_, Alert>(
        "INSERT INTO alerts (id, trip_id, alert_type, severity, title, message, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING id, trip_id, alert_type, severity, title, message, metadata,
                   read_at, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(params.trip_id)
    .bind(params.alert_type)
    .bind(params.severity)
    .bind(&params.title)
    .bind(&params.message)
    .bind(&params.metadata)
    .fetch_one(pool)
    .await
}

pub async fn list_alerts_by_trip(pool: &PgPool, trip_id: Uuid) -> Result<Vec<Alert>, sqlx::Error> {
    sqlx::query_as::<_, Alert>(
        "SELECT id, trip_id, alert_type, severity, title, message, metadata,
                read_at, created_at
         FROM alerts WHERE trip_id = $1 ORDER BY created_at DESC",
    )
    .bind(trip_id)
    .fetch_all(pool)
    .await
}

pub async fn insert_ai_summary(
    pool: &PgPool,
    trip_id: Uuid,
    departure_at: chrono::DateTime<chrono::Utc>,
    narrative: &TripNarrative,
    analysis_type: &str,
) -> Result<(), sqlx::Error> {
    let window = narrative.best_window.as_ref();
    sqlx::query(
        "INSERT INTO ai_summaries (
            id, trip_id, departure_at, recommendation, reasons, confidence,
            best_window_start_hour, best_window_end_hour, best_window_risk_reduction,
            analysis_type
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(Uuid::new_v4())
    .bind(trip_id)
    .bind(departure_at)
    .bind(&narrative.recommendation)
    .bind(Json(narrative.reasons.clone()))
    .bind(narrative.confidence)
    .bind(window.map(|w| w.start_hour))
    .bind(window.map(|w| w.end_hour))
    .bind(window.map(|w| w.risk_reduction))
    .bind(analysis_type)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn latest_ai_summary(
    pool: &PgPool,
    trip_id: Uuid,
    analysis_type: &str,
) -> Result<Option<AiSummary>, sqlx::Error> {
    sqlx::query_as::<_, AiSummary>(
        "SELECT id, trip_id, departure_at, recommendation, reasons, confidence,
                best_window_start_hour, best_window_end_hour, best_window_risk_reduction,
                analysis_type, created_at
         FROM ai_summaries
         WHERE trip_id = $1 AND analysis_type = $2
         ORDER BY created_at DESC
         LIMIT 1",
    )
    .bind(trip_id)
    .bind(analysis_type)
    .fetch_optional(pool)
    .await
}

pub async fn upsert_day_score(
    pool: &PgPool,
    trip_id: Uuid,
    date: chrono::NaiveDate,
    overall_score: i32,
    best_departure_hour: Option<i32>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO trip_day_scores (id, trip_id, date, overall_score, best_departure_hour)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (trip_id, date) DO UPDATE
         SET overall_score = EXCLUDED.overall_score,
             best_departure_hour = EXCLUDED.best_departure_hour,
             updated_at = NOW()",
    )
    .bind(Uuid::new_v4())
    .bind(trip_id)
    .bind(date)
    .bind(overall_score)
    .bind(best_departure_hour)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_day_scores(
    pool: &PgPool,
    trip_id: Uuid,
) -> Result<Vec<TripDayScore>, sqlx::Error> {
    sqlx::query_as::<_, TripDayScore>(
        "SELECT id, trip_id, date, overall_score, best_departure_hour, updated_at
         FROM trip_day_scores WHERE trip_id = $1 ORDER BY date",
    )
    .bind(trip_id)
    .fetch_all(pool)
    .await
}

/// When the trip's day scores were last refreshed, if ever.
pub async fn day_scores_refreshed_at(
    pool: &PgPool,
    trip_id: Uuid,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<chrono::DateTime<chrono::Utc>>>(
        "SELECT MAX(updated_at) FROM trip_day_scores WHERE trip_id = $1",
    )
    .bind(trip_id)
    .fetch_one(pool)
    .await
}

/// Append one provider call to the cost ledger.
pub async fn log_api_usage(
    pool: &PgPool,
    entry: &UsageEntry,
    trip_id: Option<Uuid>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO api_usage (id, provider, endpoint, estimated_cost_usd, date, trip_id)
         VALUES ($1, $2, $3, $4, CURRENT_DATE, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(entry.provider)
    .bind(&entry.endpoint)
    .bind(entry.cost_usd)
    .bind(trip_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Summed ledger costs for the current UTC day and calendar month.
pub async fn usage_totals(pool: &PgPool) -> Result<(Decimal, Decimal), sqlx::Error> {
    sqlx::query_as::<_, (Decimal, Decimal)>(
        "SELECT COALESCE(SUM(estimated_cost_usd) FILTER (WHERE date = CURRENT_DATE), 0),
                COALESCE(SUM(estimated_cost_usd), 0)
         FROM api_usage
         WHERE date >= date_trunc('month', CURRENT_DATE)::date",
    )
    .fetch_one(pool)
    .await
}

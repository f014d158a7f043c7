use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// An intermediate stop stored on the trip row as JSONB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripStop {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// A planned trip. Route and risk columns are NULL until the first pipeline
/// run completes; `computing` is the per-trip pipeline claim.
#[derive(Debug, Clone, FromRow)]
pub struct Trip {
    pub id: Uuid,
    pub origin_lat: f64,
    pub origin_lon: f64,
    pub origin_address: Option<String>,
    pub dest_lat: f64,
    pub dest_lon: f64,
    pub dest_address: Option<String>,
    pub stops: Json<Vec<TripStop>>,
    pub departure_at: DateTime<Utc>,
    /// planning | active | completed | cancelled
    pub status: String,
    pub computing: bool,
    pub show_air_quality: bool,
    pub overall_risk_score: Option<i32>,
    pub total_distance_km: Option<f64>,
    pub total_duration_seconds: Option<i64>,
    pub encoded_polyline: Option<String>,
    pub last_weather_fetch_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One driving segment of a computed route (between consecutive stops).
#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)] // All fields populated by FromRow; some accessed only via route serialization
pub struct TripLeg {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub leg_index: i32,
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    pub start_eta: DateTime<Utc>,
    pub end_eta: DateTime<Utc>,
    pub distance_km: f64,
    pub duration_seconds: i64,
}

/// A weather-scored sample point along a computed route. Replaced wholesale
/// on each pipeline run.
#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)] // All fields populated by FromRow; some accessed only via route serialization
pub struct TripWeatherPoint {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub point_index: i32,
    pub lat: f64,
    pub lon: f64,
    pub eta_at: DateTime<Utc>,
    pub condition_code: String,
    pub precip_prob: i32,
    pub precip_intensity: Option<f64>,
    pub temp_celsius: f64,
    pub wind_speed_kmh: f64,
    pub alert_type: Option<String>,
    /// minor | moderate | severe | extreme
    pub alert_severity: Option<String>,
    pub risk_score: i32,
    /// low | moderate | high | extreme
    pub risk_level: String,
    pub provider: String,
    pub uv_index: Option<f64>,
    pub visibility_km: Option<f64>,
    pub dew_point_celsius: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub cloud_cover_percent: Option<f64>,
    pub air_quality_index: Option<i32>,
}

/// A generated advisory for a trip.
#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)]
pub struct Alert {
    pub id: Uuid,
    pub trip_id: Uuid,
    /// high_risk | weather_change | departure_suggestion | rain_imminent | system
    pub alert_type: String,
    /// info | warning | critical
    pub severity: String,
    pub title: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One day's departure score for a trip (inverse risk, best hour of 8/12/16).
#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)]
pub struct TripDayScore {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub date: chrono::NaiveDate,
    pub overall_score: i32,
    pub best_departure_hour: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

/// A model-generated trip narrative (trip_summary or departure_analysis).
#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)]
pub struct AiSummary {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub departure_at: DateTime<Utc>,
    pub recommendation: String,
    pub reasons: Json<Vec<String>>,
    pub confidence: f64,
    pub best_window_start_hour: Option<i32>,
    pub best_window_end_hour: Option<i32>,
    pub best_window_risk_reduction: Option<i32>,
    pub analysis_type: String,
    pub created_at: DateTime<Utc>,
}

//! Alert engine: derives advisories from persisted trip data.
//!
//! Three evaluators: high-risk segments and severe provider alerts from the
//! stored weather points, a departure-window suggestion from the overall trip
//! score, and an imminent-rain check from the minutely nowcast for trips
//! departing within the hour.

use chrono::{DateTime, Duration, Utc};

use crate::db::models::{Trip, TripWeatherPoint};
use crate::db::queries::{self, InsertAlertParams};
use crate::errors::AppError;
use crate::services::budget::evaluate_budget;
use crate::services::openweather::{MinutelyPrecip, OpenWeatherClient};
use crate::state::AppState;

/// Point risk score above which a high_risk alert fires.
const HIGH_RISK_THRESHOLD: i32 = 60;

/// Point risk score above which the high_risk alert escalates to critical.
const CRITICAL_RISK_THRESHOLD: i32 = 75;

/// Overall trip score at or above which a departure suggestion fires.
const DEPARTURE_SUGGESTION_THRESHOLD: i32 = 30;

/// Nowcast window length in minutes.
const NOWCAST_MINUTES: usize = 30;

/// Evaluate a trip's stored weather points for alert-worthy conditions.
pub async fn evaluate_trip(state: &AppState, trip: &Trip) -> Result<(), AppError> {
    if trip.status == "cancelled" {
        return Ok(());
    }

    let points = queries::list_weather_points(&state.pool, trip.id).await?;
    if points.is_empty() {
        return Ok(());
    }

    if let Some(worst) = worst_high_risk_point(&points) {
        let (severity, label) = if worst.risk_score > CRITICAL_RISK_THRESHOLD {
            ("critical", "Extreme")
        } else {
            ("warning", "High")
        };

        queries::insert_alert(
            &state.pool,
            InsertAlertParams {
                trip_id: trip.id,
                alert_type: "high_risk",
                severity,
                title: format!("{label} risk on your route"),
                message: format!(
                    "{} risk conditions detected ({}/100) at a point on your route. \
                     Condition: {}, precipitation {}%.",
                    label, worst.risk_score, worst.condition_code, worst.precip_prob,
                ),
                metadata: Some(serde_json::json!({
                    "pointIndex": worst.point_index,
                    "riskScore": worst.risk_score,
                    "conditionCode": worst.condition_code,
                })),
            },
        )
        .await?;
    }

    let severe_count = points
        .iter()
        .filter(|p| {
            matches!(p.alert_severity.as_deref(), Some("severe") | Some("extreme"))
        })
        .count();
    if severe_count > 0 {
        queries::insert_alert(
            &state.pool,
            InsertAlertParams {
                trip_id: trip.id,
                alert_type: "weather_change",
                severity: "critical",
                title: "Severe weather alert".to_string(),
                message: format!(
                    "{severe_count} active weather alert(s) on your route. \
                     Consider rescheduling your trip."
                ),
                metadata: None,
            },
        )
        .await?;
    }

    Ok(())
}

/// Suggest shifting departure when the overall trip risk is moderate or worse.
pub async fn evaluate_departure_window(state: &AppState, trip: &Trip) -> Result<(), AppError> {
    let score = trip.overall_risk_score.unwrap_or(0);
    if score < DEPARTURE_SUGGESTION_THRESHOLD {
        return Ok(());
    }

    queries::insert_alert(
        &state.pool,
        InsertAlertParams {
            trip_id: trip.id,
            alert_type: "departure_suggestion",
            severity: "info",
            title: "Consider changing your departure time".to_string(),
            message: format!(
                "Your route has a risk of {score}/100. Leaving earlier or later \
                 may give you better conditions."
            ),
            metadata: None,
        },
    )
    .await?;
    Ok(())
}

/// Check the minutely nowcast at the origin of trips departing within the
/// next hour, and raise rain_imminent alerts.
pub async fn check_minutely_precip(state: &AppState) -> Result<(), AppError> {
    let budget = evaluate_budget(&state.pool).await?;
    if budget.disabled {
        return Ok(());
    }

    let trips = queries::list_active_trips(&state.pool).await?;
    let now = Utc::now();
    let mut alert_count = 0;

    for trip in &trips {
        let time_to_departure = trip.departure_at - now;
        if time_to_departure < Duration::zero() || time_to_departure > Duration::hours(1) {
            continue;
        }

        let minutely = match state
            .weather
            .openweather()
            .fetch_minutely(trip.origin_lat, trip.origin_lon)
            .await
        {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("Minutely precip check failed for trip {}: {}", trip.id, err);
                continue;
            }
        };
        queries::log_api_usage(
            &state.pool,
            &OpenWeatherClient::minutely_usage(),
            Some(trip.id),
        )
        .await?;

        let Some(imminent) = imminent_precip(&minutely, now) else {
            continue;
        };

        queries::insert_alert(
            &state.pool,
            InsertAlertParams {
                trip_id: trip.id,
                alert_type: "rain_imminent",
                severity: classify_precip_severity(imminent.max_intensity_mmh),
                title: format!("Rain in {} min", imminent.minutes_until_rain),
                message: format!(
                    "Precipitation detected within the next {} minutes at your \
                     departure point. Maximum intensity: {:.1} mm/h.",
                    imminent.minutes_until_rain, imminent.max_intensity_mmh,
                ),
                metadata: Some(serde_json::json!({
                    "minutesUntilRain": imminent.minutes_until_rain,
                    "maxIntensityMmH": imminent.max_intensity_mmh,
                })),
            },
        )
        .await?;
        alert_count += 1;
    }

    if alert_count > 0 {
        tracing::info!("Minutely precip: generated {} rain_imminent alerts", alert_count);
    }
    Ok(())
}

fn worst_high_risk_point(points: &[TripWeatherPoint]) -> Option<&TripWeatherPoint> {
    points
        .iter()
        .filter(|p| p.risk_score > HIGH_RISK_THRESHOLD)
        .max_by_key(|p| p.risk_score)
}

#[derive(Debug, PartialEq)]
struct ImminentPrecip {
    minutes_until_rain: i64,
    max_intensity_mmh: f64,
}

/// Scan the first half hour of the nowcast for precipitation. Returns the
/// minutes until the first wet minute (at least 1) and the peak intensity.
fn imminent_precip(minutely: &[MinutelyPrecip], now: DateTime<Utc>) -> Option<ImminentPrecip> {
    let window = &minutely[..minutely.len().min(NOWCAST_MINUTES)];
    let wet: Vec<&MinutelyPrecip> = window.iter().filter(|m| m.precipitation > 0.0).collect();
    let first = wet.first()?;

    let minutes_until_rain =
        (((first.dt - now.timestamp()) as f64 / 60.0).round() as i64).max(1);
    let max_intensity_mmh = wet
        .iter()
        .map(|m| m.precipitation)
        .fold(f64::NEG_INFINITY, f64::max);

    Some(ImminentPrecip {
        minutes_until_rain,
        max_intensity_mmh,
    })
}

fn classify_precip_severity(max_intensity_mmh: f64) -> &'static str {
    if max_intensity_mmh > 5.0 {
        "critical"
    } else if max_intensity_mmh > 2.0 {
        "warning"
    } else {
        "info"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(index: i32, risk_score: i32, alert_severity: Option<&str>) -> TripWeatherPoint {
        TripWeatherPoint {
            id: uuid::Uuid::new_v4(),
            trip_id: uuid::Uuid::new_v4(),
            point_index: index,
            lat: 40.0,
            lon: -100.0,
            eta_at: Utc::now(),
            condition_code: "rain".to_string(),
            precip_prob: 50,
            precip_intensity: None,
            temp_celsius: 10.0,
            wind_speed_kmh: 20.0,
            alert_type: None,
            alert_severity: alert_severity.map(str::to_string),
            risk_score,
            risk_level: "moderate".to_string(),
            provider: "auto".to_string(),
            uv_index: None,
            visibility_km: None,
            dew_point_celsius: None,
            humidity_percent: None,
            cloud_cover_percent: None,
            air_quality_index: None,
        }
    }

    #[test]
    fn test_worst_high_risk_point_selection() {
        let points = vec![point(0, 40, None), point(1, 72, None), point(2, 65, None)];
        let worst = worst_high_risk_point(&points).unwrap();
        assert_eq!(worst.point_index, 1);
    }

    #[test]
    fn test_no_high_risk_point_below_threshold() {
        let points = vec![point(0, 60, None), point(1, 12, None)];
        assert!(worst_high_risk_point(&points).is_none(), "60 is not over");
    }

    #[test]
    fn test_imminent_precip_none_when_dry() {
        let now = Utc::now();
        let minutely: Vec<MinutelyPrecip> = (0..60)
            .map(|i| MinutelyPrecip {
                dt: now.timestamp() + i * 60,
                precipitation: 0.0,
            })
            .collect();
        assert!(imminent_precip(&minutely, now).is_none());
    }

    #[test]
    fn test_imminent_precip_only_scans_first_thirty_minutes() {
        let now = Utc::now();
        let minutely: Vec<MinutelyPrecip> = (0..60)
            .map(|i| MinutelyPrecip {
                dt: now.timestamp() + i * 60,
                precipitation: if i >= 45 { 3.0 } else { 0.0 },
            })
            .collect();
        assert!(
            imminent_precip(&minutely, now).is_none(),
            "rain at minute 45 is outside the nowcast window"
        );
    }

    #[test]
    fn test_imminent_precip_finds_first_wet_minute_and_peak() {
        let now = Utc::now();
        let minutely: Vec<MinutelyPrecip> = (0..30)
            .map(|i| MinutelyPrecip {
                dt: now.timestamp() + i * 60,
                precipitation: match i {
                    10 => 1.0,
                    15 => 6.5,
                    _ => 0.0,
                },
            })
            .collect();
        let imminent = imminent_precip(&minutely, now).unwrap();
        assert_eq!(imminent.minutes_until_rain, 10);
        assert_eq!(imminent.max_intensity_mmh, 6.5);
    }

    #[test]
    fn test_imminent_precip_clamps_to_one_minute() {
        let now = Utc::now();
        let minutely = vec![MinutelyPrecip {
            dt: now.timestamp() - 120, // stale first entry
            precipitation: 0.4,
        }];
        let imminent = imminent_precip(&minutely, now).unwrap();
        assert_eq!(imminent.minutes_until_rain, 1);
    }

    #[test]
    fn test_classify_precip_severity_bands() {
        assert_eq!(classify_precip_severity(0.5), "info");
        assert_eq!(classify_precip_severity(2.0), "info");
        assert_eq!(classify_precip_severity(2.1), "warning");
        assert_eq!(classify_precip_severity(5.0), "warning");
        assert_eq!(classify_precip_severity(5.1), "critical");
    }
}

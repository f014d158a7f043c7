//! Weekly departure scores for a trip.
//!
//! For each of the next seven days, probes the weather at the route midpoint
//! at typical departure hours (08/12/16 UTC), scores each hour, and stores an
//! inverse "goodness" score for the day plus the best of the probed hours.
//! Refreshed at most once a day per trip; a single mid-route sample is too
//! coarse for the UV and visibility terms, so they are left out of the
//! per-hour risk.

use chrono::{Duration, NaiveDate, Utc};

use crate::db::models::Trip;
use crate::db::queries;
use crate::errors::AppError;
use crate::services::budget::BudgetState;
use crate::services::pipeline::secondary_analyses_allowed;
use crate::services::risk::{calculate_day_score, calculate_point_risk, WeatherSample};
use crate::state::AppState;

/// Days scored ahead, starting today.
const LOOKAHEAD_DAYS: u64 = 7;

/// Typical departure hours probed per day (UTC).
const DEPARTURE_HOURS: [u32; 3] = [8, 12, 16];

/// Minimum age before a trip's scores are recomputed.
const REFRESH_AFTER_HOURS: i64 = 24;

/// Compute and upsert day scores for the week ahead.
///
/// Skipped under budget degradation or when the scores are still fresh.
/// Per-hour fetch failures are logged and dropped; a day with no usable
/// hours keeps its previous score.
pub async fn compute_weekly_scores(
    state: &AppState,
    trip: &Trip,
    budget: &BudgetState,
) -> Result<(), AppError> {
    if !secondary_analyses_allowed(budget) {
        tracing::debug!("Budget degraded, skipping day scores for trip {}", trip.id);
        return Ok(());
    }

    let now = Utc::now();
    if let Some(refreshed_at) = queries::day_scores_refreshed_at(&state.pool, trip.id).await? {
        if now - refreshed_at < Duration::hours(REFRESH_AFTER_HOURS) {
            return Ok(());
        }
    }

    let mid_lat = (trip.origin_lat + trip.dest_lat) / 2.0;
    let mid_lon = (trip.origin_lon + trip.dest_lon) / 2.0;
    let today = now.date_naive();

    for day_offset in 0..LOOKAHEAD_DAYS {
        let date = today + Duration::days(day_offset as i64);
        let mut hour_risks: Vec<(u32, i32)> = Vec::with_capacity(DEPARTURE_HOURS.len());

        for hour in DEPARTURE_HOURS {
            let target_time = match date.and_hms_opt(hour, 0, 0) {
                Some(naive) => naive.and_utc(),
                None => continue,
            };

            match state.weather.fetch(mid_lat, mid_lon, target_time).await {
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
                    hour_risks.push((hour, risk.score));
                }
                Err(err) => {
                    tracing::warn!(
                        "Day score fetch failed for trip {} on {} at {}:00: {}",
                        trip.id,
                        date,
                        hour,
                        err,
                    );
                }
            }
        }

        let Some(summary) = summarize_day(&hour_risks) else {
            continue;
        };
        queries::upsert_day_score(
            &state.pool,
            trip.id,
            date,
            summary.overall_score,
            Some(summary.best_hour as i32),
        )
        .await?;
    }

    Ok(())
}

/// The week of dates a scores view covers, starting today.
pub fn week_ahead(today: NaiveDate) -> Vec<NaiveDate> {
    (0..LOOKAHEAD_DAYS)
        .map(|offset| today + Duration::days(offset as i64))
        .collect()
}

#[derive(Debug, PartialEq, Eq)]
struct DaySummary {
    /// Inverse average risk, 0-100.
    overall_score: i32,
    /// Probed hour with the lowest risk; earliest wins ties.
    best_hour: u32,
}

fn summarize_day(hour_risks: &[(u32, i32)]) -> Option<DaySummary> {
    let (first_hour, first_risk) = *hour_risks.first()?;

    let mut best_hour = first_hour;
    let mut best_risk = first_risk;
    let mut total = 0i64;
    for &(hour, risk) in hour_risks {
        total += i64::from(risk);
        if risk < best_risk {
            best_risk = risk;
            best_hour = hour;
        }
    }

    let avg_risk = total as f64 / hour_risks.len() as f64;
    Some(DaySummary {
        overall_score: calculate_day_score(avg_risk),
        best_hour,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_day_picks_lowest_risk_hour() {
        let summary = summarize_day(&[(8, 40), (12, 10), (16, 25)]).unwrap();
        assert_eq!(summary.best_hour, 12);
        // avg 25 -> score 75
        assert_eq!(summary.overall_score, 75);
    }

    #[test]
    fn test_summarize_day_earliest_hour_wins_ties() {
        let summary = summarize_day(&[(8, 30), (12, 30), (16, 30)]).unwrap();
        assert_eq!(summary.best_hour, 8);
        assert_eq!(summary.overall_score, 70);
    }

    #[test]
    fn test_summarize_day_empty_is_none() {
        assert!(summarize_day(&[]).is_none());
    }

    #[test]
    fn test_summarize_day_single_hour() {
        let summary = summarize_day(&[(16, 80)]).unwrap();
        assert_eq!(summary.best_hour, 16);
        assert_eq!(summary.overall_score, 20);
    }

    #[test]
    fn test_week_ahead_covers_seven_consecutive_days() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let dates = week_ahead(today);
        assert_eq!(dates.len(), 7);
        assert_eq!(dates[0], today);
        assert_eq!(dates[6], NaiveDate::from_ymd_opt(2026, 3, 7).unwrap());
    }
}

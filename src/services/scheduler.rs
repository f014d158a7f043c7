//! Background scheduler for active trips.
//!
//! Single loop ticking every 10 minutes: each tick runs the minutely
//! precipitation check for trips departing within the hour; every 12th tick
//! (2 hours) recomputes weather for active trips departing within 48 hours
//! and re-evaluates their alerts.
//!
//! Should be spawned via `tokio::spawn(run_scheduler(...))`.

use chrono::{Duration, Utc};

use crate::db::queries;
use crate::services::budget::evaluate_budget;
use crate::services::{alerts, pipeline};
use crate::state::AppState;

/// Base tick interval (seconds). Drives the minutely precipitation check.
const TICK_INTERVAL_SECS: u64 = 600;

/// Ticks between full recalculation passes (12 x 10 min = 2 hours).
const RECALC_EVERY_TICKS: u64 = 12;

/// Only recalculate trips departing within this horizon.
const RECALC_LOOKAHEAD_HOURS: i64 = 48;

/// Skip trips whose weather was fetched more recently than this.
const RECENT_FETCH_SKIP_MINUTES: i64 = 90;

/// Run the scheduler loop. Never returns; runs until process exit.
pub async fn run_scheduler(state: AppState) {
    tracing::info!("Background scheduler started");
    let mut tick: u64 = 0;

    loop {
        if let Err(err) = alerts::check_minutely_precip(&state).await {
            tracing::error!("Scheduler: minutely precip check failed: {}", err);
        }

        if tick % RECALC_EVERY_TICKS == 0 {
            recalculate_active_trips(&state).await;
        }

        tick = tick.wrapping_add(1);
        tokio::time::sleep(std::time::Duration::from_secs(TICK_INTERVAL_SECS)).await;
    }
}

/// Recompute weather for active trips departing soon, then re-evaluate their
/// alerts. Per-trip failures are logged and do not stop the pass.
async fn recalculate_active_trips(state: &AppState) {
    match evaluate_budget(&state.pool).await {
        Ok(budget) if budget.disabled => {
            tracing::info!("Scheduler: budget exceeded, skipping recalculation");
            return;
        }
        Ok(_) => {}
        Err(err) => {
            tracing::error!("Scheduler: budget evaluation failed: {}", err);
            return;
        }
    }

    let trips = match queries::list_active_trips(&state.pool).await {
        Ok(trips) => trips,
        Err(err) => {
            tracing::error!("Scheduler: failed to list active trips: {}", err);
            return;
        }
    };

    let now = Utc::now();
    let mut count = 0;

    for trip in &trips {
        if trip.departure_at - now > Duration::hours(RECALC_LOOKAHEAD_HOURS) {
            continue;
        }
        if let Some(fetched_at) = trip.last_weather_fetch_at {
            if now - fetched_at < Duration::minutes(RECENT_FETCH_SKIP_MINUTES) {
                continue;
            }
        }

        if let Err(err) = pipeline::run_pipeline(state, trip.id).await {
            tracing::error!("Scheduler: failed to recalculate trip {}: {}", trip.id, err);
            continue;
        }

        // Reload: the pipeline just updated the trip's score
        let refreshed = match queries::get_trip(&state.pool, trip.id).await {
            Ok(Some(t)) => t,
            Ok(None) => continue,
            Err(err) => {
                tracing::error!("Scheduler: failed to reload trip {}: {}", trip.id, err);
                continue;
            }
        };
        if let Err(err) = alerts::evaluate_trip(state, &refreshed).await {
            tracing::error!("Scheduler: alert evaluation failed for trip {}: {}", trip.id, err);
        }
        if let Err(err) = alerts::evaluate_departure_window(state, &refreshed).await {
            tracing::error!(
                "Scheduler: departure window evaluation failed for trip {}: {}",
                trip.id,
                err,
            );
        }
        count += 1;
    }

    if count > 0 {
        tracing::info!("Scheduler: recalculated {} active trips", count);
    }
}

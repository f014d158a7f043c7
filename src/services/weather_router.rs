//! Weather provider router.
//!
//! Routes forecast requests to NOAA (free, US-only coverage) or OpenWeather
//! (paid, global). US coordinates try NOAA first and fall back to OpenWeather
//! on any failure. Both adapters normalize to `WeatherObservation`.

use chrono::{DateTime, Utc};

use crate::errors::AppError;
use crate::services::budget::UsageEntry;
use crate::services::noaa::NoaaClient;
use crate::services::openweather::OpenWeatherClient;
use crate::services::retry::{with_retry, RetryOptions};
use crate::services::risk::{AlertSeverity, WeatherSample};

/// Normalized weather for one sample point, provider-agnostic.
///
/// Produced transiently per pipeline run; persisted only as part of a
/// risk-annotated trip weather point.
#[derive(Debug, Clone)]
pub struct WeatherObservation {
    /// Shared condition vocabulary: clear, partly_cloudy, cloudy, rain,
    /// heavy_rain, drizzle, snow, ice, thunderstorm, fog, haze, unknown.
    pub condition_code: String,
    /// Precipitation probability, 0-100.
    pub precip_prob: i32,
    /// Precipitation intensity in mm/h; 0 when the provider reports none.
    pub precip_intensity: f64,
    pub temp_celsius: f64,
    pub wind_speed_kmh: f64,
    pub alert_type: Option<String>,
    pub alert_severity: Option<AlertSeverity>,
    pub uv_index: Option<f64>,
    pub visibility_km: Option<f64>,
    pub dew_point_celsius: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub cloud_cover_percent: Option<f64>,
}

impl WeatherObservation {
    /// Risk-engine input for this observation. A zero intensity carries no
    /// signal, so the engine falls back to its probability-only proxy term.
    pub fn to_sample(&self) -> WeatherSample {
        WeatherSample {
            precip_prob: f64::from(self.precip_prob),
            precip_intensity: (self.precip_intensity > 0.0).then_some(self.precip_intensity),
            wind_speed_kmh: self.wind_speed_kmh,
            alert_severity: self.alert_severity,
            uv_index: self.uv_index,
            visibility_km: self.visibility_km,
        }
    }
}

/// A normalized observation plus the cost entries the fetch incurred.
/// Callers append the usage entries to the budget ledger.
#[derive(Debug)]
pub struct FetchOutcome {
    pub observation: WeatherObservation,
    /// Which provider actually served the observation.
    pub provider: &'static str,
    pub usage: Vec<UsageEntry>,
}

#[derive(Debug, Clone)]
pub struct WeatherRouter {
    noaa: NoaaClient,
    openweather: OpenWeatherClient,
}

impl WeatherRouter {
    pub fn new(noaa: NoaaClient, openweather: OpenWeatherClient) -> Self {
        Self { noaa, openweather }
    }

    /// Fetch a normalized observation for a point at a target time.
    ///
    /// NOAA failures inside its coverage region fall back unconditionally to
    /// OpenWeather; only successful calls produce usage entries.
    pub async fn fetch(
        &self,
        lat: f64,
        lon: f64,
        target_time: DateTime<Utc>,
    ) -> Result<FetchOutcome, AppError> {
        if is_in_us(lat, lon) {
            match with_retry(RetryOptions::default(), || {
                self.noaa.fetch_forecast(lat, lon, target_time)
            })
            .await
            {
                Ok(observation) => {
                    return Ok(FetchOutcome {
                        observation,
                        provider: "noaa",
                        usage: vec![NoaaClient::forecast_usage()],
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        "NOAA failed for ({:.4}, {:.4}), falling back to OpenWeather: {}",
                        lat,
                        lon,
                        err,
                    );
                }
            }
        }

        let observation = with_retry(RetryOptions::default(), || {
            self.openweather.fetch_forecast(lat, lon, target_time)
        })
        .await?;

        Ok(FetchOutcome {
            observation,
            provider: "openweather",
            usage: vec![OpenWeatherClient::onecall_usage()],
        })
    }

    pub fn openweather(&self) -> &OpenWeatherClient {
        &self.openweather
    }
}

/// Rough bounding-box check for continental US + Alaska + Hawaii, the NOAA
/// coverage region.
pub fn is_in_us(lat: f64, lon: f64) -> bool {
    // Continental US
    if (24.5..=49.5).contains(&lat) && (-125.0..=-66.5).contains(&lon) {
        return true;
    }
    // Alaska
    if (51.0..=72.0).contains(&lat) && (-180.0..=-129.0).contains(&lon) {
        return true;
    }
    // Hawaii
    if (18.5..=22.5).contains(&lat) && (-161.0..=-154.0).contains(&lon) {
        return true;
    }
    false
}

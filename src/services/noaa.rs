//! NOAA (api.weather.gov) forecast adapter.
//!
//! Free for US coordinates. Two-step protocol: resolve the point to a grid via
//! `/points/{lat},{lon}`, then fetch the hourly forecast URL that response
//! names. Conditions come as free-text `shortForecast` strings, so the mapping
//! to the shared condition vocabulary is keyword-based.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::budget::UsageEntry;
use crate::services::weather_router::WeatherObservation;

const NOAA_API_URL: &str = "https://api.weather.gov";

#[derive(Debug, Clone)]
pub struct NoaaClient {
    client: reqwest::Client,
    user_agent: String,
    base_url: String,
}

#[derive(Deserialize)]
struct PointsResponse {
    properties: Option<PointsProperties>,
}

#[derive(Deserialize)]
struct PointsProperties {
    #[serde(rename = "forecastHourly")]
    forecast_hourly: Option<String>,
}

#[derive(Deserialize)]
struct ForecastResponse {
    properties: Option<ForecastProperties>,
}

#[derive(Deserialize)]
struct ForecastProperties {
    #[serde(default)]
    periods: Vec<ForecastPeriod>,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct ForecastPeriod {
    start_time: String,
    temperature: f64,
    temperature_unit: Option<String>,
    wind_speed: Option<String>,
    short_forecast: Option<String>,
    probability_of_precipitation: Option<UnitValue>,
}

#[derive(Deserialize, Clone)]
struct UnitValue {
    value: Option<f64>,
}

impl NoaaClient {
    pub fn new(user_agent: &str) -> Self {
        Self::with_base_url(user_agent, NOAA_API_URL)
    }

    /// Point the client at an alternate host (tests).
    pub fn with_base_url(user_agent: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            user_agent: user_agent.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// NOAA requests are free; the ledger still records them for visibility.
    pub fn forecast_usage() -> UsageEntry {
        UsageEntry::new("noaa", "forecastHourly", Decimal::ZERO)
    }

    /// Fetch the hourly forecast period closest to `target_time`.
    pub async fn fetch_forecast(
        &self,
        lat: f64,
        lon: f64,
        target_time: DateTime<Utc>,
    ) -> Result<WeatherObservation, AppError> {
        let points_url = format!("{}/points/{:.4},{:.4}", self.base_url, lat, lon);
        let points_res = self
            .client
            .get(&points_url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("NOAA points request: {e}")))?;

        if !points_res.status().is_success() {
            return Err(AppError::UpstreamStatus {
                provider: "noaa",
                status: points_res.status().as_u16(),
            });
        }

        let points: PointsResponse = points_res
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("NOAA points body: {e}")))?;

        let forecast_url = points
            .properties
            .and_then(|p| p.forecast_hourly)
            .ok_or_else(|| {
                AppError::ExternalServiceError("No hourly forecast URL from NOAA".to_string())
            })?;

        // The grid response carries an absolute forecast URL. Rebase it onto
        // our base_url so mock servers see the second request too.
        let forecast_url = match forecast_url.strip_prefix(NOAA_API_URL) {
            Some(path) if self.base_url != NOAA_API_URL => {
                format!("{}{}", self.base_url, path)
            }
            _ => forecast_url,
        };

        let forecast_res = self
            .client
            .get(&forecast_url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("NOAA forecast request: {e}")))?;

        if !forecast_res.status().is_success() {
            return Err(AppError::UpstreamStatus {
                provider: "noaa",
                status: forecast_res.status().as_u16(),
            });
        }

        let forecast: ForecastResponse = forecast_res
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("NOAA forecast body: {e}")))?;

        let periods = forecast.properties.map(|p| p.periods).unwrap_or_default();
        let closest = closest_period(&periods, target_time).ok_or_else(|| {
            AppError::ExternalServiceError("No forecast periods available from NOAA".to_string())
        })?;

        Ok(period_to_observation(closest))
    }
}

fn closest_period(
    periods: &[ForecastPeriod],
    target_time: DateTime<Utc>,
) -> Option<&ForecastPeriod> {
    periods.iter().min_by_key(|p| {
        let start = p
            .start_time
            .parse::<DateTime<Utc>>()
            .map(|t| t.timestamp_millis())
            .unwrap_or(0);
        (start - target_time.timestamp_millis()).abs()
    })
}

fn period_to_observation(period: &ForecastPeriod) -> WeatherObservation {
    let temp_celsius = if period.temperature_unit.as_deref() == Some("F") {
        (period.temperature - 32.0) * 5.0 / 9.0
    } else {
        period.temperature
    };

    let short_forecast = period.short_forecast.as_deref().unwrap_or("");

    WeatherObservation {
        condition_code: map_noaa_condition(short_forecast).to_string(),
        precip_prob: period
            .probability_of_precipitation
            .as_ref()
            .and_then(|p| p.value)
            .unwrap_or(0.0)
            .round() as i32,
        precip_intensity: estimate_intensity(short_forecast),
        temp_celsius: (temp_celsius * 10.0).round() / 10.0,
        wind_speed_kmh: parse_wind_speed(period.wind_speed.as_deref().unwrap_or("")),
        alert_type: None,
        alert_severity: None,
        uv_index: None,
        visibility_km: None,
        dew_point_celsius: None,
        humidity_percent: None,
        cloud_cover_percent: None,
    }
}

/// NOAA wind strings look like "15 mph" or "10 to 20 mph"; take the first
/// number and convert to km/h.
fn parse_wind_speed(wind: &str) -> f64 {
    let digits: String = wind
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.parse::<f64>() {
        Ok(mph) => (mph * 1.60934).round(),
        Err(_) => 0.0,
    }
}

fn map_noaa_condition(forecast: &str) -> &'static str {
    let lower = forecast.to_lowercase();
    if lower.contains("thunder") {
        "thunderstorm"
    } else if lower.contains("snow") || lower.contains("blizzard") {
        "snow"
    } else if lower.contains("ice") || lower.contains("freezing") {
        "ice"
    } else if lower.contains("heavy rain") {
        "heavy_rain"
    } else if lower.contains("rain") || lower.contains("showers") {
        "rain"
    } else if lower.contains("drizzle") {
        "drizzle"
    } else if lower.contains("fog") {
        "fog"
    } else if lower.contains("partly") {
        "partly_cloudy"
    } else if lower.contains("cloud") || lower.contains("overcast") {
        "cloudy"
    } else if lower.contains("clear") || lower.contains("sunny") {
        "clear"
    } else {
        "unknown"
    }
}

/// NOAA has no numeric intensity; estimate mm/h from forecast wording.
fn estimate_intensity(forecast: &str) -> f64 {
    let lower = forecast.to_lowercase();
    if lower.contains("heavy") {
        8.0
    } else if lower.contains("thunder") {
        10.0
    } else if lower.contains("moderate") {
        4.0
    } else if lower.contains("light") || lower.contains("drizzle") {
        1.0
    } else if lower.contains("rain") || lower.contains("showers") {
        3.0
    } else if lower.contains("snow") {
        3.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wind_speed_range() {
        assert_eq!(parse_wind_speed("10 to 20 mph"), 16.0);
        assert_eq!(parse_wind_speed("15 mph"), 24.0);
        assert_eq!(parse_wind_speed(""), 0.0);
        assert_eq!(parse_wind_speed("calm"), 0.0);
    }

    #[test]
    fn test_map_noaa_condition() {
        assert_eq!(map_noaa_condition("Scattered Thunderstorms"), "thunderstorm");
        assert_eq!(map_noaa_condition("Heavy Rain"), "heavy_rain");
        assert_eq!(map_noaa_condition("Light Rain Showers"), "rain");
        assert_eq!(map_noaa_condition("Freezing Drizzle"), "ice");
        assert_eq!(map_noaa_condition("Partly Sunny"), "partly_cloudy");
        assert_eq!(map_noaa_condition("Partly Cloudy"), "partly_cloudy");
        assert_eq!(map_noaa_condition("Sunny"), "clear");
        assert_eq!(map_noaa_condition("Mostly Cloudy"), "cloudy");
        assert_eq!(map_noaa_condition("Patchy Fog"), "fog");
        assert_eq!(map_noaa_condition(""), "unknown");
    }

    #[test]
    fn test_estimate_intensity() {
        assert_eq!(estimate_intensity("Heavy Rain"), 8.0);
        assert_eq!(estimate_intensity("Thunderstorms"), 10.0);
        assert_eq!(estimate_intensity("Light Snow"), 1.0);
        assert_eq!(estimate_intensity("Rain Showers"), 3.0);
        assert_eq!(estimate_intensity("Sunny"), 0.0);
    }

    #[test]
    fn test_fahrenheit_conversion() {
        let period = ForecastPeriod {
            start_time: "2026-03-01T12:00:00Z".to_string(),
            temperature: 68.0,
            temperature_unit: Some("F".to_string()),
            wind_speed: Some("5 mph".to_string()),
            short_forecast: Some("Sunny".to_string()),
            probability_of_precipitation: Some(UnitValue { value: Some(10.0) }),
        };
        let obs = period_to_observation(&period);
        assert_eq!(obs.temp_celsius, 20.0);
        assert_eq!(obs.precip_prob, 10);
        assert_eq!(obs.condition_code, "clear");
    }

    #[test]
    fn test_closest_period_selection() {
        let mk = |start: &str| ForecastPeriod {
            start_time: start.to_string(),
            temperature: 10.0,
            temperature_unit: Some("C".to_string()),
            wind_speed: None,
            short_forecast: None,
            probability_of_precipitation: None,
        };
        let periods = vec![
            mk("2026-03-01T10:00:00Z"),
            mk("2026-03-01T11:00:00Z"),
            mk("2026-03-01T12:00:00Z"),
        ];
        let target = "2026-03-01T11:20:00Z".parse::<DateTime<Utc>>().unwrap();
        let closest = closest_period(&periods, target).unwrap();
        assert_eq!(closest.start_time, "2026-03-01T11:00:00Z");
    }
}

//! OpenWeather adapter: One Call 3.0 forecasts, Air Pollution AQI, and
//! minutely nowcasts.
//!
//! Global fallback behind the NOAA-first router. Each One Call request is
//! billed (~$0.0015), so every call produces a ledger entry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::budget::UsageEntry;
use crate::services::risk::AlertSeverity;
use crate::services::weather_router::WeatherObservation;

const OPENWEATHER_API_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

/// One minute of nowcast precipitation.
#[derive(Debug, Clone, Deserialize)]
pub struct MinutelyPrecip {
    /// Epoch seconds.
    pub dt: i64,
    /// mm/h.
    pub precipitation: f64,
}

#[derive(Deserialize)]
struct OneCallResponse {
    #[serde(default)]
    hourly: Vec<HourlyForecast>,
    #[serde(default)]
    minutely: Vec<MinutelyPrecip>,
    alerts: Option<Vec<OwmAlert>>,
}

#[derive(Deserialize, Clone)]
struct HourlyForecast {
    dt: i64,
    temp: f64,
    wind_speed: f64,
    pop: Option<f64>,
    rain: Option<PrecipVolume>,
    snow: Option<PrecipVolume>,
    #[serde(default)]
    weather: Vec<WeatherCondition>,
    uvi: Option<f64>,
    /// Meters.
    visibility: Option<f64>,
    dew_point: Option<f64>,
    humidity: Option<f64>,
    clouds: Option<f64>,
}

#[derive(Deserialize, Clone)]
struct PrecipVolume {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
}

#[derive(Deserialize, Clone)]
struct WeatherCondition {
    id: i64,
}

#[derive(Deserialize, Clone)]
struct OwmAlert {
    event: Option<String>,
    start: i64,
    end: i64,
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct AirPollutionResponse {
    #[serde(default)]
    list: Vec<AirPollutionEntry>,
}

#[derive(Deserialize)]
struct AirPollutionEntry {
    main: AirPollutionMain,
}

#[derive(Deserialize)]
struct AirPollutionMain {
    aqi: i32,
}

impl OpenWeatherClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, OPENWEATHER_API_URL)
    }

    /// Point the client at an alternate host (tests).
    pub fn with_base_url(api_key: Option<String>, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn onecall_usage() -> UsageEntry {
        UsageEntry::new("openweather", "onecall", Decimal::new(15, 4))
    }

    /// Air Pollution API is on the free tier.
    pub fn air_pollution_usage() -> UsageEntry {
        UsageEntry::new("openweather", "air_pollution", Decimal::ZERO)
    }

    /// Minutely nowcast is a One Call request and bills like one.
    pub fn minutely_usage() -> UsageEntry {
        UsageEntry::new("openweather", "onecall_minutely", Decimal::new(15, 4))
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AppError::ConfigError("OPENWEATHER_API_KEY not set".to_string()))
    }

    /// Fetch the hourly forecast entry closest to `target_time`, plus any
    /// government weather alert active at that time.
    pub async fn fetch_forecast(
        &self,
        lat: f64,
        lon: f64,
        target_time: DateTime<Utc>,
    ) -> Result<WeatherObservation, AppError> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}/data/3.0/onecall?lat={}&lon={}&exclude=minutely,daily&units=metric&appid={}",
            self.base_url, lat, lon, api_key
        );

        let data: OneCallResponse = self.get_json(&url).await?;

        let target_sec = target_time.timestamp();
        let closest = data
            .hourly
            .iter()
            .min_by_key(|h| (h.dt - target_sec).abs())
            .ok_or_else(|| {
                AppError::ExternalServiceError("No hourly data from OpenWeather".to_string())
            })?;

        let active_alert = data
            .alerts
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .find(|a| a.start <= target_sec && a.end >= target_sec);

        Ok(hourly_to_observation(closest, active_alert))
    }

    /// Air quality index at a point, 1 (good) to 5 (very poor). Upstream
    /// failures degrade to `None` rather than failing the caller.
    pub async fn fetch_air_quality(&self, lat: f64, lon: f64) -> Result<Option<i32>, AppError> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}/data/2.5/air_pollution?lat={}&lon={}&appid={}",
            self.base_url, lat, lon, api_key
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Air pollution request: {e}")))?;

        if !response.status().is_success() {
            tracing::warn!("Air Pollution API error {}", response.status());
            return Ok(None);
        }

        let data: AirPollutionResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Air pollution body: {e}")))?;

        Ok(data.list.first().map(|entry| entry.main.aqi))
    }

    /// Minute-by-minute precipitation nowcast for the next hour. Regions
    /// without nowcast coverage yield an empty vec.
    pub async fn fetch_minutely(&self, lat: f64, lon: f64) -> Result<Vec<MinutelyPrecip>, AppError> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}/data/3.0/onecall?lat={}&lon={}&exclude=hourly,daily,alerts&units=metric&appid={}",
            self.base_url, lat, lon, api_key
        );

        let data: OneCallResponse = self.get_json(&url).await?;
        Ok(data.minutely)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("OpenWeather request: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamStatus {
                provider: "openweather",
                status: response.status().as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("OpenWeather body: {e}")))
    }
}

fn hourly_to_observation(
    hourly: &HourlyForecast,
    active_alert: Option<&OwmAlert>,
) -> WeatherObservation {
    let weather_id = hourly.weather.first().map(|w| w.id).unwrap_or(800);
    let intensity = hourly
        .rain
        .as_ref()
        .and_then(|r| r.one_hour)
        .or_else(|| hourly.snow.as_ref().and_then(|s| s.one_hour))
        .unwrap_or(0.0);

    WeatherObservation {
        condition_code: map_owm_condition(weather_id).to_string(),
        precip_prob: (hourly.pop.unwrap_or(0.0) * 100.0).round() as i32,
        precip_intensity: intensity,
        temp_celsius: (hourly.temp * 10.0).round() / 10.0,
        wind_speed_kmh: (hourly.wind_speed * 3.6).round(),
        alert_type: active_alert.and_then(|a| a.event.clone()),
        alert_severity: active_alert.map(|a| map_alert_severity(a.tags.as_deref())),
        uv_index: hourly.uvi,
        visibility_km: hourly.visibility.map(|m| m / 1000.0),
        dew_point_celsius: hourly.dew_point,
        humidity_percent: hourly.humidity,
        cloud_cover_percent: hourly.clouds,
    }
}

fn map_owm_condition(weather_id: i64) -> &'static str {
    match weather_id {
        200..=299 => "thunderstorm",
        300..=399 => "drizzle",
        500..=509 => "rain",
        510..=519 => "heavy_rain",
        520..=599 => "rain",
        600..=699 => "snow",
        701 | 741 => "fog",
        700..=799 => "haze",
        800 => "clear",
        801 => "partly_cloudy",
        id if id >= 802 => "cloudy",
        _ => "unknown",
    }
}

fn map_alert_severity(tags: Option<&[String]>) -> AlertSeverity {
    let Some(tags) = tags else {
        return AlertSeverity::Moderate;
    };
    let joined = tags.join(" ").to_lowercase();
    if joined.contains("extreme") {
        AlertSeverity::Extreme
    } else if joined.contains("severe") {
        AlertSeverity::Severe
    } else if joined.contains("moderate") {
        AlertSeverity::Moderate
    } else {
        AlertSeverity::Minor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_owm_condition_bands() {
        assert_eq!(map_owm_condition(212), "thunderstorm");
        assert_eq!(map_owm_condition(301), "drizzle");
        assert_eq!(map_owm_condition(500), "rain");
        assert_eq!(map_owm_condition(511), "heavy_rain");
        assert_eq!(map_owm_condition(521), "rain");
        assert_eq!(map_owm_condition(602), "snow");
        assert_eq!(map_owm_condition(701), "fog");
        assert_eq!(map_owm_condition(741), "fog");
        assert_eq!(map_owm_condition(721), "haze");
        assert_eq!(map_owm_condition(800), "clear");
        assert_eq!(map_owm_condition(801), "partly_cloudy");
        assert_eq!(map_owm_condition(804), "cloudy");
    }

    #[test]
    fn test_map_alert_severity_from_tags() {
        assert_eq!(map_alert_severity(None), AlertSeverity::Moderate);
        assert_eq!(
            map_alert_severity(Some(&["Extreme temperature value".to_string()])),
            AlertSeverity::Extreme
        );
        assert_eq!(
            map_alert_severity(Some(&["Severe thunderstorm".to_string()])),
            AlertSeverity::Severe
        );
        assert_eq!(
            map_alert_severity(Some(&["Flood".to_string()])),
            AlertSeverity::Minor
        );
    }

    #[test]
    fn test_hourly_normalization() {
        let hourly = HourlyForecast {
            dt: 1_750_000_000,
            temp: 18.34,
            wind_speed: 5.0,
            pop: Some(0.75),
            rain: Some(PrecipVolume {
                one_hour: Some(2.2),
            }),
            snow: None,
            weather: vec![WeatherCondition { id: 501 }],
            uvi: Some(6.0),
            visibility: Some(8000.0),
            dew_point: Some(12.0),
            humidity: Some(80.0),
            clouds: Some(90.0),
        };
        let obs = hourly_to_observation(&hourly, None);
        assert_eq!(obs.condition_code, "rain");
        assert_eq!(obs.precip_prob, 75);
        assert_eq!(obs.precip_intensity, 2.2);
        assert_eq!(obs.temp_celsius, 18.3);
        assert_eq!(obs.wind_speed_kmh, 18.0);
        assert_eq!(obs.uv_index, Some(6.0));
        assert_eq!(obs.visibility_km, Some(8.0));
    }

    #[test]
    fn test_snow_volume_used_when_no_rain() {
        let hourly = HourlyForecast {
            dt: 0,
            temp: -2.0,
            wind_speed: 0.0,
            pop: None,
            rain: None,
            snow: Some(PrecipVolume {
                one_hour: Some(1.5),
            }),
            weather: vec![],
            uvi: None,
            visibility: None,
            dew_point: None,
            humidity: None,
            clouds: None,
        };
        let obs = hourly_to_observation(&hourly, None);
        assert_eq!(obs.precip_intensity, 1.5);
        assert_eq!(obs.precip_prob, 0);
        // Missing weather array defaults to clear sky id 800
        assert_eq!(obs.condition_code, "clear");
    }

    #[test]
    fn test_active_alert_attached() {
        let hourly = HourlyForecast {
            dt: 100,
            temp: 20.0,
            wind_speed: 2.0,
            pop: None,
            rain: None,
            snow: None,
            weather: vec![WeatherCondition { id: 800 }],
            uvi: None,
            visibility: None,
            dew_point: None,
            humidity: None,
            clouds: None,
        };
        let alert = OwmAlert {
            event: Some("Wind Advisory".to_string()),
            start: 0,
            end: 200,
            tags: Some(vec!["Severe wind".to_string()]),
        };
        let obs = hourly_to_observation(&hourly, Some(&alert));
        assert_eq!(obs.alert_type.as_deref(), Some("Wind Advisory"));
        assert_eq!(obs.alert_severity, Some(AlertSeverity::Severe));
    }
}

//! Google Routes API client (computeRoutes v2).
//!
//! The only route computation source. Each request costs ~$0.005, so the
//! pipeline calls it once per run and persists the result.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::AppError;
use crate::services::budget::UsageEntry;

const ROUTES_API_URL: &str = "https://routes.googleapis.com";

const FIELD_MASK: &str =
    "routes.distanceMeters,routes.duration,routes.polyline.encodedPolyline,routes.legs";

#[derive(Debug, Clone)]
pub struct RoutesClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

/// An intermediate stop between origin and destination.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone)]
pub struct RouteResult {
    pub encoded_polyline: String,
    pub distance_meters: i64,
    pub duration_seconds: i64,
    pub legs: Vec<RouteLeg>,
}

#[derive(Debug, Clone)]
pub struct RouteLeg {
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    pub distance_meters: i64,
    pub duration_seconds: i64,
}

#[derive(Deserialize)]
struct ComputeRoutesResponse {
    #[serde(default)]
    routes: Vec<ApiRoute>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRoute {
    distance_meters: Option<i64>,
    duration: Option<String>,
    polyline: Option<ApiPolyline>,
    #[serde(default)]
    legs: Vec<ApiLeg>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPolyline {
    encoded_polyline: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiLeg {
    start_location: Option<ApiLocation>,
    end_location: Option<ApiLocation>,
    distance_meters: Option<i64>,
    duration: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiLocation {
    lat_lng: Option<ApiLatLng>,
}

#[derive(Deserialize)]
struct ApiLatLng {
    latitude: f64,
    longitude: f64,
}

impl RoutesClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, ROUTES_API_URL)
    }

    /// Point the client at an alternate host (tests).
    pub fn with_base_url(api_key: Option<String>, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn compute_usage() -> UsageEntry {
        UsageEntry::new("google_routes", "computeRoutes", Decimal::new(5, 3))
    }

    /// Compute a driving route through the given stops.
    ///
    /// A response without at least one leg is a hard error; a route the
    /// pipeline cannot segment is useless downstream.
    pub async fn compute_route(
        &self,
        origin: Waypoint,
        destination: Waypoint,
        stops: &[Waypoint],
        departure_time: Option<DateTime<Utc>>,
    ) -> Result<RouteResult, AppError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::ConfigError("GOOGLE_MAPS_API_KEY not set".to_string()))?;

        let intermediates: Vec<_> = stops
            .iter()
            .map(|s| json!({ "location": { "latLng": { "latitude": s.lat, "longitude": s.lon } } }))
            .collect();

        let mut body = json!({
            "origin": { "location": { "latLng": { "latitude": origin.lat, "longitude": origin.lon } } },
            "destination": { "location": { "latLng": { "latitude": destination.lat, "longitude": destination.lon } } },
            "travelMode": "DRIVE",
            "routingPreference": "TRAFFIC_AWARE",
            "computeAlternativeRoutes": true,
            "polylineEncoding": "ENCODED_POLYLINE",
        });
        if !intermediates.is_empty() {
            body["intermediates"] = json!(intermediates);
        }
        if let Some(departure) = departure_time {
            body["departureTime"] = json!(departure.to_rfc3339());
        }

        let response = self
            .client
            .post(format!("{}/directions/v2:computeRoutes", self.base_url))
            .header("Content-Type", "application/json")
            .header("X-Goog-Api-Key", api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Routes request: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamStatus {
                provider: "google_routes",
                status: response.status().as_u16(),
            });
        }

        let data: ComputeRoutesResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Routes body: {e}")))?;

        let route = data
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| AppError::ExternalServiceError("No route found".to_string()))?;

        let legs: Vec<RouteLeg> = route
            .legs
            .iter()
            .map(|leg| RouteLeg {
                start_lat: leg
                    .start_location
                    .as_ref()
                    .and_then(|l| l.lat_lng.as_ref())
                    .map(|ll| ll.latitude)
                    .unwrap_or(origin.lat),
                start_lon: leg
                    .start_location
                    .as_ref()
                    .and_then(|l| l.lat_lng.as_ref())
                    .map(|ll| ll.longitude)
                    .unwrap_or(origin.lon),
                end_lat: leg
                    .end_location
                    .as_ref()
                    .and_then(|l| l.lat_lng.as_ref())
                    .map(|ll| ll.latitude)
                    .unwrap_or(destination.lat),
                end_lon: leg
                    .end_location
                    .as_ref()
                    .and_then(|l| l.lat_lng.as_ref())
                    .map(|ll| ll.longitude)
                    .unwrap_or(destination.lon),
                distance_meters: leg.distance_meters.unwrap_or(0),
                duration_seconds: parse_duration(leg.duration.as_deref()),
            })
            .collect();

        if legs.is_empty() {
            return Err(AppError::ExternalServiceError(
                "Route response contained no legs".to_string(),
            ));
        }

        Ok(RouteResult {
            encoded_polyline: route
                .polyline
                .and_then(|p| p.encoded_polyline)
                .unwrap_or_default(),
            distance_meters: route.distance_meters.unwrap_or(0),
            duration_seconds: parse_duration(route.duration.as_deref()),
            legs,
        })
    }
}

/// Durations come as "123s".
fn parse_duration(duration: Option<&str>) -> i64 {
    duration
        .and_then(|d| d.trim_end_matches('s').parse::<i64>().ok())
        .unwrap_or(0)
}

//! Route sampler: selects points along a polyline for weather queries.
//!
//! Walks the decoded polyline accumulating great-circle distance and emits a
//! sample roughly every 50 km, with the arrival time at each sample linearly
//! interpolated from the trip's departure time and total duration. Origin and
//! destination are always included, so even a short hop yields at least one
//! scorable point.

use chrono::{DateTime, Duration, Utc};

use crate::services::polyline::{decode_polyline, GeoPoint};

/// Target spacing between samples along the route.
const TARGET_INTERVAL_KM: f64 = 50.0;

/// Spacing multiplier applied under budget degradation (fewer provider calls).
const REDUCED_SAMPLING_FACTOR: f64 = 1.5;

/// Samples closer than this (in degrees, ~100 m) to the forced destination
/// sample are considered duplicates of it.
const DUPLICATE_EPSILON_DEG: f64 = 0.001;

/// Mean Earth radius in km (haversine).
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point selected for weather scoring, with its estimated arrival time.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledPoint {
    pub lat: f64,
    pub lon: f64,
    /// Estimated time of arrival at this point.
    pub eta_at: DateTime<Utc>,
    /// 0-based, contiguous ascending. Index 0 is always the route origin.
    pub point_index: i32,
}

/// Sample points along a route for weather queries.
///
/// The output is bounded by route length / spacing, not a fixed cap; callers
/// must handle variable-length output. An empty polyline yields no samples; a
/// zero-length route yields a single sample at the origin.
pub fn sample_route(
    encoded_polyline: &str,
    departure_at: DateTime<Utc>,
    total_duration_seconds: i64,
    reduce_sampling: bool,
) -> Vec<SampledPoint> {
    let points = decode_polyline(encoded_polyline);
    if points.is_empty() {
        return Vec::new();
    }

    let target_interval_km = if reduce_sampling {
        TARGET_INTERVAL_KM * REDUCED_SAMPLING_FACTOR
    } else {
        TARGET_INTERVAL_KM
    };

    // Cumulative distance along the vertex chain
    let mut distances = Vec::with_capacity(points.len());
    distances.push(0.0);
    for i in 1..points.len() {
        distances.push(distances[i - 1] + haversine_km(&points[i - 1], &points[i]));
    }

    let total_distance_km = *distances.last().unwrap_or(&0.0);
    if total_distance_km == 0.0 {
        return vec![SampledPoint {
            lat: points[0].lat,
            lon: points[0].lon,
            eta_at: departure_at,
            point_index: 0,
        }];
    }

    let mut sampled = Vec::new();
    let mut point_index = 0;

    // Origin is always the first sample, ETA exactly at departure
    sampled.push(SampledPoint {
        lat: points[0].lat,
        lon: points[0].lon,
        eta_at: departure_at,
        point_index,
    });
    point_index += 1;
    let mut next_sample_dist_km = target_interval_km;

    for i in 1..points.len() {
        if distances[i] >= next_sample_dist_km {
            let fraction = distances[i] / total_distance_km;
            let eta_at = eta_for_fraction(departure_at, total_duration_seconds, fraction);

            sampled.push(SampledPoint {
                lat: points[i].lat,
                lon: points[i].lon,
                eta_at,
                point_index,
            });
            point_index += 1;
            next_sample_dist_km = distances[i] + target_interval_km;
        }
    }

    // Destination is always included, unless the last interval sample already
    // landed (near enough) on it
    let last_point = &points[points.len() - 1];
    let last_sampled = &sampled[sampled.len() - 1];
    if (last_point.lat - last_sampled.lat).abs() > DUPLICATE_EPSILON_DEG
        || (last_point.lon - last_sampled.lon).abs() > DUPLICATE_EPSILON_DEG
    {
        sampled.push(SampledPoint {
            lat: last_point.lat,
            lon: last_point.lon,
            eta_at: departure_at + Duration::seconds(total_duration_seconds),
            point_index,
        });
    }

    sampled
}

fn eta_for_fraction(
    departure_at: DateTime<Utc>,
    total_duration_seconds: i64,
    fraction: f64,
) -> DateTime<Utc> {
    let offset_ms = (fraction * total_duration_seconds as f64 * 1000.0).round() as i64;
    departure_at + Duration::milliseconds(offset_ms)
}

/// Great-circle distance between two points in km.
fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let sin_lat = (d_lat / 2.0).sin();
    let sin_lon = (d_lon / 2.0).sin();
    let c = sin_lat * sin_lat
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * sin_lon * sin_lon;
    EARTH_RADIUS_KM * 2.0 * c.sqrt().atan2((1.0 - c).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::polyline::encode_polyline;

    fn departure() -> DateTime<Utc> {
        "2026-03-01T07:00:00Z".parse::<DateTime<Utc>>().unwrap()
    }

    /// ~600 km of points spaced ~111 km apart along a meridian.
    fn long_route() -> String {
        let points: Vec<GeoPoint> = (0..=6)
            .map(|i| GeoPoint {
                lat: 40.0 + i as f64,
                lon: -100.0,
            })
            .collect();
        encode_polyline(&points)
    }

    #[test]
    fn test_empty_polyline() {
        assert!(sample_route("", departure(), 3600, false).is_empty());
    }

    #[test]
    fn test_zero_length_route_single_sample() {
        let encoded = encode_polyline(&[GeoPoint {
            lat: 40.0,
            lon: -100.0,
        }]);
        let samples = sample_route(&encoded, departure(), 3600, false);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].eta_at, departure());
        assert_eq!(samples[0].point_index, 0);
    }

    #[test]
    fn test_origin_and_destination_always_included() {
        let samples = sample_route(&long_route(), departure(), 7200, false);
        assert!(samples.len() >= 2);

        let first = &samples[0];
        assert!((first.lat - 40.0).abs() < 1e-5);
        assert_eq!(first.eta_at, departure());

        let last = samples.last().unwrap();
        assert!((last.lat - 46.0).abs() < DUPLICATE_EPSILON_DEG);
        assert_eq!(last.eta_at, departure() + Duration::seconds(7200));
    }

    #[test]
    fn test_indices_contiguous_and_etas_monotonic() {
        let samples = sample_route(&long_route(), departure(), 21600, false);
        for (i, s) in samples.iter().enumerate() {
            assert_eq!(s.point_index, i as i32);
        }
        for w in samples.windows(2) {
            assert!(w[1].eta_at >= w[0].eta_at);
        }
    }

    #[test]
    fn test_reduced_sampling_yields_fewer_points() {
        let normal = sample_route(&long_route(), departure(), 21600, false);
        let reduced = sample_route(&long_route(), departure(), 21600, true);
        assert!(
            reduced.len() < normal.len(),
            "expected fewer samples under reduced sampling: {} vs {}",
            reduced.len(),
            normal.len()
        );
    }

    #[test]
    fn test_short_route_samples_endpoints_only() {
        // ~30 km route, below the 50 km interval: origin + destination
        let encoded = encode_polyline(&[
            GeoPoint {
                lat: 40.0,
                lon: -100.0,
            },
            GeoPoint {
                lat: 40.27,
                lon: -100.0,
            },
        ]);
        let samples = sample_route(&encoded, departure(), 1800, false);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].eta_at, departure() + Duration::seconds(1800));
    }

    #[test]
    fn test_eta_interpolation_is_distance_proportional() {
        let samples = sample_route(&long_route(), departure(), 6000, false);
        // Interior samples sit strictly between departure and arrival
        for s in &samples[1..samples.len() - 1] {
            assert!(s.eta_at > departure());
            assert!(s.eta_at < departure() + Duration::seconds(6000));
        }
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is ~111.2 km
        let a = GeoPoint {
            lat: 40.0,
            lon: -100.0,
        };
        let b = GeoPoint {
            lat: 41.0,
            lon: -100.0,
        };
        let d = haversine_km(&a, &b);
        assert!((d - 111.2).abs() < 1.0, "got {}", d);
    }
}

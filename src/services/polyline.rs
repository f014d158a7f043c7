//! Encoded polyline decoder (Google polyline algorithm).
//!
//! Coordinates are transmitted as running deltas, 5 bits per character with a
//! continuation bit (0x20), zig-zag sign encoding, scaled by 1e-5.
//!
//! Known limitation: malformed input produces garbage points rather than an
//! error. Route providers emit well-formed polylines, and leniency here keeps
//! the decoder total over real-world inputs.

/// A geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Decode an encoded polyline into an ordered sequence of points.
///
/// An empty string decodes to an empty sequence.
pub fn decode_polyline(encoded: &str) -> Vec<GeoPoint> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::new();
    let mut index = 0usize;
    let mut lat: i64 = 0;
    let mut lon: i64 = 0;

    while index < bytes.len() {
        let (delta_lat, next) = decode_value(bytes, index);
        lat += delta_lat;
        let (delta_lon, next) = decode_value(bytes, next);
        lon += delta_lon;
        index = next;

        points.push(GeoPoint {
            lat: lat as f64 / 1e5,
            lon: lon as f64 / 1e5,
        });
    }

    points
}

/// Decode one zig-zag varint starting at `index`, returning the signed delta
/// and the index of the next unread byte. Truncated input terminates the
/// chunk early (leniency over strictness).
fn decode_value(bytes: &[u8], mut index: usize) -> (i64, usize) {
    let mut shift = 0u32;
    let mut result: i64 = 0;

    while index < bytes.len() {
        let byte = i64::from(bytes[index]) - 63;
        index += 1;
        result |= (byte & 0x1f) << shift;
        shift += 5;
        if byte < 0x20 {
            break;
        }
    }

    let delta = if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    };
    (delta, index)
}

/// Reference encoder, inverse of `decode_polyline`. Test-only: the service
/// consumes polylines from the route provider and never produces them.
#[cfg(test)]
pub(crate) fn encode_polyline(points: &[GeoPoint]) -> String {
    let mut encoded = String::new();
    let mut prev_lat: i64 = 0;
    let mut prev_lon: i64 = 0;

    for p in points {
        let lat = (p.lat * 1e5).round() as i64;
        let lon = (p.lon * 1e5).round() as i64;
        encode_value(lat - prev_lat, &mut encoded);
        encode_value(lon - prev_lon, &mut encoded);
        prev_lat = lat;
        prev_lon = lon;
    }

    encoded
}

#[cfg(test)]
fn encode_value(value: i64, out: &mut String) {
    let mut v = if value < 0 { !(value << 1) } else { value << 1 };
    while v >= 0x20 {
        out.push(((0x20 | (v & 0x1f)) + 63) as u8 as char);
        v >>= 5;
    }
    out.push((v + 63) as u8 as char);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_empty() {
        assert!(decode_polyline("").is_empty());
    }

    #[test]
    fn test_decode_reference_polyline() {
        // Canonical example from the polyline algorithm documentation:
        // (38.5, -120.2), (40.7, -120.95), (43.252, -126.453)
        let points = decode_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@");
        assert_eq!(points.len(), 3);
        assert!((points[0].lat - 38.5).abs() < 1e-5);
        assert!((points[0].lon - -120.2).abs() < 1e-5);
        assert!((points[1].lat - 40.7).abs() < 1e-5);
        assert!((points[1].lon - -120.95).abs() < 1e-5);
        assert!((points[2].lat - 43.252).abs() < 1e-5);
        assert!((points[2].lon - -126.453).abs() < 1e-5);
    }

    #[test]
    fn test_round_trip() {
        let original = vec![
            GeoPoint {
                lat: 47.3769,
                lon: 8.5417,
            },
            GeoPoint {
                lat: 46.9481,
                lon: 7.4474,
            },
            GeoPoint {
                lat: 46.2044,
                lon: 6.1432,
            },
            GeoPoint {
                lat: -33.8688,
                lon: 151.2093,
            },
        ];

        let decoded = decode_polyline(&encode_polyline(&original));
        assert_eq!(decoded.len(), original.len());
        for (d, o) in decoded.iter().zip(original.iter()) {
            assert!((d.lat - o.lat).abs() < 1e-5, "{} vs {}", d.lat, o.lat);
            assert!((d.lon - o.lon).abs() < 1e-5, "{} vs {}", d.lon, o.lon);
        }
    }

    #[test]
    fn test_round_trip_single_point() {
        let original = vec![GeoPoint {
            lat: 19.4326,
            lon: -99.1332,
        }];
        let decoded = decode_polyline(&encode_polyline(&original));
        assert_eq!(decoded.len(), 1);
        assert!((decoded[0].lat - 19.4326).abs() < 1e-5);
        assert!((decoded[0].lon - -99.1332).abs() < 1e-5);
    }

    #[test]
    fn test_truncated_input_does_not_panic() {
        // Garbage in, garbage out, but never a panic or infinite loop.
        let points = decode_polyline("_p~iF");
        assert_eq!(points.len(), 1);
    }
}

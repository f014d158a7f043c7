//! Risk engine: pure scoring functions, no I/O.
//!
//! Point risk is a weighted sum of independently capped sub-scores:
//! precipitation (max 40) + wind (max 20) + alert severity (max 20)
//! + UV (max 10) + visibility (max 10), clamped to [0, 100]. No single
//! factor can saturate the score alone except the acute-hazard channels
//! (precipitation, alerts), which are weighted to dominate.

/// Risk banding shared by point and route scoring. The bands drive UI
/// color-coding, so both scorers must use the same boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Extreme,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Extreme => "extreme",
        }
    }
}

/// Severity of a provider-reported weather alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    Minor,
    Moderate,
    Severe,
    Extreme,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Minor => "minor",
            AlertSeverity::Moderate => "moderate",
            AlertSeverity::Severe => "severe",
            AlertSeverity::Extreme => "extreme",
        }
    }
}

/// Weather factors feeding the point-risk formula.
#[derive(Debug, Clone, Default)]
pub struct WeatherSample {
    /// Precipitation probability, 0-100.
    pub precip_prob: f64,
    /// Precipitation intensity in mm/h, when the provider reports one.
    pub precip_intensity: Option<f64>,
    pub wind_speed_kmh: f64,
    pub alert_severity: Option<AlertSeverity>,
    pub uv_index: Option<f64>,
    pub visibility_km: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskAssessment {
    /// Integer risk in [0, 100].
    pub score: i32,
    pub level: RiskLevel,
}

// ---------------------------------------------------------------------------
// Point risk
// ---------------------------------------------------------------------------

pub fn calculate_point_risk(sample: &WeatherSample) -> RiskAssessment {
    let precip = precip_score(sample);
    let wind = wind_score(sample.wind_speed_kmh);
    let alert = alert_score(sample.alert_severity);
    let uv = uv_score(sample.uv_index);
    let vis = visibility_score(sample.visibility_km);

    let score = (precip + wind + alert + uv + vis).round().min(100.0) as i32;
    RiskAssessment {
        score,
        level: score_to_level(score),
    }
}

/// Max 40: up to 25 from probability, up to 15 from intensity (10 mm/h caps
/// the intensity term). Without a reported intensity, a smaller
/// probability-derived proxy stands in.
fn precip_score(sample: &WeatherSample) -> f64 {
    let prob_factor = (sample.precip_prob / 100.0) * 25.0;
    let intensity_factor = match sample.precip_intensity {
        Some(intensity) => ((intensity / 10.0) * 15.0).min(15.0),
        None => (sample.precip_prob / 100.0) * 8.0,
    };
    prob_factor + intensity_factor
}

/// Max 20: zero below 20 km/h, linear 20→40 km/h onto 0→10, linear
/// 40→70 km/h onto 10→20, flat above.
fn wind_score(wind_speed_kmh: f64) -> f64 {
    if wind_speed_kmh < 20.0 {
        0.0
    } else if wind_speed_kmh < 40.0 {
        ((wind_speed_kmh - 20.0) / 20.0) * 10.0
    } else if wind_speed_kmh < 70.0 {
        10.0 + ((wind_speed_kmh - 40.0) / 30.0) * 10.0
    } else {
        20.0
    }
}

/// Max 20: fixed points per provider-reported severity.
fn alert_score(severity: Option<AlertSeverity>) -> f64 {
    match severity {
        None => 0.0,
        Some(AlertSeverity::Minor) => 3.0,
        Some(AlertSeverity::Moderate) => 10.0,
        Some(AlertSeverity::Severe) => 17.0,
        Some(AlertSeverity::Extreme) => 20.0,
    }
}

/// Max 10: banded at UV index 2/5/7/10.
fn uv_score(uv_index: Option<f64>) -> f64 {
    match uv_index {
        None => 0.0,
        Some(uv) if uv <= 2.0 => 0.0,
        Some(uv) if uv <= 5.0 => 2.0,
        Some(uv) if uv <= 7.0 => 5.0,
        Some(uv) if uv <= 10.0 => 8.0,
        Some(_) => 10.0,
    }
}

/// Max 10: lower visibility → higher risk, banded at 10/5/2 km.
fn visibility_score(visibility_km: Option<f64>) -> f64 {
    match visibility_km {
        None => 0.0,
        Some(v) if v > 10.0 => 0.0,
        Some(v) if v >= 5.0 => 3.0,
        Some(v) if v >= 2.0 => 6.0,
        Some(_) => 10.0,
    }
}

// ---------------------------------------------------------------------------
// Route risk
// ---------------------------------------------------------------------------

/// Aggregate point scores into a route score, biased towards the worst
/// stretch: 60% weight on the top ⌈30%⌉ of points (minimum 1), 40% on the
/// full-set average. A route is only as safe as its worst segment, but one
/// outlier should not alone dominate a multi-hour trip.
pub fn calculate_route_risk(point_scores: &[i32]) -> RiskAssessment {
    if point_scores.is_empty() {
        return RiskAssessment {
            score: 0,
            level: RiskLevel::Low,
        };
    }

    let mut sorted: Vec<i32> = point_scores.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    let top_count = ((sorted.len() as f64 * 0.3).ceil() as usize).max(1);
    let top_avg =
        sorted[..top_count].iter().map(|&s| f64::from(s)).sum::<f64>() / top_count as f64;
    let full_avg = sorted.iter().map(|&s| f64::from(s)).sum::<f64>() / sorted.len() as f64;

    let score = (top_avg * 0.6 + full_avg * 0.4).round() as i32;
    RiskAssessment {
        score,
        level: score_to_level(score),
    }
}

// ---------------------------------------------------------------------------
// Day score
// ---------------------------------------------------------------------------

/// Inverse "goodness" score for calendar/day-picker views.
pub fn calculate_day_score(avg_risk: f64) -> i32 {
    (100.0 - avg_risk).round().clamp(0.0, 100.0) as i32
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Total over all scores: [0,25] low, (25,50] moderate, (50,75] high,
/// (75,100] extreme.
pub fn score_to_level(score: i32) -> RiskLevel {
    if score <= 25 {
        RiskLevel::Low
    } else if score <= 50 {
        RiskLevel::Moderate
    } else if score <= 75 {
        RiskLevel::High
    } else {
        RiskLevel::Extreme
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_weather_scores_zero() {
        let risk = calculate_point_risk(&WeatherSample::default());
        assert_eq!(risk.score, 0);
        assert_eq!(risk.level, RiskLevel::Low);
    }

    #[test]
    fn test_extreme_inputs_stay_in_bounds() {
        let risk = calculate_point_risk(&WeatherSample {
            precip_prob: 100.0,
            precip_intensity: Some(100.0),
            wind_speed_kmh: 200.0,
            alert_severity: Some(AlertSeverity::Extreme),
            uv_index: Some(14.0),
            visibility_km: Some(0.1),
        });
        assert_eq!(risk.score, 100);
        assert_eq!(risk.level, RiskLevel::Extreme);
    }

    #[test]
    fn test_score_never_negative() {
        let risk = calculate_point_risk(&WeatherSample {
            precip_prob: 0.0,
            precip_intensity: None,
            wind_speed_kmh: 0.0,
            alert_severity: None,
            uv_index: Some(0.0),
            visibility_km: Some(50.0),
        });
        assert_eq!(risk.score, 0);
    }

    #[test]
    fn test_precip_intensity_fallback() {
        // No intensity: 80% probability → 0.8*25 + 0.8*8 = 26.4 → 26
        let risk = calculate_point_risk(&WeatherSample {
            precip_prob: 80.0,
            ..Default::default()
        });
        assert_eq!(risk.score, 26);
        assert_eq!(risk.level, RiskLevel::Moderate);
    }

    #[test]
    fn test_precip_intensity_capped_at_ten_mm() {
        // 10 mm/h and 30 mm/h both saturate the intensity term
        let at_cap = calculate_point_risk(&WeatherSample {
            precip_prob: 100.0,
            precip_intensity: Some(10.0),
            ..Default::default()
        });
        let over_cap = calculate_point_risk(&WeatherSample {
            precip_prob: 100.0,
            precip_intensity: Some(30.0),
            ..Default::default()
        });
        assert_eq!(at_cap.score, 40);
        assert_eq!(over_cap.score, 40);
    }

    #[test]
    fn test_wind_ramp_boundaries() {
        assert_eq!(wind_score(19.9), 0.0);
        assert_eq!(wind_score(20.0), 0.0);
        assert_eq!(wind_score(30.0), 5.0);
        assert_eq!(wind_score(40.0), 10.0);
        assert_eq!(wind_score(55.0), 15.0);
        assert_eq!(wind_score(70.0), 20.0);
        assert_eq!(wind_score(150.0), 20.0);
    }

    #[test]
    fn test_alert_severity_table() {
        assert_eq!(alert_score(Some(AlertSeverity::Minor)), 3.0);
        assert_eq!(alert_score(Some(AlertSeverity::Moderate)), 10.0);
        assert_eq!(alert_score(Some(AlertSeverity::Severe)), 17.0);
        assert_eq!(alert_score(Some(AlertSeverity::Extreme)), 20.0);
        assert_eq!(alert_score(None), 0.0);
    }

    #[test]
    fn test_uv_bands() {
        assert_eq!(uv_score(None), 0.0);
        assert_eq!(uv_score(Some(2.0)), 0.0);
        assert_eq!(uv_score(Some(5.0)), 2.0);
        assert_eq!(uv_score(Some(7.0)), 5.0);
        assert_eq!(uv_score(Some(10.0)), 8.0);
        assert_eq!(uv_score(Some(11.0)), 10.0);
    }

    #[test]
    fn test_visibility_bands() {
        assert_eq!(visibility_score(None), 0.0);
        assert_eq!(visibility_score(Some(15.0)), 0.0);
        assert_eq!(visibility_score(Some(10.0)), 3.0);
        assert_eq!(visibility_score(Some(5.0)), 3.0);
        assert_eq!(visibility_score(Some(2.0)), 6.0);
        assert_eq!(visibility_score(Some(1.9)), 10.0);
    }

    #[test]
    fn test_route_risk_blend() {
        // 5 points, top 30% → 1 point: worst avg 90, full avg 26
        // round(90*0.6 + 26*0.4) = round(54 + 10.4) = 64
        let risk = calculate_route_risk(&[90, 10, 10, 10, 10]);
        assert_eq!(risk.score, 64);
        assert_eq!(risk.level, RiskLevel::High);
    }

    #[test]
    fn test_route_risk_empty() {
        let risk = calculate_route_risk(&[]);
        assert_eq!(risk.score, 0);
        assert_eq!(risk.level, RiskLevel::Low);
    }

    #[test]
    fn test_route_risk_single_point() {
        let risk = calculate_route_risk(&[42]);
        assert_eq!(risk.score, 42);
        assert_eq!(risk.level, RiskLevel::Moderate);
    }

    #[test]
    fn test_route_risk_uniform() {
        let risk = calculate_route_risk(&[30, 30, 30, 30]);
        assert_eq!(risk.score, 30);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(score_to_level(0), RiskLevel::Low);
        assert_eq!(score_to_level(25), RiskLevel::Low);
        assert_eq!(score_to_level(26), RiskLevel::Moderate);
        assert_eq!(score_to_level(50), RiskLevel::Moderate);
        assert_eq!(score_to_level(51), RiskLevel::High);
        assert_eq!(score_to_level(75), RiskLevel::High);
        assert_eq!(score_to_level(76), RiskLevel::Extreme);
        assert_eq!(score_to_level(100), RiskLevel::Extreme);
    }

    #[test]
    fn test_level_total_over_all_scores() {
        for score in 0..=100 {
            // Must not panic and must be consistent with the band edges
            let level = score_to_level(score);
            match score {
                0..=25 => assert_eq!(level, RiskLevel::Low),
                26..=50 => assert_eq!(level, RiskLevel::Moderate),
                51..=75 => assert_eq!(level, RiskLevel::High),
                _ => assert_eq!(level, RiskLevel::Extreme),
            }
        }
    }

    #[test]
    fn test_day_score_inverts_risk() {
        assert_eq!(calculate_day_score(0.0), 100);
        assert_eq!(calculate_day_score(35.4), 65);
        assert_eq!(calculate_day_score(100.0), 0);
        assert_eq!(calculate_day_score(120.0), 0);
        assert_eq!(calculate_day_score(-5.0), 100);
    }
}

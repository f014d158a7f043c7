//! OpenRouter narrative generation.
//!
//! Trip summaries and departure analyses are produced by a free-tier model
//! via the OpenRouter chat-completions API with a JSON response contract.
//! Model output is untrusted: `parse_narrative` tolerates code fences and
//! schema drift, degrading to a stock recommendation rather than failing the
//! pipeline.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::AppError;
use crate::services::budget::UsageEntry;

const OPENROUTER_API_URL: &str = "https://openrouter.ai";

/// Free-tier model; swap requires no code change beyond this constant.
const MODEL: &str = "minimax/minimax-m2.5";

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

/// Structured narrative extracted from a model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripNarrative {
    pub recommendation: String,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Models reply with "bestWindow" per the prompt contract; accept both.
    #[serde(default, alias = "bestWindow", skip_serializing_if = "Option::is_none")]
    pub best_window: Option<DepartureWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartureWindow {
    pub start_hour: i32,
    pub end_hour: i32,
    /// Risk-score points saved by departing in this window.
    pub risk_reduction: i32,
}

fn default_confidence() -> f64 {
    0.5
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl LlmClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, OPENROUTER_API_URL)
    }

    /// Point the client at an alternate host (tests).
    pub fn with_base_url(api_key: Option<String>, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Free-tier model; logged for call-volume visibility.
    pub fn usage() -> UsageEntry {
        UsageEntry::new("openrouter", MODEL, Decimal::ZERO)
    }

    /// Summarize a computed trip into an actionable recommendation.
    pub async fn generate_trip_summary(
        &self,
        departure_at: chrono::DateTime<chrono::Utc>,
        total_distance_km: f64,
        total_duration_seconds: i64,
        overall_risk_score: i32,
        weather_data: &str,
    ) -> Result<TripNarrative, AppError> {
        let hours = total_duration_seconds / 3600;
        let minutes = (total_duration_seconds % 3600) / 60;
        let prompt = format!(
            "You are an en-route weather assistant. Analyze the weather data for a \
             trip and produce a short actionable recommendation.\n\n\
             TRIP:\n\
             - Departure: {}\n\
             - Distance: {} km\n\
             - Duration: {}h {}min\n\
             - Overall risk: {}/100\n\n\
             WEATHER POINTS:\n{}\n\n\
             Respond with JSON only: {{\"recommendation\": string (1-2 sentences, \
             actionable, e.g. \"Good time to leave\" or \"Consider delaying 2 hours\"), \
             \"reasons\": [2-3 weather-specific strings], \"confidence\": number 0-1}}",
            departure_at.to_rfc3339(),
            total_distance_km.round(),
            hours,
            minutes,
            overall_risk_score,
            weather_data,
        );

        self.complete(&prompt, 300).await
    }

    /// Compare alternative departure times against the current plan.
    pub async fn generate_departure_analysis(
        &self,
        departure_at: chrono::DateTime<chrono::Utc>,
        current_risk: i32,
        alternative_risks: &str,
    ) -> Result<TripNarrative, AppError> {
        let prompt = format!(
            "Analyze alternative departure windows for a trip. Current risk is \
             {}/100 departing at {}.\n\n\
             Alternative risks: {}\n\n\
             Respond with JSON only: {{\"recommendation\": string, \"reasons\": \
             [1-2 strings], \"confidence\": number 0-1, \"bestWindow\": \
             {{\"startHour\": number, \"endHour\": number, \"riskReduction\": number}}}}",
            current_risk,
            departure_at.to_rfc3339(),
            alternative_risks,
        );

        self.complete(&prompt, 250).await
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<TripNarrative, AppError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::ConfigError("OPENROUTER_API_KEY not set".to_string()))?;

        let body = json!({
            "model": MODEL,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.3,
            "max_tokens": max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/api/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("OpenRouter request: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamStatus {
                provider: "openrouter",
                status: response.status().as_u16(),
            });
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("OpenRouter body: {e}")))?;

        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(parse_narrative(&content))
    }
}

/// Extract a narrative from raw model output. Strips markdown fences, then
/// falls back to a stock narrative if the JSON does not parse.
pub fn parse_narrative(content: &str) -> TripNarrative {
    let trimmed = content.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    match serde_json::from_str::<TripNarrative>(stripped) {
        Ok(mut narrative) => {
            narrative.confidence = narrative.confidence.clamp(0.0, 1.0);
            narrative
        }
        Err(err) => {
            tracing::warn!("Unparseable model output, using fallback narrative: {}", err);
            TripNarrative {
                recommendation: "No recommendation available".to_string(),
                reasons: Vec::new(),
                confidence: 0.5,
                best_window: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let narrative = parse_narrative(
            r#"{"recommendation": "Good time to leave", "reasons": ["Clear skies"], "confidence": 0.9}"#,
        );
        assert_eq!(narrative.recommendation, "Good time to leave");
        assert_eq!(narrative.reasons, vec!["Clear skies"]);
        assert_eq!(narrative.confidence, 0.9);
        assert!(narrative.best_window.is_none());
    }

    #[test]
    fn test_parse_fenced_json() {
        let narrative = parse_narrative(
            "```json\n{\"recommendation\": \"Delay 2 hours\", \"reasons\": [], \"confidence\": 0.7}\n```",
        );
        assert_eq!(narrative.recommendation, "Delay 2 hours");
    }

    #[test]
    fn test_parse_with_best_window() {
        let narrative = parse_narrative(
            r#"{"recommendation": "Leave earlier", "reasons": ["Storm at noon"], "confidence": 0.8,
                "best_window": {"startHour": 6, "endHour": 8, "riskReduction": 25}}"#,
        );
        let window = narrative.best_window.unwrap();
        assert_eq!(window.start_hour, 6);
        assert_eq!(window.end_hour, 8);
        assert_eq!(window.risk_reduction, 25);
    }

    #[test]
    fn test_parse_camel_case_best_window_key() {
        // The departure-analysis prompt asks for "bestWindow"
        let narrative = parse_narrative(
            r#"{"recommendation": "Leave at 6am", "reasons": [], "confidence": 0.8,
                "bestWindow": {"startHour": 6, "endHour": 8, "riskReduction": 20}}"#,
        );
        let window = narrative.best_window.expect("bestWindow key must deserialize");
        assert_eq!(window.start_hour, 6);
        assert_eq!(window.risk_reduction, 20);
    }

    #[test]
    fn test_garbage_falls_back() {
        let narrative = parse_narrative("I think you should probably just drive carefully.");
        assert_eq!(narrative.recommendation, "No recommendation available");
        assert!(narrative.reasons.is_empty());
        assert_eq!(narrative.confidence, 0.5);
    }

    #[test]
    fn test_confidence_clamped() {
        let narrative =
            parse_narrative(r#"{"recommendation": "x", "reasons": [], "confidence": 3.5}"#);
        assert_eq!(narrative.confidence, 1.0);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let narrative = parse_narrative(r#"{"recommendation": "x"}"#);
        assert!(narrative.reasons.is_empty());
        assert_eq!(narrative.confidence, 0.5);
    }
}

use sqlx::PgPool;

use crate::services::google_routes::RoutesClient;
use crate::services::llm::LlmClient;
use crate::services::weather_router::WeatherRouter;

/// Shared application state, cloned per request/task.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub routes_client: RoutesClient,
    pub weather: WeatherRouter,
    pub llm: LlmClient,
}

// Trip Risk API v0.1
use axum::routing::{get, post};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod errors;
mod helpers;
mod routes;
mod services;
mod state;

use config::AppConfig;
use services::google_routes::RoutesClient;
use services::llm::LlmClient;
use services::noaa::NoaaClient;
use services::openweather::OpenWeatherClient;
use services::weather_router::WeatherRouter;
use state::AppState;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 2;

/// Trip Risk API OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Trip Risk API",
        version = "0.1.0",
        description = "Trip weather-risk advisory API. Computes driving routes via \
            Google Routes, samples weather along the route from NOAA and OpenWeather, \
            scores each point and the full route for weather risk, and raises alerts \
            for high-risk segments, severe weather, and imminent rain.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Trips", description = "Trip planning, weather points, alerts, and narratives"),
        (name = "Usage", description = "Provider spend and budget state"),
    ),
    paths(
        routes::health::health_check,
        routes::trips::create_trip,
        routes::trips::get_trip,
        routes::trips::recompute_trip,
        routes::trips::get_trip_weather,
        routes::trips::get_trip_alerts,
        routes::trips::get_trip_summary,
        routes::trips::get_trip_day_scores,
        routes::usage::get_usage,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::trips::LocationRequest,
            routes::trips::CreateTripRequest,
            routes::trips::TripResponse,
            routes::trips::StopResponse,
            routes::trips::LegResponse,
            routes::trips::WeatherPointResponse,
            routes::trips::TripWeatherResponse,
            routes::trips::AlertResponse,
            routes::trips::TripSummaryResponse,
            routes::trips::SummaryResponse,
            routes::trips::DayScoreResponse,
            routes::usage::UsageResponse,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trip_risk_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // Set up database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    // Provider clients
    let noaa = NoaaClient::new(&config.noaa_user_agent);
    let openweather = OpenWeatherClient::new(config.openweather_api_key.clone());
    let weather = WeatherRouter::new(noaa, openweather);
    let routes_client = RoutesClient::new(config.google_maps_api_key.clone());
    let llm = LlmClient::new(config.openrouter_api_key.clone());

    let app_state = AppState {
        pool,
        routes_client,
        weather,
        llm,
    };

    // Spawn the background scheduler (recalculation + minutely precip checks)
    tokio::spawn(services::scheduler::run_scheduler(app_state.clone()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/trips", post(routes::trips::create_trip))
        .route("/api/v1/trips/:id", get(routes::trips::get_trip))
        .route(
            "/api/v1/trips/:id/recompute",
            post(routes::trips::recompute_trip),
        )
        .route(
            "/api/v1/trips/:id/weather",
            get(routes::trips::get_trip_weather),
        )
        .route(
            "/api/v1/trips/:id/alerts",
            get(routes::trips::get_trip_alerts),
        )
        .route(
            "/api/v1/trips/:id/summary",
            get(routes::trips::get_trip_summary),
        )
        .route(
            "/api/v1/trips/:id/day-scores",
            get(routes::trips::get_trip_day_scores),
        )
        .route("/api/v1/usage", get(routes::usage::get_usage))
        .with_state(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}

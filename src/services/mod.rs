pub mod alerts;
pub mod budget;
pub mod day_scores;
pub mod departure;
pub mod google_routes;
pub mod llm;
pub mod noaa;
pub mod openweather;
pub mod pipeline;
pub mod polyline;
pub mod retry;
pub mod risk;
pub mod sampler;
pub mod scheduler;
pub mod weather_router;

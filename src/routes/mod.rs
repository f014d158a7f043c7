pub mod health;
pub mod trips;
pub mod usage;

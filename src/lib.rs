pub mod configuration;
pub mod db;
pub mod health;
pub mod middleware;
pub mod routes;
pub mod startup;
pub mod telemetry;

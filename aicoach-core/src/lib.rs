pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod http_client;
pub mod inflight;
pub mod model;
pub mod normalizer;
pub mod orchestrator;
pub mod provider;
pub mod provider_factory;
pub mod providers;
pub mod router;
pub mod telemetry;

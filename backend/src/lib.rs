pub mod audit;
pub mod config;
pub mod envelope;
pub mod error;
pub mod inference;
pub mod orchestrator;
pub mod routes;

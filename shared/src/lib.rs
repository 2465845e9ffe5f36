//! Shared building blocks for the streamboot workspace.
pub mod config;
pub mod errors;
pub mod log_sink;
pub mod models;
pub mod secrets;

//! Beacon Core: configuration, error types and the telemetry event model.

pub mod config;
pub mod error;
pub mod models;

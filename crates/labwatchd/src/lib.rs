//! labwatchd - homelab telemetry aggregator
//!
//! Serves a cached, throttled snapshot of homelab metrics, forwards
//! dashboard actions to the homelab and accepts pushed host telemetry.

pub mod actions;
pub mod aggregator;
pub mod chaos;
pub mod config;
pub mod drift;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod sources;

pub use aggregator::{Aggregator, AggregatorSettings};
pub use config::Config;
pub use server::{AppState, AppStateArc};

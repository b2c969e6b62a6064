//! `Conclave` Server
//!
//! Multi-model deliberation proxy. Fans each query out to a council of
//! heterogeneous model providers, drives peer-review rounds, and
//! synthesizes a single consensus decision, staying robust to individual
//! provider failures.

pub mod analytics;
pub mod api;
pub mod config;
pub mod council;
pub mod db;
pub mod health;
pub mod observability;
pub mod orchestrator;
pub mod pool;
pub mod synthesis;

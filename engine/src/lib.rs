//! Tournament scoring and leaderboard aggregation engine.
//!
//! Converts raw per-player match results pulled from external statistics
//! providers into point totals and merges them incrementally into persisted
//! per-team standings. The merge is additive, so repeated partial batches
//! converge to the same totals as one full recomputation.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod models;
pub mod providers;
pub mod routes;
pub mod scoring;
pub mod state;

pub use error::{EngineError, Result};

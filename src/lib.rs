//! Restaurant inspection risk core
//!
//! Turns per-restaurant inspection histories into fixed-size feature rows,
//! trains a next-score regressor and a risk-level classifier on them, and
//! serves predictions from an atomically persisted model snapshot.

pub mod analytics;
pub mod config;
pub mod error;
pub mod ml;
pub mod models;

pub use error::{AppError, Result};

//! Embedding progress estimation.
//!
//! Smooths sparse backend status snapshots into monotonic display progress,
//! and drives polling and animation for a set of tracked resources.

#![warn(missing_docs)]

pub mod config;
pub mod estimator;
pub mod driver;

pub use config::{ConfigError, EstimatorConfig};
pub use estimator::{InterpolationState, ProgressEstimator, Tickable, MAX_INTERPOLATED_PERCENTAGE};
pub use driver::{DriverHandle, ProgressDriver, ProgressFrame, SourceError, StatusSource};

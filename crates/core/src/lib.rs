//! NaLaMap core data models.
//!
//! This crate defines the status snapshots reported for tracked backends
//! and the read model handed to progress views.

#![warn(missing_docs)]

// Identities
mod id;

// Snapshots and display
mod status;
mod reading;

// Re-exports
pub use id::ResourceKey;
pub use status::{EmbeddingState, StatusSnapshot, StatusReport};
pub use reading::ProgressReading;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

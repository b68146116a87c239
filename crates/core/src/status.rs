//! Status snapshots reported by the embedding backend.

use crate::id::ResourceKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One poll response: the latest snapshot for every tracked key.
pub type StatusReport = BTreeMap<ResourceKey, StatusSnapshot>;

/// Embedding state of a tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingState {
    /// Registered, indexing not started yet
    Waiting,
    /// Indexing is running
    Processing,
    /// All layers are embedded
    Completed,
    /// Indexing failed
    Error,
    /// Status could not be classified
    #[default]
    #[serde(other)]
    Unknown,
}

impl EmbeddingState {
    /// Whether no further progress will be reported.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EmbeddingState::Completed | EmbeddingState::Error)
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingState::Waiting => "waiting",
            EmbeddingState::Processing => "processing",
            EmbeddingState::Completed => "completed",
            EmbeddingState::Error => "error",
            EmbeddingState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EmbeddingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative status of one tracked resource.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSnapshot {
    /// Total units of work, 0 when unknown
    pub total: u64,

    /// Units completed so far
    pub encoded: f64,

    /// Percentage as computed by the source
    pub percentage: f64,

    /// Reported state
    pub state: EmbeddingState,

    /// Whether the backend is actively working
    pub in_progress: bool,

    /// Whether the backend reports the work as done
    pub complete: bool,

    /// Human-readable error message
    pub error: Option<String>,

    /// Error classification, e.g. a certificate trust failure
    pub error_type: Option<String>,
}

impl StatusSnapshot {
    /// Snapshot of a resource that has not started yet.
    pub fn waiting(total: u64) -> Self {
        Self {
            total,
            state: EmbeddingState::Waiting,
            ..Default::default()
        }
    }

    /// Snapshot of a resource being processed.
    pub fn processing(total: u64, encoded: f64) -> Self {
        Self {
            total,
            encoded,
            percentage: percentage_of(encoded, total),
            state: EmbeddingState::Processing,
            in_progress: true,
            ..Default::default()
        }
    }

    /// Snapshot of a finished resource.
    pub fn completed(total: u64) -> Self {
        Self {
            total,
            encoded: total as f64,
            percentage: 100.0,
            state: EmbeddingState::Completed,
            complete: true,
            ..Default::default()
        }
    }

    /// Snapshot of a failed resource.
    pub fn failed(total: u64, encoded: f64, message: impl Into<String>) -> Self {
        Self {
            total,
            encoded,
            percentage: percentage_of(encoded, total),
            state: EmbeddingState::Error,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Attach an error classification.
    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    /// Whether the backend is embedding right now.
    ///
    /// A snapshot flagged `complete` is never active, whatever its state says.
    pub fn is_actively_processing(&self) -> bool {
        self.state == EmbeddingState::Processing && self.in_progress && !self.complete
    }

    /// Whether the snapshot reports completion.
    pub fn reports_completion(&self) -> bool {
        self.complete || self.state == EmbeddingState::Completed
    }

    /// Whether no further progress will be reported.
    pub fn is_terminal(&self) -> bool {
        self.complete || self.state.is_terminal()
    }

    /// Copy with degenerate numbers clamped into range.
    ///
    /// `encoded` ends up in `[0, total]` (or `[0, inf)` with an unknown total)
    /// and `percentage` in `[0, 100]`. Non-finite values become 0. A
    /// `complete` flag on a non-error snapshot promotes it to `completed`.
    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();

        if out.complete && out.state != EmbeddingState::Error {
            out.state = EmbeddingState::Completed;
            out.in_progress = false;
        }

        out.encoded = if self.encoded.is_finite() {
            self.encoded.max(0.0)
        } else {
            0.0
        };
        if out.total > 0 {
            out.encoded = out.encoded.min(out.total as f64);
        }

        out.percentage = if self.percentage.is_finite() {
            self.percentage.clamp(0.0, 100.0)
        } else {
            0.0
        };

        out
    }
}

fn percentage_of(encoded: f64, total: u64) -> f64 {
    if total > 0 {
        (encoded / total as f64) * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_deserializes_lowercase() {
        let state: EmbeddingState = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(state, EmbeddingState::Processing);
        assert_eq!(serde_json::to_string(&EmbeddingState::Completed).unwrap(), "\"completed\"");
    }

    #[test]
    fn test_unrecognized_state_is_unknown() {
        let state: EmbeddingState = serde_json::from_str("\"reindexing\"").unwrap();
        assert_eq!(state, EmbeddingState::Unknown);
    }

    #[test]
    fn test_snapshot_missing_fields_default() {
        let snapshot: StatusSnapshot = serde_json::from_str(r#"{"total": 12}"#).unwrap();
        assert_eq!(snapshot.total, 12);
        assert_eq!(snapshot.encoded, 0.0);
        assert_eq!(snapshot.state, EmbeddingState::Unknown);
        assert!(!snapshot.in_progress);
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn test_report_deserializes_by_key() {
        let json = r#"{
            "https://geo.example/geoserver": {
                "total": 40, "encoded": 10, "percentage": 25,
                "state": "processing", "in_progress": true, "complete": false, "error": null
            },
            "https://other.example/geoserver": {
                "total": 5, "encoded": 0, "percentage": 0,
                "state": "error", "in_progress": false, "complete": false,
                "error": "certificate verify failed", "error_type": "ssl_certificate"
            }
        }"#;
        let report: StatusReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.len(), 2);

        let first = &report[&ResourceKey::new("https://geo.example/geoserver")];
        assert!(first.is_actively_processing());
        assert_eq!(first.encoded, 10.0);

        let second = &report[&ResourceKey::new("https://other.example/geoserver")];
        assert!(second.is_terminal());
        assert_eq!(second.error_type.as_deref(), Some("ssl_certificate"));
    }

    #[test]
    fn test_terminal_checks() {
        assert!(StatusSnapshot::completed(3).is_terminal());
        assert!(StatusSnapshot::failed(3, 1.0, "boom").is_terminal());
        assert!(!StatusSnapshot::processing(3, 1.0).is_terminal());
        assert!(!StatusSnapshot::waiting(3).is_terminal());

        let flagged = StatusSnapshot {
            complete: true,
            state: EmbeddingState::Processing,
            ..Default::default()
        };
        assert!(flagged.is_terminal());
        assert!(flagged.reports_completion());
    }

    #[test]
    fn test_processing_without_in_progress_is_not_active() {
        let snapshot = StatusSnapshot {
            in_progress: false,
            ..StatusSnapshot::processing(10, 2.0)
        };
        assert!(!snapshot.is_actively_processing());
    }

    #[test]
    fn test_sanitized_clamps_degenerate_numbers() {
        let snapshot = StatusSnapshot {
            total: 10,
            encoded: 14.0,
            percentage: 140.0,
            ..Default::default()
        };
        let clean = snapshot.sanitized();
        assert_eq!(clean.encoded, 10.0);
        assert_eq!(clean.percentage, 100.0);

        let negative = StatusSnapshot {
            encoded: -3.0,
            percentage: f64::NAN,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(negative.encoded, 0.0);
        assert_eq!(negative.percentage, 0.0);
    }

    #[test]
    fn test_complete_flag_overrides_processing_state() {
        let snapshot = StatusSnapshot {
            complete: true,
            ..StatusSnapshot::processing(10, 10.0)
        };
        assert!(!snapshot.is_actively_processing());

        let clean = snapshot.sanitized();
        assert_eq!(clean.state, EmbeddingState::Completed);
        assert!(!clean.in_progress);
    }

    #[test]
    fn test_sanitized_unknown_total_keeps_encoded() {
        let clean = StatusSnapshot::processing(0, 42.0).sanitized();
        assert_eq!(clean.encoded, 42.0);
        assert_eq!(clean.percentage, 0.0);
    }
}

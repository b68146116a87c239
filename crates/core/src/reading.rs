//! Read model consumed by progress views.

use crate::status::EmbeddingState;
use serde::{Deserialize, Serialize};

/// What a progress bar shows for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReading {
    /// Smoothed number of completed units
    pub display_value: f64,

    /// Smoothed percentage, below 100 until completion is confirmed
    pub percentage_display: f64,

    /// Last reported state
    pub state: EmbeddingState,

    /// Total units of work, 0 when unknown
    pub total: u64,

    /// Error message passed through from the snapshot
    pub error: Option<String>,

    /// Error classification passed through from the snapshot
    pub error_type: Option<String>,
}

impl ProgressReading {
    /// Text shown next to the bar.
    pub fn status_label(&self) -> String {
        match self.state {
            EmbeddingState::Waiting => "Waiting to start".to_string(),
            EmbeddingState::Processing => {
                let done = self.display_value.floor() as u64;
                if self.total > 0 {
                    format!("Embedding in progress: {} / {}", done, self.total)
                } else {
                    format!("Embedding in progress: {}", done)
                }
            }
            EmbeddingState::Completed => "✓ Embedding complete".to_string(),
            EmbeddingState::Error => format!(
                "✗ Error: {}",
                self.error.as_deref().unwrap_or("unknown error")
            ),
            EmbeddingState::Unknown => "Status unknown".to_string(),
        }
    }

    /// Whether the view should show an indeterminate indicator instead of a bar.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self.state, EmbeddingState::Waiting | EmbeddingState::Unknown)
    }
}

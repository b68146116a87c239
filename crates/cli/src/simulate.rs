//! In-process stand-in for a GeoServer embedding backend.

use async_trait::async_trait;
use nalamap_core::{ResourceKey, StatusReport, StatusSnapshot};
use nalamap_progress::{SourceError, StatusSource};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One simulated backend.
#[derive(Debug, Clone)]
pub struct SimulatedResource {
    /// Key reported for this backend
    pub key: ResourceKey,
    /// Layers to embed
    pub total: u64,
    /// Layers embedded per second
    pub rate: f64,
    /// Fail once this fraction of the work is done
    pub fail_at: Option<f64>,
}

/// Reports `waiting` on the first poll, then linear progress until done.
pub struct SimulatedBackend {
    resources: Vec<SimulatedResource>,
    started: Mutex<Option<Instant>>,
}

impl SimulatedBackend {
    /// Create a backend serving the given resources.
    pub fn new(resources: Vec<SimulatedResource>) -> Self {
        Self {
            resources,
            started: Mutex::new(None),
        }
    }

    /// Keys of every simulated resource.
    pub fn keys(&self) -> Vec<ResourceKey> {
        self.resources.iter().map(|r| r.key.clone()).collect()
    }

    /// Status of every resource after `elapsed`, or `None` before the first poll.
    pub fn report_at(&self, elapsed: Option<Duration>) -> StatusReport {
        self.resources
            .iter()
            .map(|r| (r.key.clone(), r.snapshot_at(elapsed)))
            .collect()
    }
}

impl SimulatedResource {
    fn snapshot_at(&self, elapsed: Option<Duration>) -> StatusSnapshot {
        let Some(elapsed) = elapsed else {
            return StatusSnapshot::waiting(self.total);
        };

        // Backends report whole layers only.
        let encoded = (self.rate * elapsed.as_secs_f64()).floor();

        if let Some(fraction) = self.fail_at {
            let limit = (self.total as f64 * fraction).floor();
            if encoded >= limit {
                return StatusSnapshot::failed(
                    self.total,
                    limit,
                    "certificate verify failed: self-signed certificate",
                )
                .with_error_type("ssl_certificate");
            }
        }

        if encoded >= self.total as f64 {
            return StatusSnapshot::completed(self.total);
        }

        let mut snapshot = StatusSnapshot::processing(self.total, encoded);
        snapshot.percentage = snapshot.percentage.round();
        snapshot
    }
}

#[async_trait]
impl StatusSource for SimulatedBackend {
    async fn fetch(&self, keys: &[ResourceKey]) -> Result<StatusReport, SourceError> {
        let elapsed = {
            let mut started = self
                .started
                .lock()
                .map_err(|_| SourceError::Unavailable("simulator state poisoned".to_string()))?;
            match *started {
                Some(at) => Some(at.elapsed()),
                None => {
                    *started = Some(Instant::now());
                    None
                }
            }
        };

        let mut report = self.report_at(elapsed);
        report.retain(|key, _| keys.contains(key));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalamap_core::EmbeddingState;

    fn resource(fail_at: Option<f64>) -> SimulatedResource {
        SimulatedResource {
            key: ResourceKey::new("sim://0"),
            total: 20,
            rate: 2.0,
            fail_at,
        }
    }

    #[test]
    fn test_first_poll_is_waiting() {
        let snapshot = resource(None).snapshot_at(None);
        assert_eq!(snapshot.state, EmbeddingState::Waiting);
    }

    #[test]
    fn test_linear_progress_in_whole_layers() {
        let snapshot = resource(None).snapshot_at(Some(Duration::from_millis(3_700)));
        assert!(snapshot.is_actively_processing());
        assert_eq!(snapshot.encoded, 7.0);
        assert_eq!(snapshot.percentage, 35.0);
    }

    #[test]
    fn test_completes_at_total() {
        let snapshot = resource(None).snapshot_at(Some(Duration::from_secs(11)));
        assert_eq!(snapshot.state, EmbeddingState::Completed);
        assert!(snapshot.complete);
        assert_eq!(snapshot.encoded, 20.0);
    }

    #[test]
    fn test_fails_partway() {
        let snapshot = resource(Some(0.5)).snapshot_at(Some(Duration::from_secs(6)));
        assert_eq!(snapshot.state, EmbeddingState::Error);
        assert_eq!(snapshot.encoded, 10.0);
        assert_eq!(snapshot.error_type.as_deref(), Some("ssl_certificate"));
    }

    #[tokio::test]
    async fn test_fetch_filters_keys() {
        let backend = SimulatedBackend::new(vec![
            resource(None),
            SimulatedResource {
                key: ResourceKey::new("sim://1"),
                ..resource(None)
            },
        ]);

        let report = backend.fetch(&[ResourceKey::new("sim://1")]).await.unwrap();
        assert_eq!(report.len(), 1);
        assert!(report.contains_key(&ResourceKey::new("sim://1")));

        let all = backend.fetch(&backend.keys()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.values().all(|s| s.state != EmbeddingState::Waiting));
    }
}

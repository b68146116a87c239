//! Display progress estimation between status snapshots.
//!
//! Snapshots arrive every few seconds. In between, the displayed value is
//! extrapolated from the last snapshot with a velocity measured from
//! consecutive snapshots. The extrapolation is always anchored at the last
//! snapshot, so repeated ticks never compound error.

use crate::config::EstimatorConfig;
use nalamap_core::{EmbeddingState, ProgressReading, ResourceKey, StatusSnapshot, Time};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Highest percentage shown before the backend confirms completion.
pub const MAX_INTERPOLATED_PERCENTAGE: f64 = 99.9;

/// Something a host timer or frame callback can drive.
pub trait Tickable {
    /// Advance every animated item to `now`. Returns how many items moved.
    fn tick_all(&mut self, now: Time) -> usize;

    /// Whether further ticks can change anything.
    fn is_animating(&self) -> bool;
}

/// Interpolation state of one tracked resource.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationState {
    /// Last reported `encoded`; the extrapolation anchor
    pub baseline: f64,

    /// Value shown to the user
    pub display_value: f64,

    /// Percentage shown to the user
    pub percentage_display: f64,

    /// Estimated units per second
    pub velocity: f64,

    /// When the last snapshot was ingested
    pub last_update: Option<Time>,

    /// Last snapshot as ingested
    pub snapshot: StatusSnapshot,
}

impl InterpolationState {
    fn new(default_velocity: f64) -> Self {
        Self {
            baseline: 0.0,
            display_value: 0.0,
            percentage_display: 0.0,
            velocity: default_velocity,
            last_update: None,
            snapshot: StatusSnapshot::waiting(0),
        }
    }

    /// Whether ticks move this resource forward.
    pub fn is_advancing(&self) -> bool {
        self.snapshot.is_actively_processing() && self.velocity > 0.0
    }

    fn advance(&mut self, now: Time) -> bool {
        if !self.is_advancing() {
            return false;
        }
        let Some(anchor) = self.last_update else {
            return false;
        };

        let elapsed = seconds_between(anchor, now).max(0.0);
        let total = self.snapshot.total;

        let mut predicted = self.baseline + self.velocity * elapsed;
        if total > 0 {
            predicted = predicted.min(total as f64);
        }

        // Never move backward within a snapshot interval.
        if predicted <= self.display_value {
            return false;
        }

        self.display_value = predicted;
        if total > 0 {
            let percentage = (predicted / total as f64 * 100.0).min(MAX_INTERPOLATED_PERCENTAGE);
            self.percentage_display = self.percentage_display.max(percentage);
        }
        true
    }

    fn reading(&self) -> ProgressReading {
        ProgressReading {
            display_value: self.display_value,
            percentage_display: self.percentage_display,
            state: self.snapshot.state,
            total: self.snapshot.total,
            error: self.snapshot.error.clone(),
            error_type: self.snapshot.error_type.clone(),
        }
    }
}

/// Smooths sparse snapshots into monotonic display progress, per resource.
#[derive(Debug, Clone, Default)]
pub struct ProgressEstimator {
    config: EstimatorConfig,
    states: BTreeMap<ResourceKey, InterpolationState>,
}

impl ProgressEstimator {
    /// Create an estimator with the given configuration.
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            states: BTreeMap::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Start tracking a resource. Returns false if it was already tracked.
    pub fn track(&mut self, key: impl Into<ResourceKey>) -> bool {
        let key = key.into();
        if self.states.contains_key(&key) {
            return false;
        }
        debug!("Tracking {}", key);
        self.states
            .insert(key, InterpolationState::new(self.config.default_velocity));
        true
    }

    /// Stop tracking a resource. Returns false if it was not tracked.
    pub fn untrack(&mut self, key: &str) -> bool {
        let removed = self.states.remove(key).is_some();
        if removed {
            debug!("Stopped tracking {}", key);
        }
        removed
    }

    /// Apply an authoritative snapshot.
    pub fn ingest_snapshot(&mut self, key: &str, snapshot: &StatusSnapshot, now: Time) {
        let snapshot = snapshot.sanitized();
        if !self.states.contains_key(key) {
            self.track(key);
        }
        let default_velocity = self.config.default_velocity;
        let Some(state) = self.states.get_mut(key) else {
            return;
        };
        let previous = state.snapshot.state;

        if snapshot.is_actively_processing() {
            let velocity = match state.last_update {
                Some(last) => {
                    let time_delta = seconds_between(last, now);
                    // Baseline holds the previous reported value, not the display value.
                    let layers_delta = snapshot.encoded - state.baseline;
                    if layers_delta < 0.0 {
                        warn!(
                            "{} reported {} encoded after {}; ignoring for velocity",
                            key, snapshot.encoded, state.baseline
                        );
                    }

                    let measured = if time_delta > 0.0 && layers_delta > 0.0 {
                        layers_delta / time_delta
                    } else {
                        0.0
                    };

                    if measured > 0.0 {
                        measured
                    } else if state.velocity > 0.0 {
                        state.velocity
                    } else {
                        default_velocity
                    }
                }
                None => default_velocity,
            };

            state.baseline = snapshot.encoded;
            state.display_value = snapshot.encoded;
            state.percentage_display = snapshot_percentage(&snapshot).min(MAX_INTERPOLATED_PERCENTAGE);
            state.velocity = velocity;
        } else {
            state.baseline = snapshot.encoded;
            state.display_value = snapshot.encoded;

            if snapshot.reports_completion() {
                if snapshot.total > 0 {
                    state.display_value = snapshot.total as f64;
                }
                state.percentage_display = 100.0;
            } else {
                state.percentage_display = snapshot_percentage(&snapshot).min(MAX_INTERPOLATED_PERCENTAGE);
            }

            state.velocity = if snapshot.is_terminal() {
                0.0
            } else {
                default_velocity
            };
        }
        state.last_update = Some(now);

        if previous != snapshot.state {
            if snapshot.is_terminal() {
                info!("{} is {} at {} / {}", key, snapshot.state, snapshot.encoded, snapshot.total);
            } else {
                debug!("{} moved from {} to {}", key, previous, snapshot.state);
            }
        }
        debug!(
            "Ingested {}: encoded={} velocity={:.3}",
            key, snapshot.encoded, state.velocity
        );

        state.snapshot = snapshot;
    }

    /// Extrapolate one resource to `now`. Returns true if its display value moved.
    pub fn tick(&mut self, key: &str, now: Time) -> bool {
        if !self.config.interpolation_enabled {
            return false;
        }
        self.states
            .get_mut(key)
            .map(|state| state.advance(now))
            .unwrap_or(false)
    }

    /// Current display values for one resource.
    pub fn read(&self, key: &str) -> Option<ProgressReading> {
        self.states.get(key).map(InterpolationState::reading)
    }

    /// Current display values for every resource, ordered by key.
    pub fn readings(&self) -> Vec<(ResourceKey, ProgressReading)> {
        self.states
            .iter()
            .map(|(key, state)| (key.clone(), state.reading()))
            .collect()
    }

    /// Full interpolation state of one resource.
    pub fn state(&self, key: &str) -> Option<&InterpolationState> {
        self.states.get(key)
    }

    /// Current velocity estimate of one resource.
    pub fn velocity(&self, key: &str) -> Option<f64> {
        self.states.get(key).map(|s| s.velocity)
    }

    /// Last reported value of one resource.
    pub fn baseline(&self, key: &str) -> Option<f64> {
        self.states.get(key).map(|s| s.baseline)
    }

    /// Tracked keys, ordered.
    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.states.keys()
    }

    /// Whether a resource is tracked.
    pub fn is_tracked(&self, key: &str) -> bool {
        self.states.contains_key(key)
    }

    /// Number of tracked resources.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Whether every tracked resource reached a terminal state.
    ///
    /// False when nothing is tracked.
    pub fn all_terminal(&self) -> bool {
        !self.states.is_empty() && self.states.values().all(|s| s.snapshot.is_terminal())
    }

    /// Number of resources in a given state.
    pub fn count_in(&self, state: EmbeddingState) -> usize {
        self.states
            .values()
            .filter(|s| s.snapshot.state == state)
            .count()
    }
}

impl Tickable for ProgressEstimator {
    fn tick_all(&mut self, now: Time) -> usize {
        if !self.config.interpolation_enabled {
            return 0;
        }
        self.states
            .values_mut()
            .map(|state| state.advance(now))
            .filter(|moved| *moved)
            .count()
    }

    fn is_animating(&self) -> bool {
        self.config.interpolation_enabled && self.states.values().any(|s| s.is_advancing())
    }
}

/// Percentage derived from the counts, so ticks continue from the same scale.
///
/// Falls back to the reported value when the total is unknown.
fn snapshot_percentage(snapshot: &StatusSnapshot) -> f64 {
    if snapshot.total > 0 {
        snapshot.encoded / snapshot.total as f64 * 100.0
    } else {
        snapshot.percentage
    }
}

fn seconds_between(earlier: Time, later: Time) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

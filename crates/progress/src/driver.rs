//! Polling and animation loop around a [`ProgressEstimator`].
//!
//! The driver owns the estimator inside a single task. It polls a
//! [`StatusSource`] on one cadence and ticks the estimator on another, and
//! publishes a [`ProgressFrame`] whenever the displayed values change. It
//! stops once every tracked resource is terminal, the tracked set is empty,
//! or the handle cancels it.

use crate::estimator::{ProgressEstimator, Tickable};
use async_trait::async_trait;
use chrono::Utc;
use nalamap_core::{ProgressReading, ResourceKey, StatusReport, Time};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Frames buffered before the driver waits on the view.
const FRAME_BUFFER: usize = 64;

/// Errors reported by a status source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Backend could not be reached
    #[error("Status source unavailable: {0}")]
    Unavailable(String),

    /// Backend answered with something unusable
    #[error("Malformed status response: {0}")]
    Malformed(String),
}

/// Where real status snapshots come from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch the latest snapshot for each of `keys`.
    ///
    /// Keys missing from the report keep their previous state.
    async fn fetch(&self, keys: &[ResourceKey]) -> Result<StatusReport, SourceError>;
}

/// Display values of every tracked resource at one instant.
#[derive(Debug, Clone)]
pub struct ProgressFrame {
    /// When the frame was produced
    pub at: Time,

    /// Readings ordered by key
    pub readings: Vec<(ResourceKey, ProgressReading)>,
}

impl ProgressFrame {
    /// Reading of one resource.
    pub fn get(&self, key: &str) -> Option<&ProgressReading> {
        self.readings
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, r)| r)
    }
}

#[derive(Debug)]
enum DriverCommand {
    Track(ResourceKey),
    Untrack(ResourceKey),
    Cancel,
}

/// Controls a running [`ProgressDriver`].
#[derive(Debug, Clone)]
pub struct DriverHandle {
    commands: mpsc::UnboundedSender<DriverCommand>,
}

impl DriverHandle {
    /// Start tracking a resource. Returns false if the driver has stopped.
    pub fn track(&self, key: impl Into<ResourceKey>) -> bool {
        self.commands.send(DriverCommand::Track(key.into())).is_ok()
    }

    /// Stop tracking a resource. Returns false if the driver has stopped.
    pub fn untrack(&self, key: impl Into<ResourceKey>) -> bool {
        self.commands.send(DriverCommand::Untrack(key.into())).is_ok()
    }

    /// Stop the driver. Returns false if it has already stopped.
    pub fn cancel(&self) -> bool {
        self.commands.send(DriverCommand::Cancel).is_ok()
    }
}

/// Drives polling and animation for a set of tracked resources.
pub struct ProgressDriver<S: StatusSource> {
    source: S,
    estimator: ProgressEstimator,
    frames: mpsc::Sender<ProgressFrame>,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
}

impl<S: StatusSource> ProgressDriver<S> {
    /// Create a driver, its control handle, and the frame stream.
    pub fn new(
        source: S,
        estimator: ProgressEstimator,
    ) -> (Self, DriverHandle, mpsc::Receiver<ProgressFrame>) {
        let (frames, frame_rx) = mpsc::channel(FRAME_BUFFER);
        let (command_tx, commands) = mpsc::unbounded_channel();

        let driver = Self {
            source,
            estimator,
            frames,
            commands,
        };
        (driver, DriverHandle { commands: command_tx }, frame_rx)
    }

    /// Get the estimator.
    pub fn estimator(&self) -> &ProgressEstimator {
        &self.estimator
    }

    /// Run until every resource is terminal, nothing is tracked, or cancelled.
    ///
    /// Returns the estimator in its final state. A last frame is always
    /// published before returning.
    pub async fn run(mut self) -> ProgressEstimator {
        let config = self.estimator.config().clone();

        let mut poll = tokio::time::interval(config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick = tokio::time::interval(config.tick_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut handle_alive = true;

        info!(
            "Progress driver started for {} resources (poll {}ms, tick {}ms)",
            self.estimator.len(),
            config.poll_interval_ms,
            config.tick_interval_ms
        );

        loop {
            if self.estimator.is_empty() {
                info!("No resources tracked; stopping progress driver");
                break;
            }

            tokio::select! {
                biased;

                command = self.commands.recv(), if handle_alive => {
                    match command {
                        Some(DriverCommand::Cancel) => {
                            info!("Progress driver cancelled");
                            break;
                        }
                        Some(DriverCommand::Track(key)) => {
                            self.estimator.track(key);
                            // Fetch the new resource right away.
                            poll.reset_immediately();
                        }
                        Some(DriverCommand::Untrack(key)) => {
                            self.estimator.untrack(key.as_str());
                            if self.estimator.all_terminal() {
                                info!("All tracked resources are terminal");
                                break;
                            }
                        }
                        None => {
                            debug!("Driver handle dropped; running until terminal");
                            handle_alive = false;
                        }
                    }
                }

                _ = poll.tick() => {
                    self.poll_once().await;
                    if !self.publish().await {
                        break;
                    }
                    if self.estimator.all_terminal() {
                        info!("All tracked resources are terminal");
                        break;
                    }
                }

                _ = tick.tick(), if self.estimator.is_animating() => {
                    if self.estimator.tick_all(Utc::now()) > 0 && !self.publish().await {
                        break;
                    }
                }
            }
        }

        self.publish().await;
        info!("Progress driver stopped");
        self.estimator
    }

    async fn poll_once(&mut self) {
        let keys: Vec<ResourceKey> = self.estimator.keys().cloned().collect();

        match self.source.fetch(&keys).await {
            Ok(report) => {
                let now = Utc::now();
                for (key, snapshot) in &report {
                    if self.estimator.is_tracked(key.as_str()) {
                        self.estimator.ingest_snapshot(key.as_str(), snapshot, now);
                    } else {
                        debug!("Ignoring status for untracked {}", key);
                    }
                }
            }
            Err(e) => {
                warn!("Status poll failed: {}", e);
            }
        }
    }

    /// Send the current readings. Returns false once the view is gone.
    async fn publish(&self) -> bool {
        let frame = ProgressFrame {
            at: Utc::now(),
            readings: self.estimator.readings(),
        };
        if self.frames.send(frame).await.is_err() {
            debug!("Progress view dropped; stopping");
            return false;
        }
        true
    }
}

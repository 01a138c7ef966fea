//! Watchdog / retry-to-tolerance state machine shared by motion drivers.
//!
//! ```text
//! Idle -> InMotion -> { ReachedTarget | Blocked | Faulted } -> Idle
//! ```
//!
//! While in motion the watchdog polls the backend on a fixed interval. When
//! the backend reports "in position" the actual position is compared with
//! the target; outside tolerance the move is re-issued at half the previous
//! speed, up to `max_retries` times. A blocked or faulted status ends the
//! operation at once.

use crate::completion::CompletionSender;
use crate::error::DeviceError;
use crate::lock::LockGuard;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Status reported by a motion backend on each poll.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisStatus {
    /// Still moving
    Moving {
        /// Current position
        position: f64,
    },
    /// Motion finished
    InPosition {
        /// Reached position
        position: f64,
    },
    /// Mechanically blocked / abnormal
    Blocked,
    /// Drive fault
    Fault(String),
}

/// Low-level motion interface a watchdog drives.
pub trait MotionBackend: Send + Sync {
    /// Command a move to `target` at `velocity`.
    fn command_move(&self, target: f64, velocity: f64) -> Result<(), DeviceError>;

    /// Read the current status.
    fn poll(&self) -> Result<AxisStatus, DeviceError>;

    /// Abort the current move.
    fn halt(&self) -> Result<(), DeviceError>;
}

/// Watchdog phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotionPhase {
    /// No operation running
    #[default]
    Idle,
    /// Polling a move
    InMotion,
    /// Reached target within tolerance
    ReachedTarget,
    /// Backend reported blocked
    Blocked,
    /// Fault, timeout, stop or retries exhausted
    Faulted,
}

/// Motion state shared between a driver and its watchdog.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionState {
    /// Current phase
    pub phase: MotionPhase,
    /// Last polled position
    pub position: Option<f64>,
    /// Terminal phase of the last finished move
    pub last_result: Option<MotionPhase>,
}

/// Watchdog tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Allowed |actual - target|
    pub tolerance: f64,
    /// Re-issued moves after the first one
    pub max_retries: u32,
    /// Wall-clock bound since the watchdog started, in milliseconds
    pub timeout_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            tolerance: 0.01,
            max_retries: 3,
            timeout_ms: 30_000,
        }
    }
}

impl WatchdogConfig {
    /// Poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Overall timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        // zero would turn the poll loop into a busy spin
        self.poll_interval_ms = (interval.as_millis() as u64).max(1);
        self
    }

    /// Set the tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the retry bound.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }
}

/// How a watched move ended.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionOutcome {
    /// Within tolerance
    Reached {
        /// Final position
        position: f64,
        /// Retries used
        retries: u32,
    },
    /// Still outside tolerance after the last retry
    OutOfTolerance {
        /// Final position
        position: f64,
        /// Retries used
        retries: u32,
    },
    /// Backend reported blocked
    Blocked,
    /// Backend fault or communication error
    Faulted(String),
    /// Stop requested
    Stopped,
    /// Timeout elapsed
    TimedOut,
}

impl MotionOutcome {
    /// Whether the move succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Reached { .. })
    }

    fn phase(&self) -> MotionPhase {
        match self {
            Self::Reached { .. } => MotionPhase::ReachedTarget,
            Self::Blocked => MotionPhase::Blocked,
            _ => MotionPhase::Faulted,
        }
    }
}

/// Drives one move to a terminal state.
pub struct Watchdog<B: MotionBackend + ?Sized> {
    device: String,
    backend: Arc<B>,
    config: WatchdogConfig,
    target: f64,
    velocity: f64,
    state: Arc<Mutex<MotionState>>,
    stop: Arc<AtomicBool>,
}

impl<B: MotionBackend + ?Sized> Watchdog<B> {
    /// Create a watchdog for a move that has already been commanded once.
    pub fn new(
        device: impl Into<String>,
        backend: Arc<B>,
        config: WatchdogConfig,
        target: f64,
        velocity: f64,
        state: Arc<Mutex<MotionState>>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            device: device.into(),
            backend,
            config,
            target,
            velocity,
            state,
            stop,
        }
    }

    fn update(&self, f: impl FnOnce(&mut MotionState)) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state);
    }

    fn halt(&self) {
        if let Err(e) = self.backend.halt() {
            warn!("Device {}: halt failed: {}", self.device, e);
        }
    }

    /// Poll until the move reaches a terminal state.
    pub fn drive(&self) -> MotionOutcome {
        let started = Instant::now();
        let mut retries = 0;
        let mut velocity = self.velocity;
        self.update(|s| s.phase = MotionPhase::InMotion);

        loop {
            if self.stop.load(Ordering::Acquire) {
                self.halt();
                return MotionOutcome::Stopped;
            }
            if started.elapsed() > self.config.timeout() {
                warn!("Device {}: move to {} timed out", self.device, self.target);
                self.halt();
                return MotionOutcome::TimedOut;
            }

            match self.backend.poll() {
                Err(e) => return MotionOutcome::Faulted(e.to_string()),
                Ok(AxisStatus::Blocked) => {
                    warn!("Device {}: blocked", self.device);
                    return MotionOutcome::Blocked;
                }
                Ok(AxisStatus::Fault(reason)) => {
                    warn!("Device {}: fault: {}", self.device, reason);
                    return MotionOutcome::Faulted(reason);
                }
                Ok(AxisStatus::Moving { position }) => {
                    self.update(|s| s.position = Some(position));
                }
                Ok(AxisStatus::InPosition { position }) => {
                    self.update(|s| s.position = Some(position));
                    if (position - self.target).abs() <= self.config.tolerance {
                        return MotionOutcome::Reached { position, retries };
                    }
                    if retries >= self.config.max_retries {
                        warn!(
                            "Device {}: {} still outside tolerance of {} after {} retries",
                            self.device, position, self.target, retries
                        );
                        return MotionOutcome::OutOfTolerance { position, retries };
                    }
                    retries += 1;
                    velocity /= 2.0;
                    debug!(
                        "Device {}: at {}, retry {} to {} at speed {}",
                        self.device, position, retries, self.target, velocity
                    );
                    if let Err(e) = self.backend.command_move(self.target, velocity) {
                        return MotionOutcome::Faulted(e.to_string());
                    }
                }
            }

            std::thread::sleep(self.config.poll_interval());
        }
    }

    /// Run [`drive`](Self::drive) on a new thread.
    ///
    /// On the terminal state the thread releases `guard` and then writes the
    /// single result into `completion`, so a waiter can resubmit right away.
    pub fn spawn(
        self,
        guard: LockGuard,
        completion: CompletionSender,
    ) -> std::io::Result<JoinHandle<()>>
    where
        B: 'static,
    {
        std::thread::Builder::new()
            .name(format!("watchdog-{}", self.device))
            .spawn(move || {
                let outcome = self.drive();
                info!("Device {}: move finished: {:?}", self.device, outcome);
                self.update(|s| {
                    s.last_result = Some(outcome.phase());
                    s.phase = MotionPhase::Idle;
                });
                drop(guard);
                completion.send(outcome.is_success());
            })
    }
}

//! Simulated drivers.
//!
//! [`SimActuator`] models steppers, rotary stages and servo grippers on top
//! of a [`SimMotor`] backend and the shared [`Watchdog`]. [`SimTrigger`]
//! models fire-and-forget outputs (relays, camera triggers, PLC tags).

use crate::completion::completion_channel;
use crate::device::{Accepted, Device, DeviceStatus};
use crate::error::DeviceError;
use crate::lock::ExclusiveLock;
use crate::watchdog::{AxisStatus, MotionBackend, MotionPhase, MotionState, Watchdog, WatchdogConfig};
use cellctl_core::{DeviceKind, OperationRecord, OperationTag};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Behaviour of a simulated device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// Polls reporting "moving" before a move settles
    pub moving_polls: u32,
    /// Offset from target at which attempt N settles (last entry repeats)
    pub position_errors: Vec<f64>,
    /// Report "blocked" while a move is pending
    pub blocked: bool,
    /// Reject every command with a communication error
    pub fail_commands: bool,
    /// Home position
    pub home_position: f64,
    /// Gripper open position
    pub open_position: f64,
    /// Speed used when a record has no velocity
    pub default_velocity: f64,
    /// Watchdog tuning
    pub watchdog: WatchdogConfig,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            moving_polls: 1,
            position_errors: Vec::new(),
            blocked: false,
            fail_commands: false,
            home_position: 0.0,
            open_position: 10.0,
            default_velocity: 10.0,
            watchdog: WatchdogConfig::default(),
        }
    }
}

/// A move commanded to a [`SimMotor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveCommand {
    /// Target position
    pub target: f64,
    /// Commanded speed
    pub velocity: f64,
}

#[derive(Debug, Default)]
struct MotorState {
    position: f64,
    pending: Option<f64>,
    remaining_polls: u32,
    commands: Vec<MoveCommand>,
    halts: u32,
}

/// Simulated motion backend.
#[derive(Debug)]
pub struct SimMotor {
    settings: SimSettings,
    state: Mutex<MotorState>,
}

impl SimMotor {
    /// Create a motor resting at the home position.
    pub fn new(settings: SimSettings) -> Self {
        let state = MotorState {
            position: settings.home_position,
            ..Default::default()
        };
        Self {
            settings,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MotorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every move commanded so far.
    pub fn commands(&self) -> Vec<MoveCommand> {
        self.state().commands.clone()
    }

    /// Number of halts received.
    pub fn halts(&self) -> u32 {
        self.state().halts
    }

    /// Current simulated position.
    pub fn position(&self) -> f64 {
        self.state().position
    }

    fn error_for_attempt(&self, attempt: usize) -> f64 {
        self.settings
            .position_errors
            .get(attempt)
            .or_else(|| self.settings.position_errors.last())
            .copied()
            .unwrap_or(0.0)
    }
}

impl MotionBackend for SimMotor {
    fn command_move(&self, target: f64, velocity: f64) -> Result<(), DeviceError> {
        if self.settings.fail_commands {
            return Err(DeviceError::Communication("simulated link down".to_string()));
        }
        let mut state = self.state();
        state.commands.push(MoveCommand { target, velocity });
        state.pending = Some(target);
        state.remaining_polls = self.settings.moving_polls;
        Ok(())
    }

    fn poll(&self) -> Result<AxisStatus, DeviceError> {
        let mut state = self.state();
        let Some(target) = state.pending else {
            return Ok(AxisStatus::InPosition {
                position: state.position,
            });
        };
        if self.settings.blocked {
            return Ok(AxisStatus::Blocked);
        }
        if state.remaining_polls > 0 {
            state.remaining_polls -= 1;
            return Ok(AxisStatus::Moving {
                position: state.position,
            });
        }
        let attempt = state.commands.len().saturating_sub(1);
        state.position = target + self.error_for_attempt(attempt);
        state.pending = None;
        Ok(AxisStatus::InPosition {
            position: state.position,
        })
    }

    fn halt(&self) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.pending = None;
        state.halts += 1;
        Ok(())
    }
}

/// Simulated stepper / rotary stage / servo gripper.
pub struct SimActuator {
    name: String,
    kind: DeviceKind,
    motor: Arc<SimMotor>,
    lock: ExclusiveLock,
    motion: Arc<Mutex<MotionState>>,
    stop: Arc<AtomicBool>,
    initialized: AtomicBool,
    default_velocity: f64,
    home_position: f64,
    open_position: f64,
    watchdog: WatchdogConfig,
}

impl SimActuator {
    /// Create an actuator.
    pub fn new(name: impl Into<String>, kind: impl Into<DeviceKind>, settings: SimSettings) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            default_velocity: settings.default_velocity,
            home_position: settings.home_position,
            open_position: settings.open_position,
            watchdog: settings.watchdog,
            motor: Arc::new(SimMotor::new(settings)),
            lock: ExclusiveLock::new(),
            motion: Arc::new(Mutex::new(MotionState::default())),
            stop: Arc::new(AtomicBool::new(false)),
            initialized: AtomicBool::new(false),
        }
    }

    /// Kinds this driver can run as.
    pub fn supports(kind: &DeviceKind) -> bool {
        matches!(
            kind.as_str(),
            DeviceKind::STEPPER | DeviceKind::ROTARY_STAGE | DeviceKind::SERVO_GRIPPER
        )
    }

    /// The simulated backend.
    pub fn motor(&self) -> &Arc<SimMotor> {
        &self.motor
    }

    fn is_gripper(&self) -> bool {
        self.kind.as_str() == DeviceKind::SERVO_GRIPPER
    }

    fn require_position(&self, record: &OperationRecord) -> Result<f64, DeviceError> {
        record.args.position.ok_or_else(|| DeviceError::MissingArgument {
            device: self.name.clone(),
            operation: record.operation.to_string(),
            argument: "position".to_string(),
        })
    }

    /// Target position for a record.
    fn plan(&self, record: &OperationRecord) -> Result<f64, DeviceError> {
        match (&record.operation, self.is_gripper()) {
            (OperationTag::MoveAbsolute, false) | (OperationTag::Rotate, false) => {
                self.require_position(record)
            }
            (OperationTag::MoveRelative, false) => {
                Ok(self.motor.position() + self.require_position(record)?)
            }
            (OperationTag::Home, false) => Ok(self.home_position),
            (OperationTag::Open, true) => Ok(self.open_position),
            (OperationTag::Close, true) => Ok(0.0),
            (OperationTag::Grip, true) => Ok(record.args.position.unwrap_or(0.0)),
            (other, _) => Err(DeviceError::Unsupported {
                device: self.name.clone(),
                operation: other.to_string(),
            }),
        }
    }

    fn motion(&self) -> MotionState {
        *self.motion.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Device for SimActuator {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    fn initialize(&self, kind: &DeviceKind) -> Result<(), DeviceError> {
        if !Self::supports(kind) || kind != &self.kind {
            return Err(DeviceError::UnsupportedKind {
                device: self.name.clone(),
                kind: kind.to_string(),
            });
        }
        self.initialized.store(true, Ordering::Release);
        debug!("Device {} initialized as {}", self.name, kind);
        Ok(())
    }

    fn operate(&self, record: &OperationRecord) -> Result<Accepted, DeviceError> {
        if matches!(record.operation, OperationTag::Stop | OperationTag::Halt) {
            self.stop()?;
            return Ok(Accepted::Immediate);
        }
        if !self.initialized.load(Ordering::Acquire) {
            return Err(DeviceError::NotInitialized(self.name.clone()));
        }

        let guard = self
            .lock
            .try_acquire()
            .ok_or_else(|| DeviceError::Busy(self.name.clone()))?;

        // From here on an early return drops `guard` and releases the lock.
        let target = self.plan(record)?;
        let velocity = record.args.velocity.unwrap_or(self.default_velocity);

        self.stop.store(false, Ordering::SeqCst);
        self.motor.command_move(target, velocity)?;
        info!("Device {}: {} to {} at {}", self.name, record.operation, target, velocity);

        let (tx, rx) = completion_channel(&self.name);
        Watchdog::new(
            self.name.clone(),
            Arc::clone(&self.motor),
            self.watchdog,
            target,
            velocity,
            Arc::clone(&self.motion),
            Arc::clone(&self.stop),
        )
        .spawn(guard, tx)
        .map_err(|e| DeviceError::Communication(format!("watchdog spawn failed: {e}")))?;

        Ok(Accepted::Pending(rx))
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.stop.store(true, Ordering::SeqCst);
        debug!("Device {}: stop requested", self.name);
        Ok(())
    }

    fn current_position(&self) -> Option<f64> {
        self.motion().position.or(Some(self.motor.position()))
    }

    fn current_state(&self) -> DeviceStatus {
        DeviceStatus {
            initialized: self.initialized.load(Ordering::Acquire),
            busy: self.lock.is_held(),
            phase: self.motion().phase,
            position: self.current_position(),
            last_result: self.motion().last_result,
        }
    }
}

/// Simulated relay / camera trigger / PLC tag.
pub struct SimTrigger {
    name: String,
    kind: DeviceKind,
    lock: ExclusiveLock,
    initialized: AtomicBool,
    fail_commands: bool,
    fired: Mutex<Vec<String>>,
}

impl SimTrigger {
    /// Create a trigger device.
    pub fn new(name: impl Into<String>, kind: impl Into<DeviceKind>, settings: SimSettings) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            lock: ExclusiveLock::new(),
            initialized: AtomicBool::new(false),
            fail_commands: settings.fail_commands,
            fired: Mutex::new(Vec::new()),
        }
    }

    /// Kinds this driver can run as.
    pub fn supports(kind: &DeviceKind) -> bool {
        matches!(
            kind.as_str(),
            DeviceKind::VISION | DeviceKind::RELAY | DeviceKind::PLC
        )
    }

    /// Operations fired so far, e.g. `TRIGGER 2` or `CAPTURE barcode`.
    pub fn fired(&self) -> Vec<String> {
        self.fired.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Device for SimTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    fn initialize(&self, kind: &DeviceKind) -> Result<(), DeviceError> {
        if !Self::supports(kind) || kind != &self.kind {
            return Err(DeviceError::UnsupportedKind {
                device: self.name.clone(),
                kind: kind.to_string(),
            });
        }
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn operate(&self, record: &OperationRecord) -> Result<Accepted, DeviceError> {
        if matches!(record.operation, OperationTag::Stop | OperationTag::Halt) {
            self.stop()?;
            return Ok(Accepted::Immediate);
        }
        if !self.initialized.load(Ordering::Acquire) {
            return Err(DeviceError::NotInitialized(self.name.clone()));
        }
        let _guard = self
            .lock
            .try_acquire()
            .ok_or_else(|| DeviceError::Busy(self.name.clone()))?;

        let detail = match &record.operation {
            OperationTag::Trigger | OperationTag::SetOutput => record
                .args
                .selector
                .map(|s| s.to_string())
                .unwrap_or_default(),
            OperationTag::Capture => record.args.profile.clone().unwrap_or_default(),
            OperationTag::Custom(_) => record.args.text.clone().unwrap_or_default(),
            other => {
                return Err(DeviceError::Unsupported {
                    device: self.name.clone(),
                    operation: other.to_string(),
                })
            }
        };
        if self.fail_commands {
            warn!("Device {}: {} failed", self.name, record.operation);
            return Err(DeviceError::Communication("simulated link down".to_string()));
        }

        let entry = format!("{} {}", record.operation, detail).trim_end().to_string();
        info!("Device {}: {}", self.name, entry);
        self.fired
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
        Ok(Accepted::Immediate)
    }

    fn stop(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn current_position(&self) -> Option<f64> {
        None
    }

    fn current_state(&self) -> DeviceStatus {
        DeviceStatus {
            initialized: self.initialized.load(Ordering::Acquire),
            busy: self.lock.is_held(),
            phase: MotionPhase::Idle,
            position: None,
            last_result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellctl_core::ArgBundle;
    use std::time::Duration;

    fn settings() -> SimSettings {
        SimSettings {
            watchdog: WatchdogConfig::default().with_poll_interval(Duration::from_millis(1)),
            ..Default::default()
        }
    }

    fn ready(actuator: SimActuator) -> SimActuator {
        let kind = actuator.kind().clone();
        actuator.initialize(&kind).unwrap();
        actuator
    }

    fn move_to(position: f64) -> OperationRecord {
        OperationRecord::detached(
            OperationTag::MoveAbsolute,
            ArgBundle {
                position: Some(position),
                velocity: Some(8.0),
                ..Default::default()
            },
        )
    }

    fn wait(accepted: Accepted) -> bool {
        match accepted {
            Accepted::Pending(rx) => rx.wait().success,
            Accepted::Immediate => true,
        }
    }

    #[test]
    fn test_move_completes() {
        let z1 = ready(SimActuator::new("Z1", DeviceKind::STEPPER, settings()));
        let accepted = z1.operate(&move_to(10.0)).unwrap();
        assert!(accepted.is_async());
        assert!(wait(accepted));
        assert_eq!(z1.current_position(), Some(10.0));
        assert!(!z1.current_state().busy);
        assert_eq!(z1.current_state().last_result, Some(MotionPhase::ReachedTarget));
    }

    #[test]
    fn test_second_operate_rejected_while_busy() {
        let slow = SimSettings {
            moving_polls: 50,
            ..settings()
        };
        let z1 = ready(SimActuator::new("Z1", DeviceKind::STEPPER, slow));

        let first = z1.operate(&move_to(10.0)).unwrap();
        let started = std::time::Instant::now();
        let second = z1.operate(&move_to(20.0));
        assert!(started.elapsed() < Duration::from_millis(20));
        assert_eq!(second.unwrap_err(), DeviceError::Busy("Z1".to_string()));

        assert!(wait(first));
        assert_eq!(z1.motor().commands().len(), 1);
    }

    #[test]
    fn test_next_operation_accepted_after_completion() {
        let z1 = ready(SimActuator::new("Z1", DeviceKind::STEPPER, settings()));
        for target in [1.0, 2.0, 3.0] {
            let accepted = z1.operate(&move_to(target)).unwrap();
            assert!(wait(accepted));
        }
        assert_eq!(z1.motor().commands().len(), 3);
    }

    #[test]
    fn test_retries_exhausted_reports_failure() {
        let drifting = SimSettings {
            position_errors: vec![0.5],
            ..settings()
        };
        let z1 = ready(SimActuator::new("Z1", DeviceKind::STEPPER, drifting));
        let accepted = z1.operate(&move_to(10.0)).unwrap();
        assert!(!wait(accepted));

        let speeds: Vec<f64> = z1.motor().commands().iter().map(|c| c.velocity).collect();
        assert_eq!(speeds, vec![8.0, 4.0, 2.0, 1.0]);
        assert!(!z1.current_state().busy);
    }

    #[test]
    fn test_blocked_fails() {
        let blocked = SimSettings {
            blocked: true,
            ..settings()
        };
        let z1 = ready(SimActuator::new("Z1", DeviceKind::STEPPER, blocked));
        assert!(!wait(z1.operate(&move_to(10.0)).unwrap()));
    }

    #[test]
    fn test_submission_failure_releases_lock() {
        let down = SimSettings {
            fail_commands: true,
            ..settings()
        };
        let z1 = ready(SimActuator::new("Z1", DeviceKind::STEPPER, down));
        assert!(matches!(
            z1.operate(&move_to(10.0)),
            Err(DeviceError::Communication(_))
        ));
        assert!(!z1.current_state().busy);

        let missing = OperationRecord::detached(OperationTag::MoveAbsolute, ArgBundle::default());
        assert!(matches!(
            z1.operate(&missing),
            Err(DeviceError::MissingArgument { .. })
        ));
        assert!(!z1.current_state().busy);
    }

    #[test]
    fn test_requires_initialize() {
        let z1 = SimActuator::new("Z1", DeviceKind::STEPPER, settings());
        assert_eq!(
            z1.operate(&move_to(1.0)).unwrap_err(),
            DeviceError::NotInitialized("Z1".to_string())
        );
        assert!(z1.initialize(&DeviceKind::new(DeviceKind::VISION)).is_err());
    }

    #[test]
    fn test_stop_idempotent() {
        let z1 = ready(SimActuator::new("Z1", DeviceKind::STEPPER, settings()));
        assert!(z1.stop().is_ok());
        assert!(z1.stop().is_ok());
        assert_eq!(z1.current_state().phase, MotionPhase::Idle);
        assert!(!z1.current_state().busy);

        // a stale stop request does not leak into the next move
        assert!(wait(z1.operate(&move_to(5.0)).unwrap()));
    }

    #[test]
    fn test_stop_during_motion() {
        let slow = SimSettings {
            moving_polls: 10_000,
            ..settings()
        };
        let z1 = ready(SimActuator::new("Z1", DeviceKind::STEPPER, slow));
        let accepted = z1.operate(&move_to(10.0)).unwrap();
        z1.stop().unwrap();
        z1.stop().unwrap();
        assert!(!wait(accepted));
        assert_eq!(z1.motor().halts(), 1);
        assert!(!z1.current_state().busy);
        assert_eq!(z1.current_state().phase, MotionPhase::Idle);
        assert_eq!(z1.current_state().last_result, Some(MotionPhase::Faulted));
    }

    #[test]
    fn test_gripper_operations() {
        let g1 = ready(SimActuator::new("G1", DeviceKind::SERVO_GRIPPER, settings()));
        let open = OperationRecord::detached(OperationTag::Open, ArgBundle::default());
        assert!(wait(g1.operate(&open).unwrap()));
        assert_eq!(g1.current_position(), Some(10.0));

        let close = OperationRecord::detached(OperationTag::Close, ArgBundle::default());
        assert!(wait(g1.operate(&close).unwrap()));
        assert_eq!(g1.current_position(), Some(0.0));

        assert!(matches!(
            g1.operate(&move_to(3.0)),
            Err(DeviceError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_trigger_fires_immediately() {
        let k1 = SimTrigger::new("K1", DeviceKind::RELAY, SimSettings::default());
        k1.initialize(&DeviceKind::new(DeviceKind::RELAY)).unwrap();
        let record = OperationRecord::detached(
            OperationTag::Trigger,
            ArgBundle {
                selector: Some(2),
                ..Default::default()
            },
        );
        let accepted = k1.operate(&record).unwrap();
        assert!(!accepted.is_async());
        assert_eq!(k1.fired(), vec!["TRIGGER 2".to_string()]);
        assert!(!k1.current_state().busy);
    }
}

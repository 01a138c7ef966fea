//! ProcManager - the top-level, never-blocking task scheduler.

use crate::config::{CompositePolicy, EngineConfig};
use crate::error::ScheduleError;
use crate::task::{ExecutionContext, WorkingTask};
use cellctl_core::{Outcome, TaskEvent, TaskId};
use cellctl_device::CellContext;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

struct RootEntry {
    task: Arc<WorkingTask>,
    composite: bool,
}

type Registry = Arc<Mutex<Vec<RootEntry>>>;

/// Runs root tasks on their own threads and reports one event per task.
///
/// The registry mutex is held only while inserting, removing or
/// snapshotting entries, never across a task run.
pub struct ProcManager {
    ctx: Arc<ExecutionContext>,
    tasks: Registry,
}

impl ProcManager {
    /// Create a scheduler for a cell.
    pub fn new(cell: Arc<CellContext>, config: EngineConfig) -> Self {
        Self {
            ctx: Arc::new(ExecutionContext::new(cell, config)),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared execution context.
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.ctx
    }

    fn lock(tasks: &Registry) -> MutexGuard<'_, Vec<RootEntry>> {
        tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(tasks: &Registry, id: TaskId) {
        Self::lock(tasks).retain(|entry| entry.task.id() != id);
    }

    /// Submit a root task and return immediately.
    ///
    /// Exactly one [`TaskEvent`] is sent on `events` when the task ends.
    /// With [`CompositePolicy::Reject`] a second concurrent composite root
    /// is refused; otherwise it is only logged.
    pub fn load_task(
        &self,
        root: WorkingTask,
        events: UnboundedSender<TaskEvent>,
    ) -> Result<TaskId, ScheduleError> {
        let root = Arc::new(root);
        let id = root.id();
        let composite = root.is_composite();

        {
            let mut tasks = Self::lock(&self.tasks);
            if composite {
                if let Some(active) = tasks.iter().find(|e| e.composite) {
                    let active = active.task.id();
                    match self.ctx.config().composite_policy {
                        CompositePolicy::WarnOnly => {
                            error!("Composite task {} submitted while {} is active", id, active)
                        }
                        CompositePolicy::Reject => {
                            warn!("Rejected composite task {}: {} is active", id, active);
                            return Err(ScheduleError::CompositeActive(active));
                        }
                    }
                }
            }
            tasks.push(RootEntry {
                task: Arc::clone(&root),
                composite,
            });
        }

        let tasks = Arc::clone(&self.tasks);
        let ctx = Arc::clone(&self.ctx);
        let spawned = std::thread::Builder::new()
            .name(format!("{}-root-{}", self.ctx.config().thread_name_prefix, id))
            .spawn(move || {
                info!("Task {} started", id);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| root.run(&ctx)))
                    .unwrap_or_else(|_| {
                        error!("Task {} panicked", id);
                        Outcome::aborted()
                    });
                Self::remove(&tasks, id);
                let event = TaskEvent::from_outcome(id, outcome);
                info!("{}", event);
                if events.send(event).is_err() {
                    debug!("Task {}: nobody is listening for the result", id);
                }
            });

        if let Err(e) = spawned {
            Self::remove(&self.tasks, id);
            return Err(ScheduleError::Spawn(e));
        }
        Ok(id)
    }

    /// Broadcast an emergency stop to every registered root task.
    ///
    /// Does not wait for the tasks to finish. Returns how many were signalled.
    pub fn emergency_stop(&self) -> usize {
        let roots: Vec<Arc<WorkingTask>> = Self::lock(&self.tasks)
            .iter()
            .map(|e| Arc::clone(&e.task))
            .collect();
        warn!("Emergency stop: {} active tasks", roots.len());
        for root in &roots {
            root.emergency_stop(&self.ctx);
        }
        roots.len()
    }

    /// Number of registered root tasks.
    pub fn active_count(&self) -> usize {
        Self::lock(&self.tasks).len()
    }

    /// Whether a composite root is registered.
    pub fn is_composite_active(&self) -> bool {
        Self::lock(&self.tasks).iter().any(|e| e.composite)
    }

    /// Ids of registered root tasks.
    pub fn running_task_ids(&self) -> Vec<TaskId> {
        Self::lock(&self.tasks).iter().map(|e| e.task.id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{cell, entries, record, record_with, Log, Spy};
    use cellctl_core::{ArgBundle, DeviceKind, OperationRecord, OperationTag, TaskEventKind};
    use cellctl_device::{Device, SimActuator, SimSettings, WatchdogConfig};
    use std::time::{Duration, Instant};
    use tokio::sync::mpsc;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn delay(seconds: f64) -> WorkingTask {
        WorkingTask::single(OperationRecord::detached(
            OperationTag::Delay,
            ArgBundle {
                duration: Some(seconds),
                ..Default::default()
            },
        ))
    }

    #[test]
    fn test_end_to_end_scenario() {
        let log = log();
        let cell = cell(vec![
            Arc::new(Spy::new("Z1", &log)),
            Arc::new(Spy::new("G1", &log)),
            Arc::new(Spy::new("G2", &log)),
        ]);
        let root = WorkingTask::serial(vec![
            WorkingTask::single(record_with(
                &cell,
                "Z1",
                OperationTag::MoveAbsolute,
                ArgBundle {
                    position: Some(10.0),
                    ..Default::default()
                },
            )),
            WorkingTask::parallel(vec![
                WorkingTask::single(record(&cell, "G1", OperationTag::Open)),
                WorkingTask::single(record(&cell, "G2", OperationTag::Open)),
            ])
            .unwrap(),
            WorkingTask::single(record(&cell, "Z1", OperationTag::Home)),
        ])
        .unwrap();

        let manager = ProcManager::new(cell, EngineConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let started = Instant::now();
        let id = manager.load_task(root, tx).unwrap();
        assert!(started.elapsed() < Duration::from_millis(50));

        let event = rx.blocking_recv().unwrap();
        assert_eq!(event.kind, TaskEventKind::Done);
        assert_eq!(event.task_id, id);
        assert_eq!(event.to_string(), format!("TASK_DONE {id}"));
        // exactly one event: the sender is gone once the task thread exits
        assert!(rx.blocking_recv().is_none());

        let calls: Vec<String> = entries(&log)
            .into_iter()
            .filter(|e| !e.ends_with(".done"))
            .collect();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], "Z1.MA");
        let mut middle = vec![calls[1].clone(), calls[2].clone()];
        middle.sort();
        assert_eq!(middle, vec!["G1.OPEN", "G2.OPEN"]);
        assert_eq!(calls[3], "Z1.HO");
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_error_event_names_device() {
        let log = log();
        let cell = cell(vec![Arc::new(Spy::new("G2", &log).failing())]);
        let task = WorkingTask::single(record(&cell, "G2", OperationTag::Open));
        let manager = ProcManager::new(cell, EngineConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = manager.load_task(task, tx).unwrap();
        let event = rx.blocking_recv().unwrap();
        assert!(!event.is_done());
        assert_eq!(event.failing_device.as_deref(), Some("G2"));
        assert_eq!(event.to_string(), format!("TASK_ERROR {id} G2"));
    }

    #[test]
    fn test_panicking_device_still_reports() {
        let log = log();
        let cell = cell(vec![Arc::new(Spy::new("X", &log).panicking())]);
        let task = WorkingTask::single(record(&cell, "X", OperationTag::Open));
        let manager = ProcManager::new(cell, EngineConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = manager.load_task(task, tx).unwrap();
        let event = rx.blocking_recv().unwrap();
        assert_eq!(event.kind, TaskEventKind::Error);
        assert_eq!(event.task_id, id);
        assert!(rx.blocking_recv().is_none());
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_oversized_delay_reports_error() {
        let manager = ProcManager::new(cell(vec![]), EngineConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = manager.load_task(delay(1e20), tx).unwrap();
        let event = rx.blocking_recv().unwrap();
        assert_eq!(event.to_string(), format!("TASK_ERROR {id} SYS"));
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_registry_tracks_running_roots() {
        let manager = ProcManager::new(cell(vec![]), EngineConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = manager.load_task(delay(0.1), tx).unwrap();
        assert_eq!(manager.running_task_ids(), vec![id]);
        assert!(!manager.is_composite_active());

        rx.blocking_recv().unwrap();
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_second_composite_warn_only() {
        let manager = ProcManager::new(cell(vec![]), EngineConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        manager
            .load_task(WorkingTask::serial(vec![delay(0.1)]).unwrap(), tx.clone())
            .unwrap();
        assert!(manager.is_composite_active());
        manager
            .load_task(WorkingTask::serial(vec![delay(0.01)]).unwrap(), tx)
            .unwrap();
        assert_eq!(manager.active_count(), 2);

        assert!(rx.blocking_recv().unwrap().is_done());
        assert!(rx.blocking_recv().unwrap().is_done());
    }

    #[test]
    fn test_second_composite_rejected() {
        let config = EngineConfig::default().with_composite_policy(CompositePolicy::Reject);
        let manager = ProcManager::new(cell(vec![]), config);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = manager
            .load_task(WorkingTask::serial(vec![delay(0.1)]).unwrap(), tx.clone())
            .unwrap();
        let second = manager.load_task(WorkingTask::serial(vec![delay(0.01)]).unwrap(), tx.clone());
        assert!(matches!(second, Err(ScheduleError::CompositeActive(id)) if id == first));

        // single leaves are never subject to the policy
        assert!(manager.load_task(delay(0.01), tx).is_ok());

        assert!(rx.blocking_recv().unwrap().is_done());
        assert!(rx.blocking_recv().unwrap().is_done());
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn test_emergency_stop_broadcast() {
        let settings = SimSettings {
            moving_polls: 100_000,
            watchdog: WatchdogConfig::default().with_poll_interval(Duration::from_millis(1)),
            ..Default::default()
        };
        let z1 = Arc::new(SimActuator::new("Z1", DeviceKind::STEPPER, settings));
        let cell = cell(vec![z1.clone()]);
        let root = WorkingTask::serial(vec![
            WorkingTask::single(record_with(
                &cell,
                "Z1",
                OperationTag::MoveAbsolute,
                ArgBundle {
                    position: Some(5.0),
                    ..Default::default()
                },
            )),
            delay(5.0),
        ])
        .unwrap();
        let manager = ProcManager::new(cell, EngineConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = manager.load_task(root, tx).unwrap();
        while !z1.current_state().in_motion() {
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(manager.emergency_stop(), 1);
        manager.emergency_stop();

        let event = rx.blocking_recv().unwrap();
        assert_eq!(event.task_id, id);
        assert_eq!(event.failing_device.as_deref(), Some("Z1"));
        assert_eq!(manager.emergency_stop(), 0);
        assert_eq!(z1.current_state().phase, cellctl_device::MotionPhase::Idle);
    }
}

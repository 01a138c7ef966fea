//! WorkingTask - the recursive execution tree.
//!
//! ```text
//! Serial[ Z1.MA, Parallel[ G1.OPEN, G2.OPEN ], Z1.HO ]
//! ```
//!
//! A tree runs on the thread that calls [`WorkingTask::run`]; `Parallel`
//! nodes spawn one thread per child and wait for all of them. Every failure
//! is folded into an [`Outcome`] naming the device to blame.

use crate::config::EngineConfig;
use crate::error::TreeError;
use cellctl_core::{Outcome, OperationRecord, OperationTag, TaskId, SYSTEM_DEVICE};
use cellctl_device::{Accepted, CellContext, CompletionReceiver, Device};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// What a running tree can reach: the cell's devices and the engine settings.
pub struct ExecutionContext {
    cell: Arc<CellContext>,
    config: EngineConfig,
}

impl ExecutionContext {
    /// Create a context.
    pub fn new(cell: Arc<CellContext>, config: EngineConfig) -> Self {
        Self { cell, config }
    }

    /// The cell.
    pub fn cell(&self) -> &Arc<CellContext> {
        &self.cell
    }

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Composition semantics of a node.
pub enum TaskBody {
    /// One operation
    Single(OperationRecord),
    /// Children in order, fail fast
    Serial(Vec<Arc<WorkingTask>>),
    /// Children concurrently, wait for all
    Parallel(Vec<Arc<WorkingTask>>),
    /// Several devices committed together on the cell's runner slot
    Simultaneous(Vec<OperationRecord>),
}

impl TaskBody {
    fn name(&self) -> &'static str {
        match self {
            Self::Single(_) => "single",
            Self::Serial(_) => "serial",
            Self::Parallel(_) => "parallel",
            Self::Simultaneous(_) => "simultaneous",
        }
    }
}

/// A node of the execution tree.
pub struct WorkingTask {
    id: TaskId,
    body: TaskBody,
    running: AtomicBool,
    stopped: AtomicBool,
}

impl WorkingTask {
    fn with_body(body: TaskBody) -> Self {
        Self {
            id: TaskId::new(),
            body,
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// A leaf running one operation.
    pub fn single(record: OperationRecord) -> Self {
        Self::with_body(TaskBody::Single(record))
    }

    /// Run children one after another.
    pub fn serial(children: Vec<WorkingTask>) -> Result<Self, TreeError> {
        if children.is_empty() {
            return Err(TreeError::EmptyComposite("serial"));
        }
        Ok(Self::with_body(TaskBody::Serial(
            children.into_iter().map(Arc::new).collect(),
        )))
    }

    /// Run children concurrently.
    pub fn parallel(children: Vec<WorkingTask>) -> Result<Self, TreeError> {
        if children.is_empty() {
            return Err(TreeError::EmptyComposite("parallel"));
        }
        Ok(Self::with_body(TaskBody::Parallel(
            children.into_iter().map(Arc::new).collect(),
        )))
    }

    /// Commit several device operations as one batch.
    pub fn simultaneous(records: Vec<OperationRecord>) -> Result<Self, TreeError> {
        if records.is_empty() {
            return Err(TreeError::EmptyComposite("simultaneous"));
        }
        if let Some(record) = records.iter().find(|r| r.device.is_none()) {
            return Err(TreeError::DetachedInBatch(record.operation.to_string()));
        }
        Ok(Self::with_body(TaskBody::Simultaneous(records)))
    }

    /// Node id.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Node body.
    pub fn body(&self) -> &TaskBody {
        &self.body
    }

    /// Whether this node is anything but a `Single` leaf.
    pub fn is_composite(&self) -> bool {
        !matches!(self.body, TaskBody::Single(_))
    }

    /// Whether the node is currently executing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Execute the tree and aggregate its result.
    pub fn run(&self, ctx: &Arc<ExecutionContext>) -> Outcome {
        self.running.store(true, Ordering::Release);
        debug!("Task {} ({}) started", self.id, self.body.name());
        let outcome = match &self.body {
            TaskBody::Single(record) => self.run_single(record, ctx),
            TaskBody::Serial(children) => self.run_serial(children, ctx),
            TaskBody::Parallel(children) => self.run_parallel(children, ctx),
            TaskBody::Simultaneous(records) => self.run_simultaneous(records, ctx),
        };
        self.running.store(false, Ordering::Release);
        debug!("Task {} finished: {:?}", self.id, outcome);
        outcome
    }

    /// Stop whatever part of the tree is running.
    ///
    /// Takes no lock and never waits, so it may race with branches finishing
    /// on their own; stopping an idle device is harmless.
    pub fn emergency_stop(&self, ctx: &ExecutionContext) {
        self.stopped.store(true, Ordering::SeqCst);
        match &self.body {
            TaskBody::Single(record) => stop_device(record, ctx),
            TaskBody::Serial(children) | TaskBody::Parallel(children) => {
                for child in children.iter().filter(|c| c.is_running()) {
                    child.emergency_stop(ctx);
                }
            }
            TaskBody::Simultaneous(records) => {
                for record in records {
                    stop_device(record, ctx);
                }
            }
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn run_single(&self, record: &OperationRecord, ctx: &ExecutionContext) -> Outcome {
        let Some(id) = record.device else {
            return self.run_detached(record, ctx);
        };
        let Some(device) = ctx.cell.registry().get(id) else {
            error!("Task {}: device {} is not registered", self.id, id);
            return Outcome::failed(id.to_string());
        };
        if self.is_stopped() {
            return Outcome::failed(device.name());
        }

        let accepted = device.operate(record);
        if accepted.is_ok() && self.is_stopped() {
            // A stop that reached the device before `operate` started the
            // new move may have been cleared by it; repeat it.
            reissue_stop(device);
        }

        match accepted {
            Err(e) => {
                warn!("Task {}: {} rejected {}: {}", self.id, device.name(), record.operation, e);
                Outcome::failed(device.name())
            }
            Ok(Accepted::Immediate) => Outcome::ok(),
            Ok(Accepted::Pending(rx)) if record.operation.is_blocking() => {
                let completion = rx.wait();
                Outcome::from_bool(completion.success, device.name())
            }
            Ok(Accepted::Pending(_)) => Outcome::ok(),
        }
    }

    fn run_detached(&self, record: &OperationRecord, ctx: &ExecutionContext) -> Outcome {
        match &record.operation {
            OperationTag::Delay => {
                let seconds = record.args.duration.unwrap_or(0.0).max(0.0);
                let Ok(total) = Duration::try_from_secs_f64(seconds) else {
                    warn!("Task {}: delay of {}s is out of range", self.id, seconds);
                    return Outcome::failed(SYSTEM_DEVICE);
                };
                let started = Instant::now();
                while started.elapsed() < total {
                    if self.is_stopped() {
                        info!("Task {}: delay interrupted", self.id);
                        return Outcome::failed(SYSTEM_DEVICE);
                    }
                    let left = total.saturating_sub(started.elapsed());
                    std::thread::sleep(left.min(ctx.config.delay_slice()));
                }
                Outcome::ok()
            }
            OperationTag::Halt => {
                let stopped = ctx.cell.halt_all();
                info!("Task {}: halted {} devices", self.id, stopped);
                Outcome::ok()
            }
            OperationTag::NoOp => Outcome::ok(),
            OperationTag::PlayMedia => {
                info!(
                    "Task {}: playing '{}'",
                    self.id,
                    record.args.text.as_deref().unwrap_or_default()
                );
                Outcome::ok()
            }
            other => {
                error!("Task {}: {} has no device", self.id, other);
                Outcome::aborted()
            }
        }
    }

    fn run_serial(&self, children: &[Arc<WorkingTask>], ctx: &Arc<ExecutionContext>) -> Outcome {
        for child in children {
            if self.is_stopped() {
                info!("Task {}: stopped before child {}", self.id, child.id);
                return Outcome::aborted();
            }
            let outcome = child.run(ctx);
            if !outcome.success {
                return outcome;
            }
        }
        Outcome::ok()
    }

    fn run_parallel(&self, children: &[Arc<WorkingTask>], ctx: &Arc<ExecutionContext>) -> Outcome {
        if self.is_stopped() {
            info!("Task {}: stopped before starting children", self.id);
            return Outcome::aborted();
        }
        let (tx, mut rx) = mpsc::unbounded_channel::<(TaskId, Outcome)>();
        let mut handles = Vec::with_capacity(children.len());

        for child in children {
            // Mark before spawning so an emergency stop issued right after
            // this loop already reaches the child.
            child.running.store(true, Ordering::Release);
            let task = Arc::clone(child);
            let child_ctx = Arc::clone(ctx);
            let child_tx = tx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("{}-{}", ctx.config.thread_name_prefix, child.id))
                .spawn(move || {
                    let outcome = if task.is_stopped() {
                        Outcome::aborted()
                    } else {
                        task.run(&child_ctx)
                    };
                    task.running.store(false, Ordering::Release);
                    let _ = child_tx.send((task.id, outcome));
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    error!("Task {}: failed to spawn child {}: {}", self.id, child.id, e);
                    child.running.store(false, Ordering::Release);
                    let _ = tx.send((child.id, Outcome::aborted()));
                }
            }
        }
        drop(tx);

        let mut result = Outcome::ok();
        let mut reported = 0;
        while let Some((id, outcome)) = rx.blocking_recv() {
            reported += 1;
            debug!("Task {}: child {} reported {:?}", self.id, id, outcome);
            if !outcome.success && result.success {
                result = outcome;
            }
        }
        for handle in handles {
            let _ = handle.join();
        }
        if reported < children.len() && result.success {
            error!("Task {}: a child exited without reporting", self.id);
            result = Outcome::aborted();
        }
        result
    }

    fn run_simultaneous(&self, records: &[OperationRecord], ctx: &ExecutionContext) -> Outcome {
        if !ctx.config.simultaneous_enabled {
            warn!("Task {}: simultaneous execution is disabled", self.id);
            return Outcome::aborted();
        }
        let Some(_runner) = ctx.cell.runner().try_acquire() else {
            warn!("Task {}: runner slot is busy", self.id);
            return Outcome::aborted();
        };

        let registry = ctx.cell.registry();
        let mut accepted: Vec<(&Arc<dyn Device>, Option<CompletionReceiver>)> = Vec::new();
        for record in records {
            let device = record.device.and_then(|id| registry.get(id));
            let submitted = match device {
                Some(device) if !self.is_stopped() => device.operate(record).map_err(|e| {
                    warn!("Task {}: {} rejected batch entry: {}", self.id, device.name(), e);
                }),
                _ => Err(()),
            };
            match (device, submitted) {
                (Some(device), Ok(Accepted::Pending(rx))) => accepted.push((device, Some(rx))),
                (Some(device), Ok(Accepted::Immediate)) => accepted.push((device, None)),
                (device, _) => {
                    for (other, _) in &accepted {
                        if let Err(e) = other.stop() {
                            warn!("Device {}: stop failed: {}", other.name(), e);
                        }
                    }
                    // Keep the runner slot until the rolled-back devices are idle.
                    for (_, rx) in accepted {
                        if let Some(rx) = rx {
                            rx.wait();
                        }
                    }
                    return match device {
                        Some(device) => Outcome::failed(device.name()),
                        None => Outcome::aborted(),
                    };
                }
            }
        }

        if self.is_stopped() {
            for (device, _) in &accepted {
                reissue_stop(device);
            }
        }

        let mut result = Outcome::ok();
        for (device, rx) in accepted {
            if let Some(rx) = rx {
                let completion = rx.wait();
                if !completion.success && result.success {
                    result = Outcome::failed(device.name());
                }
            }
        }
        result
    }
}

fn reissue_stop(device: &Arc<dyn Device>) {
    if let Err(e) = device.stop() {
        warn!("Device {}: stop failed: {}", device.name(), e);
    }
}

fn stop_device(record: &OperationRecord, ctx: &ExecutionContext) {
    let Some(device) = record.device.and_then(|id| ctx.cell.registry().get(id)) else {
        return;
    };
    reissue_stop(device);
}

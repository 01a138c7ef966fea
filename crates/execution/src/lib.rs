//! Execution layer - task trees, the non-blocking scheduler and the
//! command-to-record builder.

#![warn(missing_docs)]

pub mod error;
pub mod config;
pub mod builder;
pub mod task;
pub mod manager;

#[cfg(test)]
mod testing;

pub use error::{BuildError, ScheduleError, TreeError};
pub use config::{CompositePolicy, EngineConfig};
pub use builder::RecordBuilder;
pub use task::{ExecutionContext, TaskBody, WorkingTask};
pub use manager::ProcManager;

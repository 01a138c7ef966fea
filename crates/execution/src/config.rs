//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the scheduler does when a second composite root arrives while one
/// is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositePolicy {
    /// Log an error and run it anyway
    #[default]
    WarnOnly,
    /// Refuse the submission
    Reject,
}

/// Configuration for the task engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Single-active-composite policy
    pub composite_policy: CompositePolicy,

    /// Whether `Simultaneous` nodes run (otherwise they always fail)
    pub simultaneous_enabled: bool,

    /// Prefix of every thread the engine spawns
    pub thread_name_prefix: String,

    /// Granularity at which a `DELAY` notices an emergency stop, in milliseconds
    pub delay_slice_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            composite_policy: CompositePolicy::WarnOnly,
            simultaneous_enabled: true,
            thread_name_prefix: "cellctl".to_string(),
            delay_slice_ms: 10,
        }
    }
}

impl EngineConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the composite policy.
    pub fn with_composite_policy(mut self, policy: CompositePolicy) -> Self {
        self.composite_policy = policy;
        self
    }

    /// Enable or disable `Simultaneous` nodes.
    pub fn with_simultaneous(mut self, enabled: bool) -> Self {
        self.simultaneous_enabled = enabled;
        self
    }

    /// Set the thread name prefix.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Delay polling slice.
    pub fn delay_slice(&self) -> Duration {
        Duration::from_millis(self.delay_slice_ms.max(1))
    }
}

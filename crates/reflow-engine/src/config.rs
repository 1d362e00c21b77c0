//! Per-thread engine configuration.

use crate::graph::with_graph;
use crate::trigger::TriggerPolicy;

/// Configuration for the current thread's engine.
///
/// Apply with [`configure`] before the first cell is created; applying later
/// only affects cells created afterwards.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Arena pre-allocation.
    pub initial_capacity: usize,

    /// Hard cap on live + closed node slots; constructors past the cap fail
    /// with `CapacityExceeded`.
    pub max_nodes: Option<usize>,

    /// Trigger policy newly created cells start with.
    pub default_trigger: TriggerPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            max_nodes: None,
            default_trigger: TriggerPolicy::Always,
        }
    }
}

impl EngineConfig {
    #[inline]
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    #[inline]
    pub fn with_max_nodes(mut self, max: usize) -> Self {
        self.max_nodes = Some(max);
        self
    }

    #[inline]
    pub fn with_default_trigger(mut self, trigger: TriggerPolicy) -> Self {
        self.default_trigger = trigger;
        self
    }
}

/// Apply `config` to the current thread's engine.
pub fn configure(config: EngineConfig) {
    with_graph(|g| g.set_config(config));
}

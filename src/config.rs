//! Engine configuration

use std::time::Duration;

/// Default number of rows per batch produced by relational nodes
pub const DEFAULT_PROCESSOR_BATCH_SIZE: usize = 256;

/// Default time budget for a single `process()` call
pub const DEFAULT_TIMESLICE_MS: u64 = 2000;

/// Default number of source batches buffered between a connector and its node
pub const DEFAULT_SOURCE_CHANNEL_CAPACITY: usize = 4;

/// Default upper bound on rule executions during one optimization
pub const DEFAULT_MAX_RULE_EXECUTIONS: usize = 1000;

/// Default upper bound on WHILE iterations in a procedure
pub const DEFAULT_MAX_WHILE_ITERATIONS: usize = 100_000;

/// Name of the per-instance element on multi-source groups
pub const DEFAULT_SOURCE_DISCRIMINATOR: &str = "SOURCE_NAME";

/// Configuration for query planning and processing
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Rows per batch emitted by relational nodes
    pub processor_batch_size: usize,

    /// Default budget for `QueryProcessor::process`
    pub timeslice: Duration,

    /// Capacity of the channel between a connector task and its access node
    pub source_channel_capacity: usize,

    /// Guard against rules that keep pushing follow-up rules
    pub max_rule_executions: usize,

    /// Guard against runaway WHILE loops
    pub max_while_iterations: usize,

    /// Element substituted per source during multi-source fan-out
    pub source_discriminator: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            processor_batch_size: DEFAULT_PROCESSOR_BATCH_SIZE,
            timeslice: Duration::from_millis(DEFAULT_TIMESLICE_MS),
            source_channel_capacity: DEFAULT_SOURCE_CHANNEL_CAPACITY,
            max_rule_executions: DEFAULT_MAX_RULE_EXECUTIONS,
            max_while_iterations: DEFAULT_MAX_WHILE_ITERATIONS,
            source_discriminator: DEFAULT_SOURCE_DISCRIMINATOR.to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the processor batch size (at least one row)
    pub fn with_processor_batch_size(mut self, size: usize) -> Self {
        self.processor_batch_size = size.max(1);
        self
    }

    /// Set the default timeslice
    pub fn with_timeslice(mut self, timeslice: Duration) -> Self {
        self.timeslice = timeslice;
        self
    }

    /// Set the source channel capacity
    pub fn with_source_channel_capacity(mut self, capacity: usize) -> Self {
        self.source_channel_capacity = capacity.max(1);
        self
    }

    /// Set the rule execution cap
    pub fn with_max_rule_executions(mut self, max: usize) -> Self {
        self.max_rule_executions = max;
        self
    }

    /// Set the WHILE iteration cap
    pub fn with_max_while_iterations(mut self, max: usize) -> Self {
        self.max_while_iterations = max;
        self
    }

    /// Set the multi-source discriminator element name
    pub fn with_source_discriminator(mut self, name: impl Into<String>) -> Self {
        self.source_discriminator = name.into();
        self
    }
}

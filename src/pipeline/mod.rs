//! Stage execution for map/reduce batch jobs
//!
//! A job is a set of stage callbacks registered with a [`PipelineRunner`].
//! The runner owns scheduling; the job only sees one invocation at a time.
//!
//! # Stage Sequence
//!
//! ```text
//! [Input] ──> [Map] ══barrier══> group by key ──> [Reduce] ══barrier══> [Summarize]
//!   │           │ per item, parallel                 │ per key, parallel
//!   v           v                                    v
//! fatal     error recorded                      error recorded
//!           against item key                    against group key
//! ```
//!
//! - **Input** runs once. Its failure aborts the run.
//! - **Map** runs once per input item with bounded parallelism. An invocation
//!   that returns an error is recorded against the item key and its
//!   emissions are discarded.
//! - **Reduce** runs once per distinct emitted key, only after every map
//!   invocation has finished, and sees the complete value set for its key.
//! - **Summarize** runs exactly once after every reduce invocation finished.

mod runner;
mod summary;

pub use runner::PipelineRunner;
pub use summary::{RunSummary, StageSummary, UsageMeter};

use crate::error::PipelineResult;
use crate::logging::ProcessLog;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stage of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageType {
    Input,
    Map,
    Reduce,
    Summarize,
}

impl std::fmt::Display for StageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageType::Input => write!(f, "Input"),
            StageType::Map => write!(f, "Map"),
            StageType::Reduce => write!(f, "Reduce"),
            StageType::Summarize => write!(f, "Summarize"),
        }
    }
}

/// Trait implemented by batch jobs run through [`PipelineRunner`]
///
/// Batch in, keyed emissions out: `map` turns one input item into zero or
/// more `(key, value)` emissions and `reduce` consumes every value emitted
/// under one key.
#[async_trait]
pub trait MapReduceJob: Send + Sync {
    /// Item delivered to one map invocation
    type Input: Send + 'static;
    /// Value emitted by map and grouped for reduce
    type Value: Send + 'static;

    /// Name used in logs and summaries
    fn name(&self) -> &str;

    /// Produce the input batch
    async fn get_input_data(&self, ctx: &StageContext) -> PipelineResult<Vec<Self::Input>>;

    /// Key map failures are recorded against
    fn input_key(&self, input: &Self::Input) -> String;

    /// Process a single input item
    async fn map(
        &self,
        input: Self::Input,
        ctx: &mut MapContext<Self::Value>,
    ) -> PipelineResult<()>;

    /// Process every value emitted under one key
    async fn reduce(
        &self,
        key: &str,
        values: Vec<Self::Value>,
        ctx: &mut ReduceContext,
    ) -> PipelineResult<()>;

    /// Observe the finished run
    async fn summarize(&self, summary: &RunSummary, ctx: &StageContext);
}

/// Context for stages that run once per pipeline run
#[derive(Debug, Clone)]
pub struct StageContext {
    pub stage: StageType,
    pub log: ProcessLog,
    pub usage: UsageMeter,
}

impl StageContext {
    pub fn new(stage: StageType, log: ProcessLog, usage: UsageMeter) -> Self {
        Self { stage, log, usage }
    }
}

/// Context for a single map invocation
#[derive(Debug)]
pub struct MapContext<V> {
    key: String,
    log: ProcessLog,
    usage: UsageMeter,
    units_charged: u64,
    emissions: Vec<(String, V)>,
}

impl<V> MapContext<V> {
    pub fn new(key: impl Into<String>, log: ProcessLog, usage: UsageMeter) -> Self {
        Self {
            key: key.into(),
            log,
            usage,
            units_charged: 0,
            emissions: Vec::new(),
        }
    }

    /// Key of the input item being mapped
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn log(&self) -> &ProcessLog {
        &self.log
    }

    /// Charge quota units for a store operation
    pub fn charge(&mut self, units: u64) {
        self.units_charged += units;
        self.usage.charge(units);
    }

    /// Units charged by this invocation so far
    pub fn units_charged(&self) -> u64 {
        self.units_charged
    }

    /// Emit a value under a key for the reduce stage
    pub fn write(&mut self, key: impl Into<String>, value: V) {
        self.emissions.push((key.into(), value));
    }

    pub fn emissions(&self) -> &[(String, V)] {
        &self.emissions
    }

    pub fn into_emissions(self) -> Vec<(String, V)> {
        self.emissions
    }
}

/// Context for a single reduce invocation
#[derive(Debug)]
pub struct ReduceContext {
    key: String,
    log: ProcessLog,
    usage: UsageMeter,
    units_charged: u64,
    output: Vec<(String, Value)>,
}

impl ReduceContext {
    pub fn new(key: impl Into<String>, log: ProcessLog, usage: UsageMeter) -> Self {
        Self {
            key: key.into(),
            log,
            usage,
            units_charged: 0,
            output: Vec::new(),
        }
    }

    /// Key of the group being reduced
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn log(&self) -> &ProcessLog {
        &self.log
    }

    pub fn charge(&mut self, units: u64) {
        self.units_charged += units;
        self.usage.charge(units);
    }

    pub fn units_charged(&self) -> u64 {
        self.units_charged
    }

    /// Save an output entry reported in the run summary
    pub fn write(&mut self, key: impl Into<String>, value: Value) {
        self.output.push((key.into(), value));
    }

    pub fn output(&self) -> &[(String, Value)] {
        &self.output
    }

    pub fn into_output(self) -> Vec<(String, Value)> {
        self.output
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_context_tracks_local_and_global_usage() {
        let usage = UsageMeter::new();
        let mut first: MapContext<u32> = MapContext::new("1", ProcessLog::new(), usage.clone());
        let mut second: MapContext<u32> = MapContext::new("2", ProcessLog::new(), usage.clone());

        first.charge(10);
        first.charge(10);
        second.charge(10);

        assert_eq!(first.units_charged(), 20);
        assert_eq!(second.units_charged(), 10);
        assert_eq!(usage.total(), 30);
    }

    #[test]
    fn test_map_context_collects_emissions_in_order() {
        let mut ctx = MapContext::new("1", ProcessLog::new(), UsageMeter::new());
        ctx.write("A", 1);
        ctx.write("B", 2);
        ctx.write("A", 3);

        assert_eq!(ctx.key(), "1");
        assert_eq!(
            ctx.into_emissions(),
            vec![
                ("A".to_string(), 1),
                ("B".to_string(), 2),
                ("A".to_string(), 3)
            ]
        );
    }

    #[test]
    fn test_reduce_context_output() {
        let mut ctx = ReduceContext::new("A", ProcessLog::new(), UsageMeter::new());
        ctx.charge(20);
        ctx.write("A", json!({"orders": 2}));

        assert_eq!(ctx.units_charged(), 20);
        assert_eq!(ctx.output().len(), 1);
        assert_eq!(ctx.into_output()[0].1["orders"], 2);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(StageType::Map.to_string(), "Map");
        assert_eq!(StageType::Summarize.to_string(), "Summarize");
    }
}

//! Run statistics handed to the summarize stage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Run-wide quota meter shared by every invocation
#[derive(Debug, Clone, Default)]
pub struct UsageMeter {
    units: Arc<AtomicU64>,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add units and return the new total
    pub fn charge(&self, units: u64) -> u64 {
        self.units.fetch_add(units, Ordering::Relaxed) + units
    }

    pub fn total(&self) -> u64 {
        self.units.load(Ordering::Relaxed)
    }
}

/// Statistics for one stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    /// Invocations started (items for map, keys for reduce)
    pub invocations: usize,
    /// Invocations that returned an error
    pub errors: usize,
    /// Values emitted (map) or output entries written (reduce)
    pub emitted: usize,
    pub elapsed_seconds: f64,
    pub units_consumed: u64,
}

/// Aggregate statistics for a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
    pub resource_units_consumed: u64,
    /// Maximum parallel map invocations
    pub concurrency: usize,
    pub input: StageSummary,
    pub map: StageSummary,
    pub reduce: StageSummary,
    /// Map failures keyed by input key
    pub map_errors: BTreeMap<String, String>,
    /// Reduce failures keyed by group key
    pub reduce_errors: BTreeMap<String, String>,
    pub output_entries: BTreeMap<String, Value>,
}

impl RunSummary {
    /// Whether any invocation failed
    pub fn has_errors(&self) -> bool {
        !self.map_errors.is_empty() || !self.reduce_errors.is_empty()
    }
}

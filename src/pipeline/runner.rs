//! Pipeline runner
//!
//! Drives a [`MapReduceJob`] through its stages with bounded parallelism and
//! hard barriers between map, reduce and summarize.

use super::{
    MapContext, MapReduceJob, ReduceContext, RunSummary, StageContext, StageSummary, StageType,
    UsageMeter,
};
use crate::config::RuntimeConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::ProcessLog;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Runs map/reduce jobs
pub struct PipelineRunner {
    map_concurrency: usize,
    reduce_concurrency: usize,
    log: ProcessLog,
}

struct MapStageOutcome<V> {
    groups: BTreeMap<String, Vec<V>>,
    summary: StageSummary,
    errors: BTreeMap<String, String>,
}

struct ReduceStageOutcome {
    summary: StageSummary,
    errors: BTreeMap<String, String>,
    output: BTreeMap<String, Value>,
}

impl PipelineRunner {
    /// Create a runner using the parallelism limits from the runtime configuration
    pub fn new(runtime: &RuntimeConfig, log: ProcessLog) -> Self {
        Self::with_concurrency(runtime.map_concurrency, runtime.reduce_concurrency, log)
    }

    pub fn with_concurrency(
        map_concurrency: usize,
        reduce_concurrency: usize,
        log: ProcessLog,
    ) -> Self {
        Self {
            map_concurrency: map_concurrency.max(1),
            reduce_concurrency: reduce_concurrency.max(1),
            log,
        }
    }

    /// Process log every stage writes into
    pub fn log(&self) -> &ProcessLog {
        &self.log
    }

    /// Execute every stage of the job
    ///
    /// Returns an error only when the input stage fails; map and reduce
    /// failures are recorded in the returned summary.
    pub async fn run<J>(&self, job: Arc<J>) -> PipelineResult<RunSummary>
    where
        J: MapReduceJob + 'static,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id, job = job.name());
        self.run_stages(run_id, job).instrument(span).await
    }

    async fn run_stages<J>(&self, run_id: Uuid, job: Arc<J>) -> PipelineResult<RunSummary>
    where
        J: MapReduceJob + 'static,
    {
        let started_at = Utc::now();
        let run_start = Instant::now();
        let usage = UsageMeter::new();
        info!("Starting run of {}", job.name());

        let input_start = Instant::now();
        let input_ctx = StageContext::new(StageType::Input, self.log.clone(), usage.clone());
        let items = match job.get_input_data(&input_ctx).await {
            Ok(items) => items,
            Err(e) => {
                error!("Input stage failed, aborting run: {}", e);
                return Err(e);
            }
        };
        let input = StageSummary {
            invocations: 1,
            errors: 0,
            emitted: items.len(),
            elapsed_seconds: input_start.elapsed().as_secs_f64(),
            units_consumed: usage.total(),
        };
        info!("Input stage produced {} items", items.len());

        let map = self.run_map_stage(&job, items, &usage).await?;
        let reduce = self.run_reduce_stage(&job, map.groups, &usage).await?;

        let summary = RunSummary {
            run_id,
            job_name: job.name().to_string(),
            started_at,
            elapsed_seconds: run_start.elapsed().as_secs_f64(),
            resource_units_consumed: usage.total(),
            concurrency: self.map_concurrency,
            input,
            map: map.summary,
            reduce: reduce.summary,
            map_errors: map.errors,
            reduce_errors: reduce.errors,
            output_entries: reduce.output,
        };

        let summarize_ctx = StageContext::new(StageType::Summarize, self.log.clone(), usage);
        job.summarize(&summary, &summarize_ctx).await;

        info!(
            "Run of {} completed in {:.3}s: {} map errors, {} reduce errors",
            job.name(),
            summary.elapsed_seconds,
            summary.map_errors.len(),
            summary.reduce_errors.len()
        );
        Ok(summary)
    }

    async fn run_map_stage<J>(
        &self,
        job: &Arc<J>,
        items: Vec<J::Input>,
        usage: &UsageMeter,
    ) -> PipelineResult<MapStageOutcome<J::Value>>
    where
        J: MapReduceJob + 'static,
    {
        let stage_start = Instant::now();
        let units_before = usage.total();
        let total = items.len();
        info!(
            "Executing map stage with {} items (max parallel: {})",
            total, self.map_concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.map_concurrency));
        let mut futures = FuturesUnordered::new();

        for item in items {
            let key = job.input_key(&item);
            let permit = acquire_slot(&semaphore, StageType::Map, &key).await?;
            let job = Arc::clone(job);
            let mut ctx = MapContext::new(key.clone(), self.log.clone(), usage.clone());

            let handle = tokio::spawn(async move {
                let result = job.map(item, &mut ctx).await;
                drop(permit);
                result.map(|()| ctx.into_emissions())
            });
            futures.push(async move { (key, handle.await) });
        }

        // Barrier: every map invocation finishes before any group is released.
        let mut groups: BTreeMap<String, Vec<J::Value>> = BTreeMap::new();
        let mut errors = BTreeMap::new();
        let mut failed = 0;
        let mut emitted = 0;
        while let Some((key, joined)) = futures.next().await {
            match joined {
                Ok(Ok(emissions)) => {
                    debug!("Map invocation {} emitted {} values", key, emissions.len());
                    emitted += emissions.len();
                    for (group, value) in emissions {
                        groups.entry(group).or_default().push(value);
                    }
                }
                Ok(Err(e)) => {
                    warn!("Map invocation {} failed: {}", key, e);
                    failed += 1;
                    record_error(&mut errors, key, e.to_string());
                }
                Err(e) => {
                    warn!("Map task {} panicked: {}", key, e);
                    failed += 1;
                    record_error(&mut errors, key, format!("map task aborted: {e}"));
                }
            }
        }

        info!(
            "Map stage completed: {} emitted into {} groups, {} failed out of {} total",
            emitted,
            groups.len(),
            failed,
            total
        );

        let summary = StageSummary {
            invocations: total,
            errors: failed,
            emitted,
            elapsed_seconds: stage_start.elapsed().as_secs_f64(),
            units_consumed: usage.total() - units_before,
        };
        Ok(MapStageOutcome {
            groups,
            summary,
            errors,
        })
    }

    async fn run_reduce_stage<J>(
        &self,
        job: &Arc<J>,
        groups: BTreeMap<String, Vec<J::Value>>,
        usage: &UsageMeter,
    ) -> PipelineResult<ReduceStageOutcome>
    where
        J: MapReduceJob + 'static,
    {
        let stage_start = Instant::now();
        let units_before = usage.total();
        let total = groups.len();
        info!(
            "Executing reduce stage with {} groups (max parallel: {})",
            total, self.reduce_concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.reduce_concurrency));
        let mut futures = FuturesUnordered::new();

        for (key, values) in groups {
            let permit = acquire_slot(&semaphore, StageType::Reduce, &key).await?;
            let job = Arc::clone(job);
            let mut ctx = ReduceContext::new(key.clone(), self.log.clone(), usage.clone());
            let group_key = key.clone();

            let handle = tokio::spawn(async move {
                let result = job.reduce(&group_key, values, &mut ctx).await;
                drop(permit);
                result.map(|()| ctx.into_output())
            });
            futures.push(async move { (key, handle.await) });
        }

        let mut errors = BTreeMap::new();
        let mut output = BTreeMap::new();
        let mut written = 0;
        while let Some((key, joined)) = futures.next().await {
            match joined {
                Ok(Ok(entries)) => {
                    written += entries.len();
                    output.extend(entries);
                }
                Ok(Err(e)) => {
                    warn!("Reduce invocation {} failed: {}", key, e);
                    record_error(&mut errors, key, e.to_string());
                }
                Err(e) => {
                    warn!("Reduce task {} panicked: {}", key, e);
                    record_error(&mut errors, key, format!("reduce task aborted: {e}"));
                }
            }
        }

        info!(
            "Reduce stage completed: {} failed out of {} groups",
            errors.len(),
            total
        );

        let summary = StageSummary {
            invocations: total,
            errors: errors.len(),
            emitted: written,
            elapsed_seconds: stage_start.elapsed().as_secs_f64(),
            units_consumed: usage.total() - units_before,
        };
        Ok(ReduceStageOutcome {
            summary,
            errors,
            output,
        })
    }
}

/// Record a failed invocation, keeping earlier failures under the same key
fn record_error(errors: &mut BTreeMap<String, String>, key: String, message: String) {
    errors
        .entry(key)
        .and_modify(|existing| {
            existing.push_str("; ");
            existing.push_str(&message);
        })
        .or_insert(message);
}

async fn acquire_slot(
    semaphore: &Arc<Semaphore>,
    stage: StageType,
    key: &str,
) -> PipelineResult<OwnedSemaphorePermit> {
    Arc::clone(semaphore)
        .acquire_owned()
        .await
        .map_err(|e| PipelineError::StageFailed {
            stage,
            key: key.to_string(),
            message: format!("no worker slot available: {e}"),
        })
}

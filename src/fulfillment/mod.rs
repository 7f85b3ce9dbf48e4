//! Deal fulfillment job
//!
//! Wires the deal-specific stages into a [`MapReduceJob`]:
//!
//! - **Input**: [`DealExtractor`] reads every open deal joined with its owner
//! - **Map**: each row is decoded into a [`DealRecord`], then
//!   [`DealClassifier`] approves, flags or converts it and emits converted
//!   deals under their owner key
//! - **Reduce**: [`DealNotifier`] sends each owner one digest of new orders
//! - **Summarize**: [`report`] writes run statistics and errors to the process log
//!
//! Per-deal state machine within one pass:
//!
//! ```text
//! Open(small)   -> [status := Approved] -> Transformed -> Emitted
//! Open(large)   -> [manual flag := true] -> done
//! Approved      -> Transformed -> Emitted
//! malformed row -> map error under the row key, nothing emitted
//! any failure   -> done, nothing emitted
//! ```

pub mod classify;
pub mod extract;
pub mod notify;
pub mod report;

pub use classify::{ClassifyOutcome, DealClassifier};
pub use extract::{open_deals_query, DealExtractor, ExtractedRow};
pub use notify::{build_digest, DealNotifier, Digest, NotifyOutcome};
pub use report::report;

use crate::abstractions::{NotificationService, QueryService, RecordStore};
use crate::config::PipelineConfig;
use crate::deal::DealRecord;
use crate::error::PipelineResult;
use crate::logging::ProcessLog;
use crate::pipeline::{
    MapContext, MapReduceJob, PipelineRunner, ReduceContext, RunSummary, StageContext,
};
use async_trait::async_trait;
use std::sync::Arc;

/// External services the job depends on
#[derive(Clone)]
pub struct Collaborators {
    pub query: Arc<dyn QueryService>,
    pub store: Arc<dyn RecordStore>,
    pub notifications: Arc<dyn NotificationService>,
}

/// Review and fulfillment of open deals
pub struct DealFulfillmentJob {
    extractor: DealExtractor,
    classifier: DealClassifier,
    notifier: DealNotifier,
}

impl DealFulfillmentJob {
    pub fn new(config: &PipelineConfig, collaborators: Collaborators) -> Self {
        Self {
            extractor: DealExtractor::new(collaborators.query, &config.records),
            classifier: DealClassifier::new(collaborators.store, config),
            notifier: DealNotifier::new(collaborators.notifications, config),
        }
    }
}

#[async_trait]
impl MapReduceJob for DealFulfillmentJob {
    type Input = ExtractedRow;
    type Value = DealRecord;

    fn name(&self) -> &str {
        "deal-fulfillment"
    }

    async fn get_input_data(&self, ctx: &StageContext) -> PipelineResult<Vec<ExtractedRow>> {
        self.extractor.extract(&ctx.log).await
    }

    fn input_key(&self, row: &ExtractedRow) -> String {
        row.key()
    }

    async fn map(
        &self,
        row: ExtractedRow,
        ctx: &mut MapContext<DealRecord>,
    ) -> PipelineResult<()> {
        let deal = row.decode()?;
        self.classifier.classify(deal, ctx).await?;
        Ok(())
    }

    async fn reduce(
        &self,
        owner_key: &str,
        deals: Vec<DealRecord>,
        ctx: &mut ReduceContext,
    ) -> PipelineResult<()> {
        self.notifier.notify(owner_key, deals, ctx).await;
        Ok(())
    }

    async fn summarize(&self, summary: &RunSummary, ctx: &StageContext) {
        report(summary, &ctx.log);
    }
}

/// Run one deal review pass
///
/// Fails only for invalid configuration or a failed query; every other
/// failure is recorded in the returned summary and the process log.
pub async fn run_deal_review(
    config: &PipelineConfig,
    collaborators: Collaborators,
    log: ProcessLog,
) -> PipelineResult<RunSummary> {
    config.validate()?;
    let job = Arc::new(DealFulfillmentJob::new(config, collaborators));
    PipelineRunner::new(&config.runtime, log).run(job).await
}

#[cfg(test)]
mod notify_test;

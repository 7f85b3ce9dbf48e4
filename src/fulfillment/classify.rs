//! Per-deal classification and store mutation (map stage)
//!
//! Executes the actions planned by [`plan_actions`] against the record store.
//! Mutation failures propagate and fail the map invocation; transform
//! failures are logged against the deal and the deal is dropped.

use crate::abstractions::{FieldMap, RecordStore};
use crate::config::{PipelineConfig, RecordConfig};
use crate::deal::{plan_actions, DealAction, DealRecord, DealStatus};
use crate::error::{PipelineError, PipelineResult, ServiceError};
use crate::pipeline::MapContext;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// What happened to a deal in one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyOutcome {
    /// An order was created and the deal emitted under its owner key
    Converted { order_id: String },
    /// The transform failed; nothing was emitted
    ConversionFailed { reason: String },
    /// The deal was flagged for manual approval
    FlaggedForManualApproval,
    /// No action applies to the deal's status
    Skipped,
}

/// Applies the approval policy to single deals
pub struct DealClassifier {
    store: Arc<dyn RecordStore>,
    threshold: Decimal,
    records: RecordConfig,
    mutation_units: u64,
    transform_units: u64,
}

impl DealClassifier {
    pub fn new(store: Arc<dyn RecordStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            threshold: config.policy.approval_threshold,
            records: config.records.clone(),
            mutation_units: config.runtime.mutation_units,
            transform_units: config.runtime.transform_units,
        }
    }

    /// Classify one deal, mutating the store and emitting converted deals
    pub async fn classify(
        &self,
        deal: DealRecord,
        ctx: &mut MapContext<DealRecord>,
    ) -> PipelineResult<ClassifyOutcome> {
        ctx.log().debug(
            "Map Input",
            serde_json::to_string(&deal).unwrap_or_else(|_| format!("{deal:?}")),
        );

        let actions = plan_actions(deal.status, deal.total_amount, self.threshold);
        if actions.is_empty() {
            debug!("Deal {} with status {} needs no action", deal.id, deal.status);
        }

        let mut outcome = ClassifyOutcome::Skipped;
        for action in actions {
            match action {
                DealAction::Approve => {
                    let status = Value::String(DealStatus::Approved.as_str().to_string());
                    self.update(&deal, &self.records.status_field, status, ctx)
                        .await?;
                }
                DealAction::FlagForManualApproval => {
                    let field = &self.records.manual_approval_field;
                    self.update(&deal, field, Value::Bool(true), ctx).await?;
                    outcome = ClassifyOutcome::FlaggedForManualApproval;
                }
                DealAction::CreateOrder => {
                    outcome = match self.create_order(&deal, ctx).await {
                        Ok(order_id) => {
                            ctx.write(deal.owner_key.clone(), deal.with_derived_order(&order_id));
                            ClassifyOutcome::Converted { order_id }
                        }
                        Err(e) => {
                            ctx.log()
                                .error("Order Transformation Error", &deal.id, e.to_string());
                            ClassifyOutcome::ConversionFailed {
                                reason: e.to_string(),
                            }
                        }
                    };
                }
            }
        }

        Ok(outcome)
    }

    async fn update(
        &self,
        deal: &DealRecord,
        field: &str,
        value: Value,
        ctx: &mut MapContext<DealRecord>,
    ) -> PipelineResult<()> {
        ctx.charge(self.mutation_units);

        let mut fields = FieldMap::new();
        fields.insert(field.to_string(), value);
        self.store
            .mutate(&self.records.deal_type, &deal.id, fields)
            .await
            .map_err(|source| PipelineError::Mutation {
                record_type: self.records.deal_type.clone(),
                record_id: deal.id.clone(),
                source,
            })
    }

    /// Transform the deal into an order and return its order number
    ///
    /// Falls back to the persisted id when the pending order has no number.
    async fn create_order(
        &self,
        deal: &DealRecord,
        ctx: &mut MapContext<DealRecord>,
    ) -> PipelineResult<String> {
        ctx.charge(self.transform_units);

        let mut handle = self
            .store
            .transform(&self.records.deal_type, &deal.id, &self.records.order_type)
            .await
            .map_err(|source| self.transformation_error(deal, source))?;

        let order_number = handle
            .get_field(&self.records.order_number_field)
            .and_then(|value| match value {
                Value::String(s) if !s.is_empty() => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        let persisted_id = handle
            .persist()
            .await
            .map_err(|source| self.transformation_error(deal, source))?;

        ctx.log().debug(
            "Order Created",
            format!(
                "Deal {} converted into {} {} (number {})",
                deal.id,
                self.records.order_type,
                persisted_id,
                order_number.as_deref().unwrap_or("unassigned")
            ),
        );
        Ok(order_number.unwrap_or(persisted_id))
    }

    fn transformation_error(&self, deal: &DealRecord, source: ServiceError) -> PipelineError {
        PipelineError::Transformation {
            record_id: deal.id.clone(),
            from_type: self.records.deal_type.clone(),
            to_type: self.records.order_type.clone(),
            source,
        }
    }
}

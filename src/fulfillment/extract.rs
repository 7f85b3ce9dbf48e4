//! Extraction of open deals
//!
//! Runs a single read-only join of deals and their representatives, skipping
//! closed deals. A failed query is fatal to the run. Rows are decoded later,
//! one per map invocation, so a malformed row only fails its own invocation.

use crate::abstractions::{JoinQuery, QueryService, Row};
use crate::config::RecordConfig;
use crate::deal::{DealRecord, DealStatus};
use crate::error::{PipelineError, PipelineResult};
use crate::logging::ProcessLog;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

const DEAL_ALIAS: &str = "o";
const REP_ALIAS: &str = "e";

/// Build the open-deals query for the configured record layout
///
/// Columns are returned under the field names of [`DealRecord`].
pub fn open_deals_query(records: &RecordConfig) -> JoinQuery {
    let deal = |field: &str| format!("{DEAL_ALIAS}.{field}");
    let rep = |field: &str| format!("{REP_ALIAS}.{field}");

    JoinQuery {
        from: (records.deal_type.clone(), DEAL_ALIAS.to_string()),
        join: (records.representative_type.clone(), REP_ALIAS.to_string()),
        on: (deal(&records.owner_field), rep("id")),
        columns: vec![
            (deal(&records.owner_field), "owner_key".to_string()),
            (deal(&records.amount_field), "total_amount".to_string()),
            (deal("id"), "id".to_string()),
            (rep(&records.contact_field), "owner_contact".to_string()),
            (deal(&records.status_field), "status".to_string()),
        ],
        filter_column: deal(&records.status_field),
        excluded: [DealStatus::ClosedWon, DealStatus::ClosedLost]
            .iter()
            .map(|status| status.as_str().to_string())
            .collect(),
    }
}

/// One row returned by the open-deals query
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRow {
    /// Position in the query result
    pub index: usize,
    pub row: Row,
}

impl ExtractedRow {
    pub fn new(index: usize, row: Row) -> Self {
        Self { index, row }
    }

    /// Deal id of the row, or its position when the id is missing
    pub fn key(&self) -> String {
        match self.row.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => format!("row {}", self.index),
        }
    }

    /// Decode the row into a deal record
    pub fn decode(self) -> PipelineResult<DealRecord> {
        let index = self.index;
        serde_json::from_value(Value::Object(self.row))
            .map_err(|source| PipelineError::InvalidRecord { index, source })
    }
}

/// Reads candidate deals from the query service
pub struct DealExtractor {
    query_service: Arc<dyn QueryService>,
    query: JoinQuery,
}

impl DealExtractor {
    pub fn new(query_service: Arc<dyn QueryService>, records: &RecordConfig) -> Self {
        Self {
            query_service,
            query: open_deals_query(records),
        }
    }

    pub fn query(&self) -> &JoinQuery {
        &self.query
    }

    /// Run the query and return every row in result order
    pub async fn extract(&self, log: &ProcessLog) -> PipelineResult<Vec<ExtractedRow>> {
        let rows = self
            .query_service
            .run_query(&self.query)
            .await
            .map_err(|source| PipelineError::QueryExecution {
                query: self.query.to_string(),
                source,
            })?;

        log.debug(
            "Input Data",
            serde_json::to_string(&rows).unwrap_or_else(|e| format!("<unserializable: {e}>")),
        );

        info!("Extracted {} open deals", rows.len());
        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| ExtractedRow::new(index, row))
            .collect())
    }
}

//! # Dealflow
//!
//! Batch review and fulfillment of open sales deals.
//!
//! A run extracts every open deal, applies the approval policy to each one,
//! converts approved deals into fulfillment orders and sends every owning
//! representative a single digest of the orders created for them.
//!
//! ## Modules
//!
//! - `abstractions` - Trait-based abstractions for the query service, record store and notification transport
//! - `config` - Pipeline configuration (policy, record layout, runtime costs, logging)
//! - `deal` - Deal records, the closed status set and the pure approval policy
//! - `error` - Structured error types for pipeline stages
//! - `fulfillment` - The deal fulfillment job: extraction, classification, notification and reporting
//! - `logging` - Tracing initialization and the structured process log
//! - `pipeline` - Generic map/reduce runner with stage barriers and bounded parallelism
pub mod abstractions;
pub mod config;
pub mod deal;
pub mod error;
pub mod fulfillment;
pub mod logging;
pub mod pipeline;

pub use config::PipelineConfig;
pub use deal::{DealRecord, DealStatus};
pub use error::{PipelineError, PipelineResult, ServiceError};
pub use fulfillment::{run_deal_review, Collaborators, DealFulfillmentJob};
pub use logging::{LogEntry, LogLevel, ProcessLog};
pub use pipeline::{MapReduceJob, PipelineRunner, RunSummary};

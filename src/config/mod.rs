//! Pipeline configuration
//!
//! Configuration is read from a TOML file with every section optional;
//! missing values fall back to defaults that reproduce the standard deal
//! review run. `DEALFLOW_*` environment variables override file values.
//!
//! ```toml
//! [policy]
//! approval_threshold = 10000
//!
//! [runtime]
//! map_concurrency = 8
//!
//! [notification]
//! subject = "Sales Orders Created"
//! ```

use crate::error::{PipelineError, PipelineResult};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub policy: PolicyConfig,
    pub records: RecordConfig,
    pub notification: NotificationConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

/// Approval policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Open deals strictly below this total are approved automatically
    pub approval_threshold: Decimal,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            approval_threshold: Decimal::new(10_000, 0),
        }
    }
}

/// Names of the record types and fields the pipeline reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    pub deal_type: String,
    pub representative_type: String,
    pub order_type: String,
    /// Deal column holding the owning representative's id
    pub owner_field: String,
    pub amount_field: String,
    pub status_field: String,
    /// Representative column holding the contact address
    pub contact_field: String,
    /// Deal flag set when manual approval is required
    pub manual_approval_field: String,
    /// Order field holding the order number reported in digests
    pub order_number_field: String,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            deal_type: "opportunity".to_string(),
            representative_type: "employee".to_string(),
            order_type: "salesorder".to_string(),
            owner_field: "salesrep".to_string(),
            amount_field: "totalamount".to_string(),
            status_field: "status".to_string(),
            contact_field: "email".to_string(),
            manual_approval_field: "needsmanualapproval".to_string(),
            order_number_field: "tranid".to_string(),
        }
    }
}

/// Digest notification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Sender identity passed to the transport
    pub sender: String,
    pub subject: String,
    /// First line of every digest body
    pub header: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sender: "system".to_string(),
            subject: "Sales Orders Created".to_string(),
            header: "The following Sales Orders have been created:".to_string(),
        }
    }
}

/// Parallelism and quota costs applied by the runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub map_concurrency: usize,
    pub reduce_concurrency: usize,
    /// Units charged per field update
    pub mutation_units: u64,
    /// Units charged per record transform
    pub transform_units: u64,
    /// Units charged per notification send
    pub notification_units: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            map_concurrency: 5,
            reduce_concurrency: 5,
            mutation_units: 10,
            transform_units: 10,
            notification_units: 20,
        }
    }
}

/// Tracing output settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 0 = info, 1 = debug, 2+ = trace
    pub verbosity: u8,
    /// Explicit `EnvFilter` directive, overrides verbosity and `RUST_LOG`
    pub filter: Option<String>,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl LoggingConfig {
    /// Get the log level string based on verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file, apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.merge_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text without applying overrides
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `DEALFLOW_*` overrides from the process environment
    pub fn merge_env_vars(&mut self) {
        self.merge_env_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Values that fail to parse are ignored.
    pub fn merge_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(threshold) = parse_var::<Decimal, _>(&lookup, "DEALFLOW_APPROVAL_THRESHOLD") {
            self.policy.approval_threshold = threshold;
        }
        if let Some(value) = parse_var(&lookup, "DEALFLOW_MAP_CONCURRENCY") {
            self.runtime.map_concurrency = value;
        }
        if let Some(value) = parse_var(&lookup, "DEALFLOW_REDUCE_CONCURRENCY") {
            self.runtime.reduce_concurrency = value;
        }
        if let Some(sender) = lookup("DEALFLOW_NOTIFICATION_SENDER") {
            self.notification.sender = sender;
        }
        if let Some(filter) = lookup("DEALFLOW_LOG") {
            self.logging.filter = Some(filter);
        }
        if let Some(json) = parse_var(&lookup, "DEALFLOW_LOG_JSON") {
            self.logging.json = json;
        }
    }

    /// Check the configuration for values the runner cannot work with
    pub fn validate(&self) -> PipelineResult<()> {
        if self.policy.approval_threshold <= Decimal::ZERO {
            return Err(invalid(
                "policy.approval_threshold",
                "must be greater than 0",
            ));
        }
        if self.runtime.map_concurrency == 0 {
            return Err(invalid("runtime.map_concurrency", "must be greater than 0"));
        }
        if self.runtime.reduce_concurrency == 0 {
            return Err(invalid(
                "runtime.reduce_concurrency",
                "must be greater than 0",
            ));
        }

        let records = &self.records;
        for (field, value) in [
            ("records.deal_type", &records.deal_type),
            ("records.representative_type", &records.representative_type),
            ("records.order_type", &records.order_type),
            ("records.owner_field", &records.owner_field),
            ("records.amount_field", &records.amount_field),
            ("records.status_field", &records.status_field),
            ("records.contact_field", &records.contact_field),
            ("records.manual_approval_field", &records.manual_approval_field),
            ("records.order_number_field", &records.order_number_field),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }

        if self.notification.subject.trim().is_empty() {
            return Err(invalid("notification.subject", "must not be empty"));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|value| value.trim().parse().ok())
}

fn invalid(field: &str, reason: &str) -> PipelineError {
    PipelineError::InvalidConfiguration {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

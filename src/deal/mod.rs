//! Deal records and their lifecycle status
//!
//! A [`DealRecord`] is the flat row produced by extraction. It is owned by the
//! external record store; the pipeline only ever changes its status, the
//! manual-approval flag and the derived order number.

pub mod policy;

pub use policy::{plan_actions, DealAction};

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Lifecycle status of a deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealStatus {
    /// Open and awaiting review
    Open,
    /// Approved, ready to be converted into an order
    Approved,
    /// Closed as won
    #[serde(rename = "Closed Won")]
    ClosedWon,
    /// Closed as lost
    #[serde(rename = "Closed Lost")]
    ClosedLost,
}

impl DealStatus {
    /// Value stored in the status field of the record
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Approved => "Approved",
            Self::ClosedWon => "Closed Won",
            Self::ClosedLost => "Closed Lost",
        }
    }

    /// Closed deals are never selected for review
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ClosedWon | Self::ClosedLost)
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DealStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(Self::Open),
            "Approved" => Ok(Self::Approved),
            "Closed Won" => Ok(Self::ClosedWon),
            "Closed Lost" => Ok(Self::ClosedLost),
            _ => Err(format!("Invalid deal status: {s}")),
        }
    }
}

/// A deal joined with its owning representative's contact address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealRecord {
    /// Internal id of the deal record
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Id of the owning representative, used as the grouping key
    #[serde(deserialize_with = "string_or_number")]
    pub owner_key: String,
    /// Deal total
    pub total_amount: Decimal,
    pub status: DealStatus,
    /// Where the owner's digest is delivered
    pub owner_contact: String,
    /// Order number of the fulfillment order created from this deal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_order_id: Option<String>,
}

impl DealRecord {
    pub fn new(
        id: impl Into<String>,
        owner_key: impl Into<String>,
        total_amount: Decimal,
        status: DealStatus,
        owner_contact: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_key: owner_key.into(),
            total_amount,
            status,
            owner_contact: owner_contact.into(),
            derived_order_id: None,
        }
    }

    /// Copy of this record carrying the given derived order number
    pub fn with_derived_order(&self, order_id: impl Into<String>) -> Self {
        Self {
            derived_order_id: Some(order_id.into()),
            ..self.clone()
        }
    }
}

/// Query engines return ids as numbers or strings depending on the column type.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    })
}

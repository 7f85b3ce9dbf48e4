//! Per-owner digest notification (reduce stage)

use crate::abstractions::{Notification, NotificationService};
use crate::config::{NotificationConfig, PipelineConfig};
use crate::deal::DealRecord;
use crate::error::PipelineError;
use crate::pipeline::ReduceContext;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Digest of the orders created for one owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    pub owner_key: String,
    /// Order numbers in the order the deals were delivered
    pub order_ids: Vec<String>,
    pub notification: Notification,
}

impl Digest {
    pub fn recipient(&self) -> &str {
        self.notification
            .recipients
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Build the digest for one owner's deals
///
/// The digest goes to the first deal's contact only. Returns `None` for an
/// empty group.
pub fn build_digest(
    owner_key: &str,
    deals: &[DealRecord],
    config: &NotificationConfig,
) -> Option<Digest> {
    let first = deals.first()?;
    let order_ids: Vec<String> = deals
        .iter()
        .filter_map(|deal| deal.derived_order_id.clone())
        .collect();

    let body = format!("{}\n{}", config.header, order_ids.join("\n"));
    Some(Digest {
        owner_key: owner_key.to_string(),
        order_ids,
        notification: Notification {
            sender: config.sender.clone(),
            recipients: vec![first.owner_contact.clone()],
            subject: config.subject.clone(),
            body,
        },
    })
}

/// What happened to one owner's digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered { recipient: String, orders: usize },
    Failed { recipient: String },
    Empty,
}

/// Sends one digest per owner key
pub struct DealNotifier {
    service: Arc<dyn NotificationService>,
    config: NotificationConfig,
    notification_units: u64,
}

impl DealNotifier {
    pub fn new(service: Arc<dyn NotificationService>, config: &PipelineConfig) -> Self {
        Self {
            service,
            config: config.notification.clone(),
            notification_units: config.runtime.notification_units,
        }
    }

    /// Send the owner's digest
    ///
    /// A failed send is logged against the owner key and never retried.
    pub async fn notify(
        &self,
        owner_key: &str,
        deals: Vec<DealRecord>,
        ctx: &mut ReduceContext,
    ) -> NotifyOutcome {
        let Some(digest) = build_digest(owner_key, &deals, &self.config) else {
            debug!("No deals emitted for {}, nothing to send", owner_key);
            return NotifyOutcome::Empty;
        };

        let recipient = digest.recipient().to_string();
        if deals.iter().any(|deal| deal.owner_contact != recipient) {
            warn!(
                "Deals for {} have differing contacts, sending digest to {} only",
                owner_key, recipient
            );
        }

        ctx.charge(self.notification_units);
        match self.service.send(&digest.notification).await {
            Ok(()) => {
                debug!(
                    "Sent digest of {} orders for {} to {}",
                    digest.order_ids.len(),
                    owner_key,
                    recipient
                );
                ctx.write(
                    owner_key,
                    json!({ "recipient": recipient, "orders": digest.order_ids }),
                );
                NotifyOutcome::Delivered {
                    recipient,
                    orders: digest.order_ids.len(),
                }
            }
            Err(source) => {
                let err = PipelineError::Notification {
                    owner_key: owner_key.to_string(),
                    recipient: recipient.clone(),
                    source,
                };
                ctx.log().error(
                    "Notification Error",
                    owner_key,
                    format!("Failed to send digest to {owner_key}: {err}"),
                );
                NotifyOutcome::Failed { recipient }
            }
        }
    }
}

//! Notification transport abstraction

use crate::error::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A message handed to the notification transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Trait for sending notifications
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), ServiceError>;
}

/// Mock implementation of NotificationService for testing
#[derive(Clone, Default)]
pub struct MockNotificationService {
    attempts: Arc<Mutex<Vec<Notification>>>,
    delivered: Arc<Mutex<Vec<Notification>>>,
    failing_recipients: Arc<Mutex<HashMap<String, ServiceError>>>,
}

impl MockNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any notification addressed to the given recipient
    pub async fn fail_for(&self, recipient: &str, error: ServiceError) {
        self.failing_recipients
            .lock()
            .await
            .insert(recipient.to_string(), error);
    }

    /// Every send attempt, including failed ones
    pub async fn attempts(&self) -> Vec<Notification> {
        self.attempts.lock().await.clone()
    }

    /// Notifications that were accepted by the transport
    pub async fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().await.clone()
    }

    /// Delivered notifications addressed to the given recipient
    pub async fn delivered_to(&self, recipient: &str) -> Vec<Notification> {
        self.delivered
            .lock()
            .await
            .iter()
            .filter(|n| n.recipients.iter().any(|r| r == recipient))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationService for MockNotificationService {
    async fn send(&self, notification: &Notification) -> Result<(), ServiceError> {
        self.attempts.lock().await.push(notification.clone());

        let failures = self.failing_recipients.lock().await;
        if let Some(error) = notification
            .recipients
            .iter()
            .find_map(|recipient| failures.get(recipient))
        {
            return Err(error.clone());
        }
        drop(failures);

        self.delivered.lock().await.push(notification.clone());
        Ok(())
    }
}

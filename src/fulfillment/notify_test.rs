//! Unit tests for owner digests

use super::*;
use crate::abstractions::MockNotificationService;
use crate::config::NotificationConfig;
use crate::deal::DealStatus;
use crate::error::ServiceError;
use crate::logging::LogLevel;
use crate::pipeline::UsageMeter;
use rust_decimal::Decimal;

fn converted(id: &str, owner: &str, contact: &str, order: &str) -> DealRecord {
    DealRecord::new(id, owner, Decimal::new(500, 0), DealStatus::Open, contact)
        .with_derived_order(order)
}

fn notifier(service: &MockNotificationService) -> DealNotifier {
    DealNotifier::new(Arc::new(service.clone()), &PipelineConfig::default())
}

#[test]
fn test_digest_lists_orders_under_header() {
    let deals = vec![
        converted("1", "A", "a@x", "SO-1"),
        converted("4", "A", "a@x", "SO-2"),
    ];

    let digest = build_digest("A", &deals, &NotificationConfig::default()).unwrap();

    assert_eq!(digest.owner_key, "A");
    assert_eq!(digest.order_ids, vec!["SO-1", "SO-2"]);
    assert_eq!(digest.recipient(), "a@x");
    assert_eq!(digest.notification.sender, "system");
    assert_eq!(digest.notification.subject, "Sales Orders Created");
    assert_eq!(
        digest.notification.body,
        "The following Sales Orders have been created:\nSO-1\nSO-2"
    );
}

#[test]
fn test_digest_uses_first_contact_only() {
    let deals = vec![
        converted("1", "A", "first@x", "SO-1"),
        converted("2", "A", "second@x", "SO-2"),
    ];

    let digest = build_digest("A", &deals, &NotificationConfig::default()).unwrap();

    assert_eq!(digest.notification.recipients, vec!["first@x"]);
    assert_eq!(digest.order_ids.len(), 2);
}

#[test]
fn test_digest_skips_deals_without_order() {
    let mut deals = vec![converted("1", "A", "a@x", "SO-1")];
    deals.push(DealRecord::new(
        "2",
        "A",
        Decimal::ONE,
        DealStatus::Open,
        "a@x",
    ));

    let digest = build_digest("A", &deals, &NotificationConfig::default()).unwrap();
    assert_eq!(digest.order_ids, vec!["SO-1"]);
}

#[test]
fn test_empty_group_has_no_digest() {
    assert!(build_digest("A", &[], &NotificationConfig::default()).is_none());
}

#[tokio::test]
async fn test_notify_delivers_and_writes_output() {
    let service = MockNotificationService::new();
    let log = ProcessLog::new();
    let usage = UsageMeter::new();
    let mut ctx = ReduceContext::new("A", log.clone(), usage.clone());

    let outcome = notifier(&service)
        .notify(
            "A",
            vec![
                converted("1", "A", "a@x", "SO-1"),
                converted("4", "A", "a@x", "SO-2"),
            ],
            &mut ctx,
        )
        .await;

    assert_eq!(
        outcome,
        NotifyOutcome::Delivered {
            recipient: "a@x".to_string(),
            orders: 2
        }
    );
    assert_eq!(service.delivered_to("a@x").await.len(), 1);
    assert_eq!(ctx.units_charged(), 20);
    assert_eq!(usage.total(), 20);

    let output = ctx.into_output();
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].0, "A");
    assert_eq!(output[0].1["recipient"], "a@x");
    assert_eq!(output[0].1["orders"][1], "SO-2");
    assert!(log.entries_at(LogLevel::Error).is_empty());
}

#[tokio::test]
async fn test_notify_failure_is_logged_without_retry() {
    let service = MockNotificationService::new();
    service
        .fail_for("b@x", ServiceError::new("SMTP_DOWN", "relay unavailable"))
        .await;
    let log = ProcessLog::new();
    let mut ctx = ReduceContext::new("B", log.clone(), UsageMeter::new());

    let outcome = notifier(&service)
        .notify("B", vec![converted("2", "B", "b@x", "SO-3")], &mut ctx)
        .await;

    assert_eq!(
        outcome,
        NotifyOutcome::Failed {
            recipient: "b@x".to_string()
        }
    );
    assert_eq!(service.attempts().await.len(), 1);
    assert!(service.delivered().await.is_empty());
    assert!(ctx.output().is_empty());

    let errors = log.entries_at(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].title, "Notification Error");
    assert_eq!(errors[0].key.as_deref(), Some("B"));
    assert!(errors[0].details.starts_with("Failed to send digest to B"));
    assert!(errors[0].details.contains("SMTP_DOWN"));
}

#[tokio::test]
async fn test_notify_empty_group_sends_nothing() {
    let service = MockNotificationService::new();
    let mut ctx = ReduceContext::new("C", ProcessLog::new(), UsageMeter::new());

    let outcome = notifier(&service).notify("C", Vec::new(), &mut ctx).await;

    assert_eq!(outcome, NotifyOutcome::Empty);
    assert!(service.attempts().await.is_empty());
    assert_eq!(ctx.units_charged(), 0);
}

#[tokio::test]
async fn test_notify_uses_configured_sender_and_header() {
    let service = MockNotificationService::new();
    let mut config = PipelineConfig::default();
    config.notification.sender = "-5".to_string();
    config.notification.header = "New orders:".to_string();
    let notifier = DealNotifier::new(Arc::new(service.clone()), &config);
    let mut ctx = ReduceContext::new("A", ProcessLog::new(), UsageMeter::new());

    notifier
        .notify("A", vec![converted("1", "A", "a@x", "SO-9")], &mut ctx)
        .await;

    let sent = service.delivered().await;
    assert_eq!(sent[0].sender, "-5");
    assert_eq!(sent[0].body, "New orders:\nSO-9");
}

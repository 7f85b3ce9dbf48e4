//! Abstractions for external collaborators
//!
//! This module provides trait-based abstractions for the services the
//! pipeline consumes but does not own (query engine, record store and
//! notification transport), enabling testing without a live backend.

pub mod notification;
pub mod query;
pub mod record_store;

pub use notification::{MockNotificationService, Notification, NotificationService};
pub use query::{JoinQuery, MockQueryService, QueryService, Row};
pub use record_store::{
    FieldMap, MockRecordStore, MockTransformHandle, RecordStore, StoreCall, TransformHandle,
};

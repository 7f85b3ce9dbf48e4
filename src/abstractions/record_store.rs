//! Record store abstraction layer
//!
//! Provides trait-based abstraction for field updates and record transforms
//! so the classifier can be tested without a live record store.

use crate::error::ServiceError;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Field values written to or read from a stored record
pub type FieldMap = Map<String, Value>;

/// Trait for record store operations
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Update fields on an existing record
    async fn mutate(&self, record_type: &str, id: &str, fields: FieldMap)
        -> Result<(), ServiceError>;

    /// Start transforming a record into a new record of another type
    ///
    /// Nothing is stored until the returned handle is persisted.
    async fn transform(
        &self,
        from_type: &str,
        from_id: &str,
        to_type: &str,
    ) -> Result<Box<dyn TransformHandle>, ServiceError>;
}

/// An unsaved record produced by a transform
#[async_trait]
pub trait TransformHandle: Send + Sync {
    /// Read a field of the pending record
    fn get_field(&self, name: &str) -> Option<Value>;

    /// Save the record and return its internal id
    async fn persist(&mut self) -> Result<String, ServiceError>;
}

/// A call received by [`MockRecordStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Mutate {
        record_type: String,
        id: String,
        fields: FieldMap,
    },
    Transform {
        from_type: String,
        from_id: String,
        to_type: String,
    },
    Persist {
        record_type: String,
        id: String,
    },
}

type RecordKey = (String, String);

/// Mock implementation of RecordStore for testing
///
/// Records live in memory keyed by type and id. Unknown records are created
/// on first mutation. Transformed records get sequential order numbers
/// (`SO-1`, `SO-2`, ...) in the `tranid` field.
#[derive(Clone)]
pub struct MockRecordStore {
    records: Arc<Mutex<HashMap<RecordKey, FieldMap>>>,
    calls: Arc<Mutex<Vec<StoreCall>>>,
    mutation_failures: Arc<Mutex<HashMap<String, ServiceError>>>,
    transform_failures: Arc<Mutex<HashMap<String, ServiceError>>>,
    persist_failures: Arc<Mutex<HashMap<String, ServiceError>>>,
    next_order: Arc<AtomicU64>,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            mutation_failures: Arc::new(Mutex::new(HashMap::new())),
            transform_failures: Arc::new(Mutex::new(HashMap::new())),
            persist_failures: Arc::new(Mutex::new(HashMap::new())),
            next_order: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Seed a stored record
    pub async fn insert(&self, record_type: &str, id: &str, fields: FieldMap) {
        self.records
            .lock()
            .await
            .insert((record_type.to_string(), id.to_string()), fields);
    }

    /// Current fields of a stored record
    pub async fn get(&self, record_type: &str, id: &str) -> Option<FieldMap> {
        self.records
            .lock()
            .await
            .get(&(record_type.to_string(), id.to_string()))
            .cloned()
    }

    /// All stored records of one type, sorted by id
    pub async fn records_of_type(&self, record_type: &str) -> Vec<(String, FieldMap)> {
        let mut records: Vec<_> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|((kind, _), _)| kind == record_type)
            .map(|((_, id), fields)| (id.clone(), fields.clone()))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        records
    }

    /// Fail every mutation of the record with the given id
    pub async fn fail_mutation(&self, id: &str, error: ServiceError) {
        self.mutation_failures
            .lock()
            .await
            .insert(id.to_string(), error);
    }

    /// Fail every transform of the record with the given id
    pub async fn fail_transform(&self, id: &str, error: ServiceError) {
        self.transform_failures
            .lock()
            .await
            .insert(id.to_string(), error);
    }

    /// Fail persisting any record transformed from the given id
    pub async fn fail_persist(&self, from_id: &str, error: ServiceError) {
        self.persist_failures
            .lock()
            .await
            .insert(from_id.to_string(), error);
    }

    /// Every call received so far, in order
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().await.clone()
    }

    /// Mutation field sets applied to the record with the given id
    pub async fn mutations_of(&self, id: &str) -> Vec<FieldMap> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                StoreCall::Mutate {
                    id: called, fields, ..
                } if called == id => Some(fields.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of transforms attempted from the record with the given id
    pub async fn transform_attempts(&self, from_id: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| {
                matches!(call, StoreCall::Transform { from_id: called, .. } if called == from_id)
            })
            .count()
    }
}

impl Default for MockRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn mutate(
        &self,
        record_type: &str,
        id: &str,
        fields: FieldMap,
    ) -> Result<(), ServiceError> {
        self.calls.lock().await.push(StoreCall::Mutate {
            record_type: record_type.to_string(),
            id: id.to_string(),
            fields: fields.clone(),
        });

        if let Some(error) = self.mutation_failures.lock().await.get(id) {
            return Err(error.clone());
        }

        let mut records = self.records.lock().await;
        let stored = records
            .entry((record_type.to_string(), id.to_string()))
            .or_default();
        stored.extend(fields);
        Ok(())
    }

    async fn transform(
        &self,
        from_type: &str,
        from_id: &str,
        to_type: &str,
    ) -> Result<Box<dyn TransformHandle>, ServiceError> {
        self.calls.lock().await.push(StoreCall::Transform {
            from_type: from_type.to_string(),
            from_id: from_id.to_string(),
            to_type: to_type.to_string(),
        });

        if let Some(error) = self.transform_failures.lock().await.get(from_id) {
            return Err(error.clone());
        }

        let sequence = self.next_order.fetch_add(1, Ordering::SeqCst);
        let mut fields = FieldMap::new();
        fields.insert("tranid".to_string(), json!(format!("SO-{sequence}")));
        fields.insert("createdfrom".to_string(), json!(from_id));

        Ok(Box::new(MockTransformHandle {
            record_type: to_type.to_string(),
            id: sequence.to_string(),
            fields,
            persist_failure: self.persist_failures.lock().await.get(from_id).cloned(),
            records: self.records.clone(),
            calls: self.calls.clone(),
        }))
    }
}

/// Pending record produced by [`MockRecordStore::transform`]
pub struct MockTransformHandle {
    record_type: String,
    id: String,
    fields: FieldMap,
    persist_failure: Option<ServiceError>,
    records: Arc<Mutex<HashMap<RecordKey, FieldMap>>>,
    calls: Arc<Mutex<Vec<StoreCall>>>,
}

#[async_trait]
impl TransformHandle for MockTransformHandle {
    fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    async fn persist(&mut self) -> Result<String, ServiceError> {
        self.calls.lock().await.push(StoreCall::Persist {
            record_type: self.record_type.clone(),
            id: self.id.clone(),
        });

        if let Some(error) = &self.persist_failure {
            return Err(error.clone());
        }

        self.records.lock().await.insert(
            (self.record_type.clone(), self.id.clone()),
            self.fields.clone(),
        );
        Ok(self.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(value: &str) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("status".to_string(), json!(value));
        fields
    }

    #[tokio::test]
    async fn test_mutate_merges_fields() {
        let store = MockRecordStore::new();
        store.insert("opportunity", "1", status("Open")).await;

        let mut flag = FieldMap::new();
        flag.insert("needsmanualapproval".to_string(), json!(true));
        store.mutate("opportunity", "1", flag).await.unwrap();

        let stored = store.get("opportunity", "1").await.unwrap();
        assert_eq!(stored["status"], "Open");
        assert_eq!(stored["needsmanualapproval"], true);
    }

    #[tokio::test]
    async fn test_transform_persists_order_with_sequential_number() {
        let store = MockRecordStore::new();

        let mut first = store
            .transform("opportunity", "1", "salesorder")
            .await
            .unwrap();
        assert_eq!(first.get_field("tranid"), Some(json!("SO-1")));
        assert!(store.get("salesorder", "1").await.is_none());

        let id = first.persist().await.unwrap();
        assert_eq!(id, "1");
        assert_eq!(
            store.get("salesorder", "1").await.unwrap()["createdfrom"],
            "1"
        );

        let second = store
            .transform("opportunity", "7", "salesorder")
            .await
            .unwrap();
        assert_eq!(second.get_field("tranid"), Some(json!("SO-2")));
        assert_eq!(store.transform_attempts("1").await, 1);
        assert_eq!(store.transform_attempts("7").await, 1);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let store = MockRecordStore::new();
        store
            .fail_mutation("1", ServiceError::new("RCRD_LOCKED", "locked"))
            .await;
        store
            .fail_transform("2", ServiceError::new("INVALID_TRANS", "no items"))
            .await;
        store
            .fail_persist("3", ServiceError::new("USER_ERROR", "missing field"))
            .await;

        assert!(store.mutate("opportunity", "1", status("Approved")).await.is_err());
        assert!(store.transform("opportunity", "2", "salesorder").await.is_err());

        let mut handle = store
            .transform("opportunity", "3", "salesorder")
            .await
            .unwrap();
        assert_eq!(handle.persist().await.unwrap_err().code, "USER_ERROR");
        assert!(store.records_of_type("salesorder").await.is_empty());
        assert_eq!(store.calls().await.len(), 4);
    }
}

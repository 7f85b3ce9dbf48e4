//! Read-only query service abstraction

use crate::error::ServiceError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A flat result row keyed by column alias
pub type Row = Map<String, Value>;

/// A read-only two-table join with an exclusion filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinQuery {
    /// Primary table and its alias
    pub from: (String, String),
    /// Joined table and its alias
    pub join: (String, String),
    /// Qualified columns compared in the join condition
    pub on: (String, String),
    /// Selected qualified columns and the alias each is returned under
    pub columns: Vec<(String, String)>,
    /// Qualified column whose value must not be in `excluded`
    pub filter_column: String,
    pub excluded: Vec<String>,
}

impl fmt::Display for JoinQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = self
            .columns
            .iter()
            .map(|(expr, alias)| format!("{expr} AS {alias}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "SELECT {} FROM {} {} JOIN {} {} ON {} = {}",
            columns, self.from.0, self.from.1, self.join.0, self.join.1, self.on.0, self.on.1
        )?;
        if !self.excluded.is_empty() {
            let excluded = self
                .excluded
                .iter()
                .map(|value| format!("'{}'", value.replace('\'', "''")))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " WHERE {} NOT IN ({})", self.filter_column, excluded)?;
        }
        Ok(())
    }
}

/// Trait for read-only query execution
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Execute the query and return every matching row
    async fn run_query(&self, query: &JoinQuery) -> Result<Vec<Row>, ServiceError>;
}

/// Mock implementation of QueryService for testing
///
/// Returns the configured rows verbatim; filtering is the query engine's job.
#[derive(Clone, Default)]
pub struct MockQueryService {
    rows: Arc<Mutex<Vec<Row>>>,
    failure: Arc<Mutex<Option<ServiceError>>>,
    executed: Arc<Mutex<Vec<JoinQuery>>>,
}

impl MockQueryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that returns the given rows
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
            ..Self::default()
        }
    }

    /// Replace the rows returned by subsequent queries
    pub async fn set_rows(&self, rows: Vec<Row>) {
        *self.rows.lock().await = rows;
    }

    /// Make every subsequent query fail with the given error
    pub async fn fail_with(&self, error: ServiceError) {
        *self.failure.lock().await = Some(error);
    }

    /// Queries executed so far
    pub async fn executed_queries(&self) -> Vec<JoinQuery> {
        self.executed.lock().await.clone()
    }
}

#[async_trait]
impl QueryService for MockQueryService {
    async fn run_query(&self, query: &JoinQuery) -> Result<Vec<Row>, ServiceError> {
        self.executed.lock().await.push(query.clone());

        if let Some(error) = self.failure.lock().await.clone() {
            return Err(error);
        }
        Ok(self.rows.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_query() -> JoinQuery {
        JoinQuery {
            from: ("opportunity".to_string(), "o".to_string()),
            join: ("employee".to_string(), "e".to_string()),
            on: ("o.salesrep".to_string(), "e.id".to_string()),
            columns: vec![
                ("o.id".to_string(), "id".to_string()),
                ("e.email".to_string(), "owner_contact".to_string()),
            ],
            filter_column: "o.status".to_string(),
            excluded: vec!["Closed Won".to_string(), "Closed Lost".to_string()],
        }
    }

    #[test]
    fn test_join_query_renders_exclusion_filter() {
        assert_eq!(
            sample_query().to_string(),
            "SELECT o.id AS id, e.email AS owner_contact FROM opportunity o \
             JOIN employee e ON o.salesrep = e.id \
             WHERE o.status NOT IN ('Closed Won', 'Closed Lost')"
        );
    }

    #[test]
    fn test_join_query_escapes_quotes() {
        let mut query = sample_query();
        query.excluded = vec!["Won't".to_string()];
        assert!(query.to_string().ends_with("NOT IN ('Won''t')"));
    }

    #[tokio::test]
    async fn test_mock_query_service_records_queries() {
        let service = MockQueryService::new();
        let rows = service.run_query(&sample_query()).await.unwrap();

        assert!(rows.is_empty());
        assert_eq!(service.executed_queries().await, vec![sample_query()]);
    }

    #[tokio::test]
    async fn test_mock_query_service_failure() {
        let service = MockQueryService::new();
        service
            .fail_with(ServiceError::new("SSS_INVALID_SQL", "bad join"))
            .await;

        let err = service.run_query(&sample_query()).await.unwrap_err();
        assert_eq!(err.code, "SSS_INVALID_SQL");
    }
}

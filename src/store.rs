use std::future::Future;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::error::CoreResult;
use crate::models::{Dataset, JoinedRow};
use crate::predicate::{Expr, JoinPlan};

/// A read against the student join graph: how to join each table and which
/// rows to keep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    pub joins: JoinPlan,
    pub predicate: Expr,
}

impl QueryRequest {
    /// Every student with every sub-record, nothing filtered.
    pub fn everything() -> Self {
        QueryRequest {
            joins: JoinPlan::outer(),
            predicate: Expr::Always,
        }
    }
}

/// Query-execution contract the core depends on. Implementations return
/// the un-collapsed join rows (one per combination of matching sub-records)
/// and report failures as `CoreError::DataAccess`.
pub trait DataStore {
    fn query(
        &self,
        request: &QueryRequest,
    ) -> impl Future<Output = CoreResult<Vec<JoinedRow>>> + Send;
}

/// Store over an already-loaded dataset.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    dataset: Dataset,
}

impl MemoryStore {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset {}", path.display()))?;
        let dataset: Dataset = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse dataset {}", path.display()))?;
        tracing::debug!(
            students = dataset.students.len(),
            programming = dataset.programming.len(),
            "loaded dataset file"
        );
        Ok(Self::new(dataset))
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }
}

impl DataStore for MemoryStore {
    async fn query(&self, request: &QueryRequest) -> CoreResult<Vec<JoinedRow>> {
        Ok(self
            .dataset
            .join(&request.joins)
            .into_iter()
            .filter(|row| request.predicate.matches(row))
            .collect())
    }
}

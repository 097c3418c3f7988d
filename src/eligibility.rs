use std::cmp::Ordering;

use crate::criteria::Criteria;
use crate::error::CoreResult;
use crate::models::{Dataset, DatasetSummary, FilterOptions, StudentDetail, StudentProfile};
use crate::pipelines::{self, PipelineName, Table};
use crate::predicate;
use crate::ranking::{self, descending, RankedStudent, Weights};
use crate::store::{DataStore, QueryRequest};

/// Upward-facing facade over a data store. Holds no state besides the store
/// handle; every call reads fresh rows and computes from them.
#[derive(Debug, Clone)]
pub struct Engine<S> {
    store: S,
}

impl<S: DataStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Students satisfying every active criterion, one profile per student.
    ///
    /// Ordered by soft-skill average, problems solved and mock interview
    /// score (all descending, absent values last), then by student id.
    pub async fn find_eligible(&self, criteria: &Criteria) -> CoreResult<Vec<StudentProfile>> {
        let predicate = predicate::build(criteria)?;
        let request = QueryRequest {
            joins: predicate.join_plan(),
            predicate: predicate.expr,
        };
        tracing::debug!(
            criteria = criteria.active_count(),
            joins = ?request.joins,
            "finding eligible students"
        );

        let rows = self.store.query(&request).await?;
        let fetched = rows.len();
        let mut students = StudentProfile::collapse(rows);
        students.sort_by(compare_eligible);

        tracing::info!(rows = fetched, students = students.len(), "eligible students found");
        Ok(students)
    }

    /// Eligible students ordered by composite readiness score.
    pub async fn rank_eligible(
        &self,
        criteria: &Criteria,
        weights: &Weights,
    ) -> CoreResult<Vec<RankedStudent>> {
        weights.validate()?;
        let students = self.find_eligible(criteria).await?;
        ranking::rank(&students, weights)
    }

    /// The full population as plain tables.
    pub async fn load_dataset(&self) -> CoreResult<Dataset> {
        let rows = self.store.query(&QueryRequest::everything()).await?;
        Ok(Dataset::from_rows(rows))
    }

    pub async fn run_pipeline(&self, name: PipelineName) -> CoreResult<Table> {
        let dataset = self.load_dataset().await?;
        pipelines::run_pipeline(name, &dataset)
    }

    pub async fn filter_options(&self) -> CoreResult<FilterOptions> {
        Ok(self.load_dataset().await?.filter_options())
    }

    pub async fn summary(&self) -> CoreResult<DatasetSummary> {
        Ok(self.load_dataset().await?.summary())
    }

    /// `Ok(None)` when no student has this id.
    pub async fn student_detail(&self, student_id: i64) -> CoreResult<Option<StudentDetail>> {
        Ok(self.load_dataset().await?.detail(student_id))
    }
}

fn compare_eligible(a: &StudentProfile, b: &StudentProfile) -> Ordering {
    descending(a.soft_skill_average(), b.soft_skill_average())
        .then_with(|| {
            descending(
                a.problems_solved().map(f64::from),
                b.problems_solved().map(f64::from),
            )
        })
        .then_with(|| {
            descending(
                a.mock_interview_score().map(f64::from),
                b.mock_interview_score().map(f64::from),
            )
        })
        .then_with(|| a.student_id().cmp(&b.student_id()))
}

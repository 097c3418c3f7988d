//! Placement eligibility: criteria-driven student queries, weighted
//! readiness ranking and a fixed catalog of placement analytics.

pub mod cache;
pub mod config;
pub mod criteria;
pub mod db;
pub mod eligibility;
pub mod error;
pub mod models;
pub mod pipelines;
pub mod predicate;
pub mod ranking;
pub mod report;
pub mod store;

pub use criteria::Criteria;
pub use eligibility::Engine;
pub use error::{CoreError, CoreResult};
pub use models::{Dataset, StudentProfile};
pub use pipelines::{run_pipeline, PipelineName};
pub use ranking::{rank, RankedStudent, Weights};
pub use store::{DataStore, MemoryStore, QueryRequest};

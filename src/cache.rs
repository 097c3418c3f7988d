use std::collections::HashMap;
use std::fmt;

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::criteria::Criteria;
use crate::eligibility::Engine;
use crate::error::CoreResult;
use crate::models::StudentProfile;
use crate::pipelines::{PipelineName, Table};
use crate::ranking::{RankedStudent, Weights};
use crate::store::DataStore;

/// SHA-256 (hex) of the canonical JSON of a (criteria, weights, pipeline)
/// tuple. Equal tuples always hash to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(
        criteria: Option<&Criteria>,
        weights: Option<&Weights>,
        pipeline: Option<PipelineName>,
    ) -> Self {
        // status sets are unordered
        let criteria = criteria.map(|criteria| {
            let mut criteria = criteria.clone();
            criteria.placement_status.sort();
            criteria.placement_status.dedup();
            criteria
        });
        let material = json!({
            "criteria": criteria,
            "weights": weights,
            "pipeline": pipeline.map(PipelineName::slug),
        });

        let mut hasher = Sha256::new();
        hasher.update(material.to_string().as_bytes());
        CacheKey(hex::encode(hasher.finalize()))
    }

    pub fn eligible(criteria: &Criteria) -> Self {
        Self::new(Some(criteria), None, None)
    }

    pub fn ranked(criteria: &Criteria, weights: &Weights) -> Self {
        Self::new(Some(criteria), Some(weights), None)
    }

    pub fn pipeline(name: PipelineName) -> Self {
        Self::new(None, None, Some(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
enum CachedResult {
    Eligible(Vec<StudentProfile>),
    Ranked(Vec<RankedStudent>),
    Table(Table),
}

/// Memoizes engine results for a presentation layer. The wrapped engine
/// stays stateless; staleness is the caller's call via `invalidate` and
/// `clear`. Failures are never cached.
pub struct CachedEngine<S> {
    engine: Engine<S>,
    entries: HashMap<CacheKey, CachedResult>,
}

impl<S: DataStore> CachedEngine<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self {
            engine,
            entries: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &Engine<S> {
        &self.engine
    }

    pub async fn find_eligible(&mut self, criteria: &Criteria) -> CoreResult<Vec<StudentProfile>> {
        let key = CacheKey::eligible(criteria);
        if let Some(CachedResult::Eligible(students)) = self.entries.get(&key) {
            tracing::debug!(key = %key, "eligibility cache hit");
            return Ok(students.clone());
        }

        let students = self.engine.find_eligible(criteria).await?;
        self.entries
            .insert(key, CachedResult::Eligible(students.clone()));
        Ok(students)
    }

    pub async fn rank_eligible(
        &mut self,
        criteria: &Criteria,
        weights: &Weights,
    ) -> CoreResult<Vec<RankedStudent>> {
        let key = CacheKey::ranked(criteria, weights);
        if let Some(CachedResult::Ranked(ranked)) = self.entries.get(&key) {
            tracing::debug!(key = %key, "ranking cache hit");
            return Ok(ranked.clone());
        }

        let ranked = self.engine.rank_eligible(criteria, weights).await?;
        self.entries.insert(key, CachedResult::Ranked(ranked.clone()));
        Ok(ranked)
    }

    pub async fn run_pipeline(&mut self, name: PipelineName) -> CoreResult<Table> {
        let key = CacheKey::pipeline(name);
        if let Some(CachedResult::Table(table)) = self.entries.get(&key) {
            tracing::debug!(key = %key, pipeline = %name, "pipeline cache hit");
            return Ok(table.clone());
        }

        let table = self.engine.run_pipeline(name).await?;
        self.entries.insert(key, CachedResult::Table(table.clone()));
        Ok(table)
    }

    /// Drops one entry; returns whether it was present.
    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::error::CoreError;
    use crate::models::{Dataset, JoinedRow, PlacementStatus, Student};
    use crate::store::{MemoryStore, QueryRequest};

    #[derive(Clone)]
    struct CountingStore {
        inner: MemoryStore,
        reads: Arc<AtomicUsize>,
        fail: bool,
    }

    impl DataStore for CountingStore {
        async fn query(&self, request: &QueryRequest) -> CoreResult<Vec<JoinedRow>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CoreError::DataAccess(sqlx::Error::PoolClosed));
            }
            self.inner.query(request).await
        }
    }

    fn cached(fail: bool) -> (CachedEngine<CountingStore>, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let dataset = Dataset {
            students: vec![Student {
                id: 1,
                name: "Meera Iyer".to_string(),
                age: Some(23),
                gender: Some("F".to_string()),
                email: "meera@example.com".to_string(),
                phone: None,
                enrollment_year: Some(2022),
                course_batch: "DS_2022_B".to_string(),
                city: "Kochi".to_string(),
                graduation_year: Some(2023),
            }],
            ..Dataset::default()
        };
        let store = CountingStore {
            inner: MemoryStore::new(dataset),
            reads: Arc::clone(&reads),
            fail,
        };
        (CachedEngine::new(Engine::new(store)), reads)
    }

    #[test]
    fn keys_are_stable_hex_digests() {
        let criteria = Criteria::from_pairs([("city", "Kochi")]).expect("valid");
        let key = CacheKey::eligible(&criteria);
        assert_eq!(key, CacheKey::eligible(&criteria.clone()));
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn keys_distinguish_criteria_weights_and_pipelines() {
        let criteria = Criteria::from_pairs([("city", "Kochi")]).expect("valid");
        let other = Criteria::from_pairs([("city", "Pune")]).expect("valid");
        let weights = Weights::default();

        assert_ne!(CacheKey::eligible(&criteria), CacheKey::eligible(&other));
        assert_ne!(
            CacheKey::eligible(&criteria),
            CacheKey::ranked(&criteria, &weights)
        );
        assert_ne!(
            CacheKey::pipeline(PipelineName::TopPlacementReady),
            CacheKey::pipeline(PipelineName::ProgramEffectiveness)
        );
    }

    #[test]
    fn status_order_does_not_change_the_key() {
        let a = Criteria {
            placement_status: vec![PlacementStatus::Ready, PlacementStatus::Placed],
            ..Criteria::default()
        };
        let b = Criteria {
            placement_status: vec![PlacementStatus::Placed, PlacementStatus::Ready],
            ..Criteria::default()
        };
        assert_eq!(CacheKey::eligible(&a), CacheKey::eligible(&b));
    }

    #[tokio::test]
    async fn repeated_queries_hit_the_cache() {
        let (mut cache, reads) = cached(false);
        let criteria = Criteria::default();

        let first = cache.find_eligible(&criteria).await.expect("query");
        let second = cache.find_eligible(&criteria).await.expect("query");
        assert_eq!(first, second);
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        cache
            .run_pipeline(PipelineName::ProgramEffectiveness)
            .await
            .expect("pipeline");
        cache
            .run_pipeline(PipelineName::ProgramEffectiveness)
            .await
            .expect("pipeline");
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn invalidation_forces_a_fresh_read() {
        let (mut cache, reads) = cached(false);
        let criteria = Criteria::default();
        let weights = Weights::default();

        cache.rank_eligible(&criteria, &weights).await.expect("rank");
        assert!(cache.invalidate(&CacheKey::ranked(&criteria, &weights)));
        assert!(!cache.invalidate(&CacheKey::ranked(&criteria, &weights)));
        cache.rank_eligible(&criteria, &weights).await.expect("rank");
        assert_eq!(reads.load(Ordering::SeqCst), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let (mut cache, reads) = cached(true);
        assert!(cache.find_eligible(&Criteria::default()).await.is_err());
        assert!(cache.find_eligible(&Criteria::default()).await.is_err());
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }
}

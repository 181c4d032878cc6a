//! Plan cache for compiled query plans, injected into repositories.

use super::{PlanFingerprint, QueryPlan};
use std::{
    collections::BTreeMap,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

///
/// PlanCache
///
/// Process-lifetime map from registration fingerprint to compiled plan.
/// Entries are never invalidated: plans are schema-stable for a running process.
///
/// Concurrent compiles of one key may race and the last insert wins; plans
/// for one key are value-equal.
///

#[derive(Debug, Default)]
pub struct PlanCache {
    plans: RwLock<BTreeMap<PlanFingerprint, Arc<QueryPlan>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

///
/// CacheStats
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

impl PlanCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, fingerprint: &PlanFingerprint) -> Option<Arc<QueryPlan>> {
        self.plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fingerprint)
            .cloned()
    }

    pub fn insert(&self, fingerprint: PlanFingerprint, plan: Arc<QueryPlan>) {
        self.plans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(fingerprint, plan);
    }

    /// Return the cached plan for `fingerprint`, compiling and inserting it on a miss.
    ///
    /// Compilation runs outside the lock; a failed compile inserts nothing.
    pub fn get_or_try_insert_with<E>(
        &self,
        fingerprint: PlanFingerprint,
        compile: impl FnOnce() -> Result<QueryPlan, E>,
    ) -> Result<(Arc<QueryPlan>, bool), E> {
        if let Some(plan) = self.get(&fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((plan, true));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let plan = Arc::new(compile()?);
        self.insert(fingerprint, Arc::clone(&plan));

        Ok((plan, false))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.len(),
        }
    }
}

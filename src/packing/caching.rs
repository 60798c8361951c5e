use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, warn};

use super::{verify_assignment, PackingSolver, SharedSolver};
use crate::{
    cache::{CacheCoordinate, ResultCache},
    constraint::ConstraintManager,
    error::Result,
    model::Instance,
    result::SolverResult,
    termination::TerminationCriterion,
};

/// Answers from the cache when it can and caches what the inner solver decides.
pub struct CachingSolver {
    inner: SharedSolver,
    cache: Arc<ResultCache>,
    coordinate: CacheCoordinate,
    constraints: Arc<ConstraintManager>,
    min_runtime: Duration,
}

impl CachingSolver {
    pub fn new(
        inner: SharedSolver,
        cache: Arc<ResultCache>,
        coordinate: CacheCoordinate,
        constraints: Arc<ConstraintManager>,
        min_runtime: Duration,
    ) -> Self {
        Self {
            inner,
            cache,
            coordinate,
            constraints,
            min_runtime,
        }
    }
}

impl PackingSolver for CachingSolver {
    fn solve(
        &self,
        instance: &Instance,
        termination: &dyn TerminationCriterion,
        seed: u64,
    ) -> Result<SolverResult> {
        let watch = Instant::now();
        if let Some(hit) = self.cache.get(&self.coordinate, instance)? {
            if let Some(assignment) = hit.assignment() {
                verify_assignment(instance, &self.constraints, assignment)?;
            }
            return Ok(hit.with_runtime(watch.elapsed()));
        }

        let result = self.inner.solve(instance, termination, seed)?;
        if result.is_conclusive() {
            if result.runtime < self.min_runtime {
                debug!("{:?} in {:?} is too cheap to cache", result.kind(), result.runtime);
            } else if self.cache.put(&self.coordinate, instance, &result)? {
                warn!("{} was cached by a concurrent solve", instance.name());
            }
        }
        Ok(result)
    }

    fn interrupt(&self) {
        self.inner.interrupt();
    }

    fn shutdown(&self) {
        self.inner.shutdown();
    }
}

/// Decides instances contained in cached ones: SAT from a superset witness,
/// UNSAT from a contained UNSAT core. TIMEOUT otherwise.
pub struct ContainmentCacheSolver {
    cache: Arc<ResultCache>,
    coordinate: CacheCoordinate,
}

impl ContainmentCacheSolver {
    pub fn new(cache: Arc<ResultCache>, coordinate: CacheCoordinate) -> Self {
        Self { cache, coordinate }
    }
}

impl PackingSolver for ContainmentCacheSolver {
    fn solve(
        &self,
        instance: &Instance,
        _termination: &dyn TerminationCriterion,
        _seed: u64,
    ) -> Result<SolverResult> {
        let watch = Instant::now();
        let found = self
            .cache
            .find_superset_sat(&self.coordinate, instance)
            .or_else(|| self.cache.find_subset_unsat(&self.coordinate, instance));
        Ok(match found {
            Some(result) => {
                debug!("containment cache answered {:?}", result.kind());
                result.with_runtime(watch.elapsed())
            }
            None => SolverResult::timeout(watch.elapsed()),
        })
    }
}

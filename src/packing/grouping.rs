use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use log::debug;
use parking_lot::Mutex;

use super::{PackingSolver, SharedSolver};
use crate::{
    constraint::ConstraintManager,
    error::Result,
    grouper::ConstraintGraph,
    model::Instance,
    pool,
    result::{SatResult, SolverResult},
    termination::{Interruptible, TerminationCriterion},
};

/// Splits the instance into independent connected components of its
/// interference graph and solves them separately.
pub struct ComponentGrouping {
    inner: SharedSolver,
    constraints: Arc<ConstraintManager>,
    threads: usize,
    solve_everything: bool,
}

impl ComponentGrouping {
    pub fn new(
        inner: SharedSolver,
        constraints: Arc<ConstraintManager>,
        threads: usize,
        solve_everything: bool,
    ) -> Self {
        Self {
            inner,
            constraints,
            threads: threads.max(1),
            solve_everything,
        }
    }
}

impl PackingSolver for ComponentGrouping {
    fn solve(
        &self,
        instance: &Instance,
        termination: &dyn TerminationCriterion,
        seed: u64,
    ) -> Result<SolverResult> {
        let watch = Instant::now();
        let components =
            ConstraintGraph::new(instance.domains(), &self.constraints).components();
        if components.len() <= 1 {
            return self.inner.solve(instance, termination, seed);
        }
        debug!(
            "{} components, largest has {} stations",
            components.len(),
            components.last().map_or(0, |c| c.len())
        );

        let race = Interruptible::new(termination);
        let give_up = AtomicBool::new(false);
        let results: Mutex<Vec<SolverResult>> = Mutex::new(Vec::with_capacity(components.len()));

        pool::run(self.threads, components.len(), |i| {
            if give_up.load(Ordering::Acquire) {
                return Ok(());
            }
            let component = instance.restrict(&components[i]);
            let result = self
                .inner
                .solve(&component, &race, seed.wrapping_add(i as u64))?;

            if result.kind() != SatResult::Sat && !self.solve_everything {
                debug!("component {i} answered {:?}, skipping the rest", result.kind());
                give_up.store(true, Ordering::Release);
                if result.kind() == SatResult::Unsat {
                    race.interrupt();
                }
            }
            results.lock().push(result);
            Ok(())
        })?;

        let results = results.into_inner();
        let complete = results.len() == components.len();
        let merged = SolverResult::merge_components(&results, watch.elapsed());
        // skipped components leave a non-SAT result behind, so SAT implies all solved
        debug_assert!(merged.kind() != SatResult::Sat || complete);
        Ok(merged)
    }

    fn interrupt(&self) {
        self.inner.interrupt();
    }

    fn shutdown(&self) {
        self.inner.shutdown();
    }
}

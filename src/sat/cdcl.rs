use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use log::{debug, error};
use parking_lot::Mutex;

use super::{SatSolver, SatSolverResult};
use crate::{
    cnf::{compress, Cnf, Literal},
    result::SatResult,
    solver::{Options, Solver},
    termination::TerminationCriterion,
    types::Solution,
};

/// Runs the in-process CDCL engine on the calling thread.
pub struct CdclSatSolver {
    luby_base: usize,
    current: Mutex<Vec<Arc<AtomicBool>>>,
    closed: AtomicBool,
}

impl CdclSatSolver {
    pub fn new(luby_base: usize) -> Self {
        Self {
            luby_base,
            current: Mutex::new(vec![]),
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for CdclSatSolver {
    fn default() -> Self {
        Self::new(Options::default().luby_base)
    }
}

impl SatSolver for CdclSatSolver {
    fn solve(
        &self,
        cnf: &Cnf,
        termination: &dyn TerminationCriterion,
        seed: u64,
    ) -> SatSolverResult {
        self.solve_with_hints(cnf, &[], termination, seed)
    }

    fn solve_with_hints(
        &self,
        cnf: &Cnf,
        hints: &[Literal],
        termination: &dyn TerminationCriterion,
        seed: u64,
    ) -> SatSolverResult {
        let watch = Instant::now();
        if self.closed.load(Ordering::Acquire) {
            error!("solve called on a shut down engine");
            return SatSolverResult::new(SatResult::Crashed, Duration::ZERO);
        }
        if termination.has_to_stop() {
            return SatSolverResult::new(SatResult::Timeout, Duration::ZERO);
        }

        let (problem, compression) = match compress(cnf) {
            Ok(compressed) => compressed,
            Err(e) => {
                error!("cannot hand formula to the engine: {e}");
                return SatSolverResult::new(SatResult::Crashed, watch.elapsed());
            }
        };
        debug!(
            "solving {} vars, {} clauses, {:?} left",
            problem.var_count,
            problem.clauses.len(),
            termination.remaining_time()
        );

        let stop = Arc::new(AtomicBool::new(false));
        self.current.lock().push(stop.clone());

        let options = Options {
            luby_base: self.luby_base,
            seed,
            phases: compression.compress_hints(hints),
        };
        let solution = Solver::with_options(problem, options)
            .solve_until(|| stop.load(Ordering::Relaxed) || termination.has_to_stop());

        self.current.lock().retain(|s| !Arc::ptr_eq(s, &stop));
        let runtime = watch.elapsed();

        match solution {
            Solution::Sat { model } => match compression.decompress(&model) {
                Ok(model) => SatSolverResult {
                    result: SatResult::Sat,
                    runtime,
                    model,
                },
                Err(e) => {
                    error!("engine model does not decode: {e}");
                    SatSolverResult::new(SatResult::Crashed, runtime)
                }
            },
            Solution::Unsat => SatSolverResult::new(SatResult::Unsat, runtime),
            Solution::Unknown if stop.load(Ordering::Relaxed) => {
                SatSolverResult::new(SatResult::Interrupted, runtime)
            }
            Solution::Unknown => SatSolverResult::new(SatResult::Timeout, runtime),
        }
    }

    fn interrupt(&self) {
        for stop in self.current.lock().iter() {
            stop.store(true, Ordering::Relaxed);
        }
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.interrupt();
    }
}

//! Uniform solve/interrupt/shutdown surface over concrete SAT engines.

mod cdcl;
mod process;

use std::time::Duration;

pub use self::{cdcl::CdclSatSolver, process::ProcessSatSolver};
use crate::{cnf::Cnf, cnf::Literal, result::SatResult, termination::TerminationCriterion};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SatSolverResult {
    pub result: SatResult,
    pub runtime: Duration,
    /// Literals of the model, empty unless SAT.
    pub model: Vec<Literal>,
}

impl SatSolverResult {
    pub fn new(result: SatResult, runtime: Duration) -> Self {
        Self {
            result,
            runtime,
            model: vec![],
        }
    }
}

pub trait SatSolver: Send + Sync {
    /// Solves `cnf` until a verdict or until `termination` asks to stop.
    /// Returns TIMEOUT right away if it already does.
    fn solve(
        &self,
        cnf: &Cnf,
        termination: &dyn TerminationCriterion,
        seed: u64,
    ) -> SatSolverResult;

    /// Like [`SatSolver::solve`], preferring the polarities in `hints` where the
    /// engine supports it.
    fn solve_with_hints(
        &self,
        cnf: &Cnf,
        _hints: &[Literal],
        termination: &dyn TerminationCriterion,
        seed: u64,
    ) -> SatSolverResult {
        self.solve(cnf, termination, seed)
    }

    /// Stops the solve in flight, if any. The solve returns INTERRUPTED.
    fn interrupt(&self);

    /// Interrupts and releases the engine. Later solves report CRASHED.
    fn shutdown(&self);
}

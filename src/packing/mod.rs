//! Packing solvers: the SAT-backed solver, composites and decorators.

mod arc_consistency;
mod caching;
mod grouping;
mod parallel;
mod presolver;
mod sat_based;
mod sequential;
#[cfg(test)]
mod testing;
mod underconstrained;
mod verifier;

use std::sync::Arc;

pub use self::{
    arc_consistency::ArcConsistency,
    caching::{CachingSolver, ContainmentCacheSolver},
    grouping::ComponentGrouping,
    parallel::{ParallelComposite, SolverFactory},
    presolver::{CertifierKind, NeighbourhoodPresolver, PreviousAssignmentSolver, SubsetCertifier},
    sat_based::SatBasedSolver,
    sequential::SequentialComposite,
    underconstrained::UnderconstrainedRemover,
    verifier::{verify_assignment, AssignmentVerifier},
};
use crate::{error::Result, model::Instance, result::SolverResult, termination::TerminationCriterion};

/// Decides a packing instance under a termination criterion.
///
/// TIMEOUT, INTERRUPTED and CRASHED are results; errors are reserved for
/// broken invariants and abort the query.
pub trait PackingSolver: Send + Sync {
    fn solve(
        &self,
        instance: &Instance,
        termination: &dyn TerminationCriterion,
        seed: u64,
    ) -> Result<SolverResult>;

    /// Asks solves in flight to return early.
    fn interrupt(&self) {}

    /// Releases resources. Idempotent.
    fn shutdown(&self) {}
}

pub type SharedSolver = Arc<dyn PackingSolver>;

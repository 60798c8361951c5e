use std::sync::Arc;

use log::error;

use super::{PackingSolver, SharedSolver};
use crate::{
    constraint::ConstraintManager,
    error::{PackingError, Result},
    model::{station_channels, Assignment, Instance},
    result::SolverResult,
    termination::TerminationCriterion,
};

/// Checks that `assignment` places exactly the instance's stations, each on one
/// channel of its domain, without violating an interference constraint.
pub fn verify_assignment(
    instance: &Instance,
    constraints: &ConstraintManager,
    assignment: &Assignment,
) -> Result<()> {
    let channels = station_channels(assignment)?;

    for (station, domain) in instance.domains() {
        match channels.get(station) {
            None => {
                return Err(PackingError::UnverifiedAssignment(format!(
                    "station {station} is not assigned"
                )))
            }
            Some(channel) if !domain.contains(channel) => {
                return Err(PackingError::UnverifiedAssignment(format!(
                    "station {station} is on {channel}, outside its domain"
                )))
            }
            Some(_) => (),
        }
    }
    if let Some(extra) = channels.keys().find(|s| !instance.contains(**s)) {
        return Err(PackingError::UnverifiedAssignment(format!(
            "station {extra} is not part of the instance"
        )));
    }

    match constraints.violation(assignment) {
        Some(violation) => Err(PackingError::UnverifiedAssignment(violation)),
        None => Ok(()),
    }
}

/// Re-verifies every SAT answer of the wrapped solver.
pub struct AssignmentVerifier {
    inner: SharedSolver,
    constraints: Arc<ConstraintManager>,
}

impl AssignmentVerifier {
    pub fn new(inner: SharedSolver, constraints: Arc<ConstraintManager>) -> Self {
        Self { inner, constraints }
    }
}

impl PackingSolver for AssignmentVerifier {
    fn solve(
        &self,
        instance: &Instance,
        termination: &dyn TerminationCriterion,
        seed: u64,
    ) -> Result<SolverResult> {
        let result = self.inner.solve(instance, termination, seed)?;
        if let Some(assignment) = result.assignment() {
            if let Err(e) = verify_assignment(instance, &self.constraints, assignment) {
                error!("{:?} produced a bad witness: {e}", result.solved_by);
                return Err(e);
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

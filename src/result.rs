//! Outcomes of packing solvers and how partial outcomes combine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::Assignment;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SatResult {
    Sat,
    Unsat,
    Timeout,
    Crashed,
    Interrupted,
}

impl SatResult {
    pub fn is_conclusive(self) -> bool {
        matches!(self, SatResult::Sat | SatResult::Unsat)
    }
}

/// Which part of the pipeline produced a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolvedBy {
    Cache,
    ContainmentCache,
    PreviousAssignment,
    Presolver,
    Components,
    Underconstrained,
    ArcConsistency,
    SatEngine,
    Trivial,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Sat(Assignment),
    Unsat,
    Timeout,
    Crashed,
    Interrupted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolverResult {
    pub outcome: Outcome,
    pub runtime: Duration,
    pub solved_by: SolvedBy,
}

impl SolverResult {
    pub fn new(outcome: Outcome, runtime: Duration, solved_by: SolvedBy) -> Self {
        Self {
            outcome,
            runtime,
            solved_by,
        }
    }

    pub fn sat(assignment: Assignment, runtime: Duration, solved_by: SolvedBy) -> Self {
        Self::new(Outcome::Sat(assignment), runtime, solved_by)
    }

    pub fn unsat(runtime: Duration, solved_by: SolvedBy) -> Self {
        Self::new(Outcome::Unsat, runtime, solved_by)
    }

    pub fn timeout(runtime: Duration) -> Self {
        Self::new(Outcome::Timeout, runtime, SolvedBy::Unknown)
    }

    pub fn kind(&self) -> SatResult {
        match self.outcome {
            Outcome::Sat(_) => SatResult::Sat,
            Outcome::Unsat => SatResult::Unsat,
            Outcome::Timeout => SatResult::Timeout,
            Outcome::Crashed => SatResult::Crashed,
            Outcome::Interrupted => SatResult::Interrupted,
        }
    }

    pub fn is_conclusive(&self) -> bool {
        self.kind().is_conclusive()
    }

    pub fn assignment(&self) -> Option<&Assignment> {
        match &self.outcome {
            Outcome::Sat(assignment) => Some(assignment),
            _ => None,
        }
    }

    pub fn with_runtime(mut self, runtime: Duration) -> Self {
        self.runtime = runtime;
        self
    }

    /// Merges per-component results of one decomposed instance.
    ///
    /// UNSAT anywhere decides the whole instance. Otherwise any TIMEOUT, then
    /// INTERRUPTED, then CRASHED wins. SAT needs every component SAT and yields
    /// the union of their witnesses. No components at all is a trivial SAT.
    pub fn merge_components(results: &[SolverResult], runtime: Duration) -> SolverResult {
        let has = |kind| results.iter().any(|r| r.kind() == kind);

        let outcome = if has(SatResult::Unsat) {
            Outcome::Unsat
        } else if has(SatResult::Timeout) {
            Outcome::Timeout
        } else if has(SatResult::Interrupted) {
            Outcome::Interrupted
        } else if has(SatResult::Crashed) {
            Outcome::Crashed
        } else {
            let mut union = Assignment::new();
            for result in results {
                if let Some(assignment) = result.assignment() {
                    for (&channel, stations) in assignment {
                        union.entry(channel).or_default().extend(stations);
                    }
                }
            }
            Outcome::Sat(union)
        };

        let solved_by = match results {
            [single] => single.solved_by,
            _ => SolvedBy::Components,
        };
        SolverResult::new(outcome, runtime, solved_by)
    }
}

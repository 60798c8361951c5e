//! Cheap certificates tried before the full solve.

use std::{
    collections::BTreeSet,
    sync::Arc,
    time::{Duration, Instant},
};

use log::debug;

use super::{verify_assignment, PackingSolver, SharedSolver};
use crate::{
    constraint::ConstraintManager,
    error::Result,
    grouper::ConstraintGraph,
    model::{to_assignment, Domains, Instance, Station},
    result::{SatResult, SolvedBy, SolverResult},
    termination::{Disjunctive, TerminationCriterion, WallClock},
};

/// SAT when the previous assignment already packs every station.
pub struct PreviousAssignmentSolver {
    constraints: Arc<ConstraintManager>,
}

impl PreviousAssignmentSolver {
    pub fn new(constraints: Arc<ConstraintManager>) -> Self {
        Self { constraints }
    }
}

impl PackingSolver for PreviousAssignmentSolver {
    fn solve(
        &self,
        instance: &Instance,
        _termination: &dyn TerminationCriterion,
        _seed: u64,
    ) -> Result<SolverResult> {
        let watch = Instant::now();
        if instance.previous().len() == instance.len() {
            let assignment = to_assignment(instance.previous());
            if verify_assignment(instance, &self.constraints, &assignment).is_ok() {
                debug!("previous assignment still packs all {} stations", instance.len());
                return Ok(SolverResult::sat(
                    assignment,
                    watch.elapsed(),
                    SolvedBy::PreviousAssignment,
                ));
            }
        }
        Ok(SolverResult::timeout(watch.elapsed()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CertifierKind {
    /// Repack a subset with everyone else fixed to the previous channel.
    Sat,
    /// Show a subset alone cannot be packed.
    Unsat,
}

/// Decides a station subset of an instance and lifts conclusive answers
/// back to the whole instance where that is sound.
pub struct SubsetCertifier {
    kind: CertifierKind,
    solver: SharedSolver,
    cutoff: Duration,
}

impl SubsetCertifier {
    pub fn new(kind: CertifierKind, solver: SharedSolver, cutoff: Duration) -> Self {
        Self {
            kind,
            solver,
            cutoff,
        }
    }

    pub fn certify(
        &self,
        instance: &Instance,
        to_pack: &BTreeSet<Station>,
        termination: &dyn TerminationCriterion,
        seed: u64,
    ) -> Result<SolverResult> {
        let watch = Instant::now();
        let cutoff = WallClock::new(self.cutoff);
        let criteria: Vec<&dyn TerminationCriterion> = vec![termination, &cutoff];
        let termination = Disjunctive::new(criteria);

        match self.kind {
            CertifierKind::Sat => {
                let mut domains = Domains::new();
                for (&station, domain) in instance.domains() {
                    if to_pack.contains(&station) {
                        domains.insert(station, domain.clone());
                    } else {
                        let Some(&previous) = instance.previous().get(&station) else {
                            // nothing to pin this station to
                            return Ok(SolverResult::timeout(watch.elapsed()));
                        };
                        domains.insert(station, [previous].into_iter().collect());
                    }
                }
                let pinned = Instance::new(domains, instance.previous().clone())?;
                let result = self.solver.solve(&pinned, &termination, seed)?;
                Ok(match result.kind() {
                    SatResult::Sat => SolverResult {
                        solved_by: SolvedBy::Presolver,
                        ..result
                    },
                    _ => SolverResult::timeout(watch.elapsed()),
                })
            }
            CertifierKind::Unsat => {
                let subset = instance.restrict(to_pack);
                let result = self.solver.solve(&subset, &termination, seed)?;
                Ok(match result.kind() {
                    SatResult::Unsat => SolverResult::unsat(watch.elapsed(), SolvedBy::Presolver),
                    _ => SolverResult::timeout(watch.elapsed()),
                })
            }
        }
    }

    fn interrupt(&self) {
        self.solver.interrupt();
    }

    fn shutdown(&self) {
        self.solver.shutdown();
    }
}

/// Repacks the stations without a previous channel together with their
/// interference neighbourhood, widening it ring by ring.
pub struct NeighbourhoodPresolver {
    constraints: Arc<ConstraintManager>,
    certifiers: Vec<SubsetCertifier>,
    max_missing: usize,
    max_to_pack: usize,
}

impl NeighbourhoodPresolver {
    pub const MAX_MISSING_STATIONS: usize = 20;
    pub const MAX_TO_PACK: usize = 100;

    pub fn new(
        constraints: Arc<ConstraintManager>,
        certifiers: Vec<SubsetCertifier>,
        max_missing: usize,
        max_to_pack: usize,
    ) -> Self {
        Self {
            constraints,
            certifiers,
            max_missing,
            max_to_pack,
        }
    }

    /// Growing neighbourhoods around `seeds`, capped at `max_to_pack` stations.
    fn neighbourhoods(
        &self,
        graph: &ConstraintGraph,
        seeds: &BTreeSet<Station>,
    ) -> Vec<BTreeSet<Station>> {
        let mut rings = vec![];
        let mut current = seeds.clone();
        let mut frontier = seeds.clone();
        loop {
            let next: BTreeSet<Station> = frontier
                .iter()
                .flat_map(|&s| graph.neighbours(s))
                .filter(|s| !current.contains(s))
                .collect();
            if next.is_empty() || current.len() + next.len() > self.max_to_pack {
                break;
            }
            current.extend(next.iter().copied());
            rings.push(current.clone());
            frontier = next;
        }
        if rings.is_empty() && current.len() <= self.max_to_pack {
            rings.push(current);
        }
        rings
    }
}

impl PackingSolver for NeighbourhoodPresolver {
    fn solve(
        &self,
        instance: &Instance,
        termination: &dyn TerminationCriterion,
        seed: u64,
    ) -> Result<SolverResult> {
        let watch = Instant::now();
        let missing: BTreeSet<Station> = instance
            .stations()
            .filter(|s| !instance.previous().contains_key(s))
            .collect();
        if missing.is_empty() || missing.len() > self.max_missing {
            return Ok(SolverResult::timeout(watch.elapsed()));
        }

        let graph = ConstraintGraph::new(instance.domains(), &self.constraints);
        let mut attempts = 0;
        for to_pack in self.neighbourhoods(&graph, &missing) {
            for certifier in &self.certifiers {
                if termination.has_to_stop() {
                    return Ok(SolverResult::timeout(watch.elapsed()));
                }
                let result = certifier.certify(instance, &to_pack, termination, seed)?;
                attempts += 1;
                if result.is_conclusive() {
                    debug!(
                        "presolved {:?} by repacking {} of {} stations",
                        result.kind(),
                        to_pack.len(),
                        instance.len()
                    );
                    return Ok(result.with_runtime(watch.elapsed()));
                }
            }
        }
        debug!("presolver gave up after {attempts} attempts");
        Ok(SolverResult::timeout(watch.elapsed()))
    }

    fn interrupt(&self) {
        for certifier in &self.certifiers {
            certifier.interrupt();
        }
    }

    fn shutdown(&self) {
        for certifier in &self.certifiers {
            certifier.shutdown();
        }
    }
}

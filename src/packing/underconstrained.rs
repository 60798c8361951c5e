use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Instant,
};

use log::{debug, trace};

use super::{PackingSolver, SharedSolver};
use crate::{
    constraint::ConstraintManager,
    error::{PackingError, Result},
    grouper::ConstraintGraph,
    model::{station_channels, to_assignment, Channel, Domains, Instance, Station},
    result::{Outcome, SolvedBy, SolverResult},
    termination::TerminationCriterion,
};

/// Removes stations that can always be packed whatever their neighbours do,
/// solves the rest and puts the removed stations back greedily.
pub struct UnderconstrainedRemover {
    inner: SharedSolver,
    constraints: Arc<ConstraintManager>,
    expensive: bool,
    recursive: bool,
}

impl UnderconstrainedRemover {
    pub fn new(
        inner: SharedSolver,
        constraints: Arc<ConstraintManager>,
        expensive: bool,
        recursive: bool,
    ) -> Self {
        Self {
            inner,
            constraints,
            expensive,
            recursive,
        }
    }

    /// Stations of `domains` that keep a free channel under any placement of the others.
    pub fn underconstrained(&self, domains: &Domains) -> BTreeSet<Station> {
        let mut touched: BTreeSet<(Station, Channel)> = BTreeSet::new();
        for constraint in self.constraints.relevant_constraints(domains) {
            // relevant constraints only name target channels inside a domain
            let Some(target_channel) = constraint.target_channel() else {
                continue;
            };
            touched.insert((constraint.source, constraint.channel));
            touched.insert((constraint.target, target_channel));
        }

        let graph = self.expensive.then(|| ConstraintGraph::new(domains, &self.constraints));

        domains
            .iter()
            .filter(|&(&station, domain)| {
                // a channel no constraint mentions is always free
                if domain.iter().any(|&c| !touched.contains(&(station, c))) {
                    return true;
                }
                let Some(graph) = &graph else {
                    return false;
                };
                // each neighbour blocks at most this many of our channels
                let blockable: usize = graph
                    .neighbours(station)
                    .into_iter()
                    .map(|other| {
                        domains[&other]
                            .iter()
                            .map(|&d| {
                                domain
                                    .iter()
                                    .filter(|&&c| !self.constraints.compatible(station, c, other, d))
                                    .count()
                            })
                            .max()
                            .unwrap_or(0)
                    })
                    .sum();
                blockable < domain.len()
            })
            .map(|(&station, _)| station)
            .collect()
    }

    /// Places `removed` (last removed first) next to `placed`.
    fn reinsert(
        &self,
        instance: &Instance,
        placed: &mut BTreeMap<Station, Channel>,
        removed: &[Station],
    ) -> Result<()> {
        for &station in removed.iter().rev() {
            let domain = instance.domain(station).into_iter().flatten();
            let free = domain.copied().find(|&c| {
                placed
                    .iter()
                    .all(|(&other, &d)| self.constraints.compatible(station, c, other, d))
            });
            match free {
                Some(channel) => {
                    trace!("station {station} goes back on {channel}");
                    placed.insert(station, channel);
                }
                None => {
                    return Err(PackingError::UnverifiedAssignment(format!(
                        "underconstrained station {station} has no free channel"
                    )))
                }
            }
        }
        Ok(())
    }
}

impl PackingSolver for UnderconstrainedRemover {
    fn solve(
        &self,
        instance: &Instance,
        termination: &dyn TerminationCriterion,
        seed: u64,
    ) -> Result<SolverResult> {
        let watch = Instant::now();

        let mut remaining: BTreeSet<Station> = instance.stations().collect();
        let mut removed: Vec<Station> = vec![];
        loop {
            let current = instance.restrict(&remaining);
            let found = self.underconstrained(current.domains());
            if found.is_empty() {
                break;
            }
            for station in &found {
                remaining.remove(station);
            }
            removed.extend(found);
            if !self.recursive {
                break;
            }
        }

        if removed.is_empty() {
            return self.inner.solve(instance, termination, seed);
        }
        debug!(
            "removed {} underconstrained stations, {} left",
            removed.len(),
            remaining.len()
        );

        let (mut placed, solved_by) = if remaining.is_empty() {
            (BTreeMap::new(), SolvedBy::Underconstrained)
        } else {
            let result = self
                .inner
                .solve(&instance.restrict(&remaining), termination, seed)?;
            match &result.outcome {
                Outcome::Sat(assignment) => (station_channels(assignment)?, result.solved_by),
                // the removed stations cannot turn UNSAT into SAT or vice versa
                _ => return Ok(result.with_runtime(watch.elapsed())),
            }
        };

        self.reinsert(instance, &mut placed, &removed)?;
        Ok(SolverResult::sat(
            to_assignment(&placed),
            watch.elapsed(),
            solved_by,
        ))
    }

    fn interrupt(&self) {
        self.inner.interrupt();
    }

    fn shutdown(&self) {
        self.inner.shutdown();
    }
}

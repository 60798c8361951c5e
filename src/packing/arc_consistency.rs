use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::Arc,
    time::Instant,
};

use log::{debug, trace};

use super::{PackingSolver, SharedSolver};
use crate::{
    constraint::ConstraintManager,
    error::Result,
    grouper::ConstraintGraph,
    model::{Channel, Domains, Instance, Station, StationChannels},
    result::{SolvedBy, SolverResult},
    termination::TerminationCriterion,
};

/// Enforces arc consistency (AC-3) on the domains before handing the instance
/// on. A channel survives only if every neighbour keeps a channel compatible
/// with it; a domain that runs empty proves the instance UNSAT.
pub struct ArcConsistency {
    inner: SharedSolver,
    constraints: Arc<ConstraintManager>,
}

impl ArcConsistency {
    pub fn new(inner: SharedSolver, constraints: Arc<ConstraintManager>) -> Self {
        Self { inner, constraints }
    }

    /// Arc-consistent domains, or `None` once some domain is empty.
    pub fn reduce(&self, domains: &Domains) -> Option<Domains> {
        let graph = ConstraintGraph::new(domains, &self.constraints);
        let neighbours: BTreeMap<Station, BTreeSet<Station>> =
            domains.keys().map(|&s| (s, graph.neighbours(s))).collect();

        let mut queue: VecDeque<(Station, Station)> = neighbours
            .iter()
            .flat_map(|(&x, ys)| ys.iter().map(move |&y| (x, y)))
            .collect();
        let mut queued: BTreeSet<(Station, Station)> = queue.iter().copied().collect();

        let mut reduced = domains.clone();
        while let Some((x, y)) = queue.pop_front() {
            queued.remove(&(x, y));
            if !self.revise(&mut reduced, x, y) {
                continue;
            }
            if reduced[&x].is_empty() {
                trace!("station {x} has no channel left next to {y}");
                return None;
            }
            for &z in &neighbours[&x] {
                if z != y && queued.insert((z, x)) {
                    queue.push_back((z, x));
                }
            }
        }
        Some(reduced)
    }

    /// Drops the channels of `x` that no channel of `y` supports.
    fn revise(&self, domains: &mut Domains, x: Station, y: Station) -> bool {
        let unsupported: Vec<Channel> = domains[&x]
            .iter()
            .copied()
            .filter(|&cx| {
                !domains[&y]
                    .iter()
                    .any(|&cy| self.constraints.compatible(x, cx, y, cy))
            })
            .collect();
        if unsupported.is_empty() {
            return false;
        }
        if let Some(domain) = domains.get_mut(&x) {
            for channel in &unsupported {
                domain.remove(channel);
            }
        }
        true
    }
}

impl PackingSolver for ArcConsistency {
    fn solve(
        &self,
        instance: &Instance,
        termination: &dyn TerminationCriterion,
        seed: u64,
    ) -> Result<SolverResult> {
        let watch = Instant::now();
        let Some(reduced) = self.reduce(instance.domains()) else {
            debug!("{}: arc consistency emptied a domain", instance.name());
            return Ok(SolverResult::unsat(watch.elapsed(), SolvedBy::ArcConsistency));
        };

        let size = |domains: &Domains| domains.values().map(BTreeSet::len).sum::<usize>();
        let removed = size(instance.domains()) - size(&reduced);
        if removed == 0 {
            return self.inner.solve(instance, termination, seed);
        }
        debug!("arc consistency removed {removed} channels");

        let previous: StationChannels = instance
            .previous()
            .iter()
            .filter(|(s, c)| reduced.get(*s).is_some_and(|d| d.contains(*c)))
            .map(|(&s, &c)| (s, c))
            .collect();
        let reduced = Instance::new(reduced, previous)?.with_name(instance.name());
        let result = self.inner.solve(&reduced, termination, seed)?;
        Ok(result.with_runtime(watch.elapsed()))
    }

    fn interrupt(&self) {
        self.inner.interrupt();
    }

    fn shutdown(&self) {
        self.inner.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use test_log::test;

    use super::ArcConsistency;
    use crate::{
        constraint::{Constraint, ConstraintManager},
        model::{domains, Instance, Station, StationChannels},
        packing::{testing::Fixed, PackingSolver},
        result::{SatResult, SolvedBy},
        termination::NeverEnding,
    };

    fn decorator(constraints: impl IntoIterator<Item = Constraint>) -> (ArcConsistency, Arc<Fixed>) {
        let inner = Arc::new(Fixed::new(SatResult::Sat));
        let constraints = Arc::new(ConstraintManager::new(constraints));
        (ArcConsistency::new(inner.clone(), constraints), inner)
    }

    #[test]
    fn emptied_domain_is_unsat() {
        let (solver, inner) = decorator([Constraint::co(Station(1), Station(2), 14)]);
        let instance =
            Instance::new(domains(&[(1, &[14]), (2, &[14])]), StationChannels::new()).unwrap();
        let result = solver.solve(&instance, &NeverEnding, 0).unwrap();
        assert_eq!(result.kind(), SatResult::Unsat);
        assert_eq!(result.solved_by, SolvedBy::ArcConsistency);
        assert_eq!(inner.calls(), 0);
    }

    #[test]
    fn removals_propagate_along_arcs() {
        let (solver, _) = decorator([
            Constraint::co(Station(1), Station(2), 14),
            Constraint::co(Station(2), Station(3), 15),
        ]);
        let reduced = solver
            .reduce(&domains(&[(1, &[14]), (2, &[14, 15]), (3, &[15, 16])]))
            .unwrap();
        assert_eq!(reduced, domains(&[(1, &[14]), (2, &[15]), (3, &[16])]));

        // nothing to prune without interference
        let free = domains(&[(1, &[14, 15]), (4, &[14])]);
        assert_eq!(solver.reduce(&free), Some(free));
    }

    #[test]
    fn inner_solver_sees_reduced_domains() {
        let (solver, inner) = decorator([Constraint::adj(Station(1), Station(2), 14)]);
        // the previous channel of 2 is pruned and must not break the instance
        let instance = Instance::new(
            domains(&[(1, &[14]), (2, &[15, 16])]),
            [(Station(2), 15)].into(),
        )
        .unwrap();
        let result = solver.solve(&instance, &NeverEnding, 0).unwrap();
        assert_eq!(inner.calls(), 1);
        assert!(result.assignment().unwrap()[&16].contains(&Station(2)));
    }
}

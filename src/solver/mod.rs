//! In-process CDCL engine.
//!
//! Two watched literals, first-UIP learning with basic minimisation,
//! activity-based branching, Luby restarts and activity-based deletion of
//! learnt clauses. The search can be stopped
//! cooperatively through [`Solver::solve_until`].

mod assignment;
mod branching;
mod map;
mod restart;

use std::iter::Peekable;

use crate::types::{to_var, Clause, Lit, Problem, Solution};

use self::{
    assignment::{Assignment, Reason},
    branching::{Chooser, ClauseTracker},
    map::{var_map, LitMap, VarMap},
    restart::Luby,
};

/// How often (in decisions) the stop predicate is polled.
const POLL_DECISIONS: usize = 64;

#[derive(Clone, Debug)]
pub struct Options {
    pub luby_base: usize,
    /// Perturbs the initial branching order. 0 keeps the plain order.
    pub seed: u64,
    /// Literals preferred when their variable is picked for a decision.
    pub phases: Vec<Lit>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            luby_base: 16,
            seed: 0,
            phases: vec![],
        }
    }
}

pub struct Solver {
    clauses: Vec<Clause>,
    min_clause_count: usize,
    max_learnt: f64,

    assignment: Assignment,

    watched: LitMap<Vec<usize>>,
    prop_head: usize,

    chooser: Chooser,
    clause_tracker: ClauseTracker,
    phase: VarMap<bool>,

    decisions: usize,
    conflicts: usize,
    restart_threshold: Peekable<Luby>,
}

impl Solver {
    pub fn new(problem: Problem) -> Self {
        Self::with_options(problem, Options::default())
    }

    pub fn with_options(problem: Problem, options: Options) -> Self {
        let Problem { var_count, clauses } = problem;

        let mut phase: VarMap<bool> = var_map(var_count);
        for lit in options.phases {
            let var = to_var(lit);
            if var <= var_count {
                phase[var] = lit.is_positive();
            }
        }

        let mut solver = Solver {
            clauses: Vec::with_capacity(clauses.len()),
            min_clause_count: clauses.len(),
            max_learnt: clauses.len() as f64 / 3.0,
            assignment: Assignment::new(var_count),
            watched: LitMap::<Vec<usize>>::new(var_count),
            prop_head: 0,
            chooser: Chooser::seeded(var_count, options.seed),
            clause_tracker: ClauseTracker::new(clauses.len()),
            phase,
            decisions: 0,
            conflicts: 0,
            restart_threshold: Luby::new(options.luby_base.max(1)).peekable(),
        };

        for mut clause in clauses {
            clause.sort();
            clause.dedup();
            solver.add(clause);
        }

        solver
    }

    fn add(&mut self, clause: Clause) -> usize {
        let i = self.clauses.len();
        if let [lit0, lit1, ..] = clause[..] {
            self.watched[lit0].push(i);
            self.watched[lit1].push(i);
        }
        self.clauses.push(clause);
        self.clause_tracker.add();
        i
    }

    /// Swap-removes a clause unless it is the reason for a literal on the trail.
    fn remove(&mut self, i_clause: usize) -> Option<Clause> {
        let is_reason = self.assignment.trail().iter().any(|&lit| {
            matches!(
                self.assignment.reason(lit),
                Some(Reason::Propagation { i_clause: i }) if i == i_clause
            )
        });
        if is_reason {
            return None;
        }

        for &lit in &self.clauses[i_clause] {
            self.watched[lit].retain(|&i| i != i_clause);
        }

        let i_last = self.clauses.len() - 1;
        for &lit in &self.clauses[i_last] {
            for i in &mut self.watched[lit] {
                if *i == i_last {
                    *i = i_clause;
                }
            }
        }
        self.assignment.rename_clause(i_last, i_clause);

        self.clause_tracker.swap_remove(i_clause);
        Some(self.clauses.swap_remove(i_clause))
    }

    /// Drops learnt clauses less active than the median learnt clause.
    fn prune(&mut self) {
        let pivot = self.clause_tracker.select_pivot(self.min_clause_count);

        let mut i = self.min_clause_count;
        while i < self.clauses.len() {
            if self.clause_tracker.get_activity(i) < pivot && self.remove(i).is_some() {
                continue;
            }
            i += 1;
        }
    }

    fn propagate(&mut self) -> Option<usize> {
        while let Some(lit) = self.assignment.trail().get(self.prop_head) {
            let lit = -lit;

            let mut i = 0;
            'clause: while i < self.watched[lit].len() {
                let c = self.watched[lit][i];
                let clause = &mut self.clauses[c];

                // Implicit watches: the two watched literals live at index 0 and 1.
                if clause[1] != lit {
                    clause.swap(0, 1);
                }
                debug_assert_eq!(clause[1], lit);

                for j in 0..clause.len() {
                    match self.assignment.eval(clause[j]) {
                        Some(true) => {
                            i += 1;
                            continue 'clause;
                        }
                        None if j != 0 => {
                            clause.swap(1, j);
                            debug_assert_ne!(clause[0], clause[1]);

                            self.watched[lit].swap_remove(i);
                            debug_assert!(!self.watched[clause[1]].contains(&c));
                            self.watched[clause[1]].push(c);

                            continue 'clause;
                        }
                        _ => (),
                    }
                }

                if self.assignment.eval(clause[0]).is_none() {
                    let unit_lit = clause[0];
                    self.assignment
                        .set(unit_lit, Reason::Propagation { i_clause: c });
                } else {
                    return Some(c);
                }

                i += 1;
            }

            self.prop_head += 1;
        }

        None
    }

    // minisat's basic clause minimisation
    fn simplify(&self, learnt: &mut Clause) {
        let mut i = 1;
        while i < learnt.len() {
            if let Some(Reason::Propagation { i_clause }) = self.assignment.reason(learnt[i]) {
                let remove = self.clauses[i_clause].iter().all(|&lit| {
                    learnt.contains(&lit)
                        || learnt.contains(&-lit)
                        || self.assignment.level(lit) == Some(0)
                });
                if remove {
                    learnt.swap_remove(i);
                    continue;
                }
            }
            i += 1;
        }
    }

    fn analyze(&mut self, i_conflict: usize) -> (Clause, usize) {
        let mut learnt = self.clauses[i_conflict].clone();
        self.clause_tracker.touch(i_conflict);
        let last_level = self.assignment.last_level();

        let mut i_trail = self.assignment.trail().len();
        let i_assert = loop {
            for &lit in &learnt {
                self.chooser.touch(to_var(lit));
            }

            let mut at_last_level = learnt
                .iter()
                .enumerate()
                .filter(|(_, &lit)| self.assignment.level(lit) >= Some(last_level));
            let (i, _) = at_last_level
                .next()
                .expect("conflict clause has a literal at the conflict level");
            if at_last_level.next().is_none() {
                break i;
            }

            i_trail -= 1;
            let on_lit = self.assignment.trail()[i_trail];

            let i_reason = match self.assignment.reason(on_lit) {
                Some(Reason::Propagation { i_clause }) => i_clause,
                _ => unreachable!("resolution stops before the decision literal"),
            };
            self.clause_tracker.touch(i_reason);
            let reason = &self.clauses[i_reason];
            debug_assert!(reason.contains(&on_lit));

            let len_before = learnt.len();
            learnt.retain(|&lit| lit != -on_lit);
            if learnt.len() != len_before {
                learnt.extend(reason.iter().filter(|&&lit| lit != on_lit));
                // dedup to count literals per level correctly
                learnt.sort();
                learnt.dedup();
            }
        };

        learnt.swap(0, i_assert);

        self.simplify(&mut learnt);

        let backtrack_level = if learnt.len() == 1 {
            if self.assignment.last_level() > 0 {
                1
            } else {
                self.assignment.eval(learnt[0]).unwrap_or(false) as usize
            }
        } else {
            let (i_max, _) = learnt[1..]
                .iter()
                .enumerate()
                .max_by_key(|(_, &lit)| self.assignment.level(lit))
                .expect("learnt clause has at least two literals");
            learnt.swap(1, i_max + 1);

            self.assignment.level(learnt[1]).unwrap_or(0) + 1
        };

        self.chooser.rescale();
        self.clause_tracker.rescale();

        (learnt, backtrack_level)
    }

    fn restart(&mut self) {
        self.conflicts = 0;
        self.restart_threshold.next();
        if self.assignment.last_level() >= 1 {
            self.assignment.backtrack(1);
            self.prop_head = std::cmp::min(self.prop_head, self.assignment.trail().len());
        }
    }

    pub fn solve(&mut self) -> Solution {
        self.solve_until(|| false)
    }

    /// Runs the search, polling `should_stop` every few decisions.
    /// Returns [`Solution::Unknown`] once it reports `true`.
    pub fn solve_until(&mut self, mut should_stop: impl FnMut() -> bool) -> Solution {
        if should_stop() {
            return Solution::Unknown;
        }

        for (i, clause) in self.clauses.iter().enumerate() {
            match clause[..] {
                [] => return Solution::Unsat,
                [lit] => match self.assignment.eval(lit) {
                    None => self
                        .assignment
                        .set(lit, Reason::Propagation { i_clause: i }),
                    Some(false) => return Solution::Unsat,
                    Some(true) => (),
                },
                _ => (),
            }
        }

        if self.propagate().is_some() {
            return Solution::Unsat;
        }

        while let Some(var) = self.chooser.choose(&self.assignment) {
            self.decisions += 1;
            if self.decisions % POLL_DECISIONS == 0 && should_stop() {
                return Solution::Unknown;
            }

            let lit = if self.phase[var] { var as Lit } else { -(var as Lit) };
            self.assignment.decide(lit);

            while let Some(i_conflict) = self.propagate() {
                self.conflicts += 1;

                let (learnt, level) = self.analyze(i_conflict);

                if level == 0 {
                    return Solution::Unsat;
                }
                self.assignment.backtrack(level);
                self.prop_head = std::cmp::min(self.prop_head, self.assignment.trail().len());

                let lit_assert = learnt[0];
                let i_clause = self.add(learnt);
                self.assignment
                    .set(lit_assert, Reason::Propagation { i_clause });
            }

            let learnt_count = self.clauses.len() - self.min_clause_count;
            let removable = learnt_count.saturating_sub(self.assignment.trail().len());
            if removable > self.max_learnt as usize {
                self.prune();
                self.max_learnt *= 1.001;
            }

            if self
                .restart_threshold
                .peek()
                .is_some_and(|&threshold| self.conflicts >= threshold)
            {
                self.restart();
            }
        }

        let model: Vec<Lit> = self.assignment.trail().to_vec();
        Solution::Sat { model }
    }
}

pub fn verify(problem: &Problem, sat: bool, solution: &Solution) -> bool {
    match solution {
        Solution::Sat { model } => {
            if sat {
                let mut sorted = model.to_vec();
                sorted.sort();
                problem
                    .clauses
                    .iter()
                    .all(|clause| clause.iter().any(|lit| sorted.binary_search(lit).is_ok()))
            } else {
                false
            }
        }
        Solution::Unsat => !sat,
        Solution::Unknown => false,
    }
}

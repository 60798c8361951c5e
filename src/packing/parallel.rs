use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};

use log::{debug, warn};
use parking_lot::Mutex;

use super::{PackingSolver, SharedSolver};
use crate::{
    error::{PackingError, Result},
    model::Instance,
    pool,
    result::SolverResult,
    termination::{Interruptible, TerminationCriterion},
};

pub type SolverFactory = Box<dyn Fn() -> SharedSolver + Send + Sync>;

/// One strategy and the instances built for it. An instance serves one solve
/// at a time, so concurrent races never interrupt each other's solvers.
struct Strategy {
    factory: SolverFactory,
    idle: Mutex<Vec<SharedSolver>>,
    built: Mutex<Vec<SharedSolver>>,
}

impl Strategy {
    fn new(factory: SolverFactory) -> Self {
        let first = factory();
        Self {
            factory,
            idle: Mutex::new(vec![first.clone()]),
            built: Mutex::new(vec![first]),
        }
    }

    fn checkout(&self) -> SharedSolver {
        if let Some(solver) = self.idle.lock().pop() {
            return solver;
        }
        let solver = (self.factory)();
        self.built.lock().push(solver.clone());
        solver
    }

    fn checkin(&self, solver: SharedSolver) {
        self.idle.lock().push(solver);
    }
}

/// Solvers checked out by one `solve` call.
type Race = Arc<Mutex<Vec<SharedSolver>>>;

fn interrupt_all(race: &Race) {
    for solver in race.lock().iter() {
        solver.interrupt();
    }
}

/// Races its strategies on a pool of worker threads.
///
/// The first conclusive answer wins and every other strategy in flight for
/// the same call is interrupted. All workers are joined before returning.
/// Strategies not yet started when the race is decided are skipped; without a
/// conclusive answer each strategy runs exactly once and the result is TIMEOUT.
pub struct ParallelComposite {
    threads: usize,
    strategies: Vec<Strategy>,
    races: Mutex<Vec<Race>>,
}

impl ParallelComposite {
    pub fn new(threads: usize, factories: Vec<SolverFactory>) -> Self {
        Self {
            threads: threads.max(1),
            strategies: factories.into_iter().map(Strategy::new).collect(),
            races: Mutex::new(vec![]),
        }
    }

    fn run_strategy(
        &self,
        i: usize,
        instance: &Instance,
        race: &Interruptible,
        active: &Race,
        seed: u64,
    ) -> Result<Option<SolverResult>> {
        let strategy = &self.strategies[i];
        let solver = strategy.checkout();
        active.lock().push(solver.clone());

        let result = panic::catch_unwind(AssertUnwindSafe(|| solver.solve(instance, race, seed)))
            .unwrap_or_else(|panic| Err(PackingError::Worker(pool::panic_message(&*panic))));

        active.lock().retain(|s| !Arc::ptr_eq(s, &solver));
        strategy.checkin(solver);

        match result {
            Ok(result) if result.is_conclusive() && race.interrupt() => {
                debug!("strategy {i} won with {:?}", result.kind());
                interrupt_all(active);
                Ok(Some(result))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                warn!("strategy {i} failed: {e}");
                race.interrupt();
                interrupt_all(active);
                Err(e)
            }
        }
    }
}

impl PackingSolver for ParallelComposite {
    fn solve(
        &self,
        instance: &Instance,
        termination: &dyn TerminationCriterion,
        seed: u64,
    ) -> Result<SolverResult> {
        let watch = Instant::now();
        if termination.has_to_stop() {
            return Ok(SolverResult::timeout(watch.elapsed()));
        }

        let race = Interruptible::new(termination);
        let active: Race = Arc::new(Mutex::new(vec![]));
        self.races.lock().push(active.clone());
        let winner: Mutex<Option<SolverResult>> = Mutex::new(None);

        let run = pool::run(self.threads, self.strategies.len(), |i| {
            if race.is_interrupted() {
                return Ok(());
            }
            if let Some(result) = self.run_strategy(i, instance, &race, &active, seed)? {
                *winner.lock() = Some(result);
            }
            Ok(())
        });
        self.races.lock().retain(|r| !Arc::ptr_eq(r, &active));
        run?;

        Ok(match winner.into_inner() {
            Some(result) => result.with_runtime(watch.elapsed()),
            None => SolverResult::timeout(watch.elapsed()),
        })
    }

    fn interrupt(&self) {
        for race in self.races.lock().iter() {
            interrupt_all(race);
        }
    }

    fn shutdown(&self) {
        for strategy in &self.strategies {
            for solver in strategy.built.lock().iter() {
                solver.shutdown();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{atomic::Ordering, Arc},
        time::{Duration, Instant},
    };

    use test_log::test;

    use super::{ParallelComposite, SolverFactory};
    use crate::{
        error::PackingError,
        packing::{
            testing::{Failing, Fixed, Looper, Slow},
            PackingSolver, SharedSolver,
        },
        model::{domains, Instance, StationChannels},
        result::SatResult,
        termination::NeverEnding,
    };

    fn shared(solver: SharedSolver) -> SolverFactory {
        Box::new(move || solver.clone())
    }

    #[test]
    fn timeouts_query_every_strategy_once() {
        let solvers: Vec<Arc<Fixed>> = (0..10)
            .map(|_| Arc::new(Fixed::new(SatResult::Timeout)))
            .collect();
        let composite = ParallelComposite::new(
            1,
            solvers.iter().map(|s| shared(s.clone())).collect(),
        );

        let result = composite.solve(&Fixed::instance(), &NeverEnding, 0).unwrap();
        assert_eq!(result.kind(), SatResult::Timeout);
        assert_eq!(solvers.iter().map(|s| s.calls()).sum::<usize>(), 10);
        assert!(solvers.iter().all(|s| s.calls() == 1));
    }

    #[test]
    fn first_conclusive_answer_interrupts_the_rest() {
        let loopers: Vec<Arc<Looper>> = (0..10).map(|_| Arc::new(Looper::default())).collect();
        let mut factories: Vec<SolverFactory> =
            loopers.iter().map(|l| shared(l.clone())).collect();
        factories.push(shared(Arc::new(Fixed::new(SatResult::Sat))));
        let composite = ParallelComposite::new(11, factories);

        let watch = Instant::now();
        let result = composite.solve(&Fixed::instance(), &NeverEnding, 0).unwrap();
        assert!(watch.elapsed() < Duration::from_secs(3));
        assert_eq!(result.kind(), SatResult::Sat);
        // a looper picked up after the win is skipped altogether
        assert!(loopers
            .iter()
            .all(|l| !l.started.load(Ordering::SeqCst) || l.stopped.load(Ordering::SeqCst)));
    }

    #[test]
    fn later_strategies_are_skipped_after_a_win() {
        let sat = Arc::new(Fixed::new(SatResult::Sat));
        let late = Arc::new(Fixed::new(SatResult::Unsat));
        let composite = ParallelComposite::new(1, vec![shared(sat.clone()), shared(late.clone())]);
        let result = composite.solve(&Fixed::instance(), &NeverEnding, 0).unwrap();
        assert_eq!(result.kind(), SatResult::Sat);
        assert_eq!(late.calls(), 0);
    }

    #[test]
    fn failures_reach_the_caller() {
        for panics in [false, true] {
            let composite = ParallelComposite::new(
                2,
                vec![
                    shared(Arc::new(Looper::default())),
                    shared(Arc::new(Failing { panics })),
                ],
            );
            let err = composite.solve(&Fixed::instance(), &NeverEnding, 0);
            assert!(matches!(err, Err(PackingError::Worker(_))));
        }
    }

    #[test]
    fn concurrent_races_use_separate_instances() {
        let built = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let factory: SolverFactory = {
            let built = built.clone();
            Box::new(move || -> SharedSolver {
                built.fetch_add(1, Ordering::SeqCst);
                Arc::new(Fixed::new(SatResult::Sat))
            })
        };
        let composite = ParallelComposite::new(1, vec![factory]);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let result = composite.solve(&Fixed::instance(), &NeverEnding, 0).unwrap();
                    assert_eq!(result.kind(), SatResult::Sat);
                });
            }
        });
        assert!(built.load(Ordering::SeqCst) >= 1);
        composite.shutdown();
    }

    #[test]
    fn overlapping_races_keep_their_own_solvers() {
        let factory: SolverFactory = Box::new(|| -> SharedSolver { Arc::new(Slow::default()) });
        let composite = ParallelComposite::new(2, vec![factory]);
        let slow = Instance::new(domains(&[(9, &[14])]), StationChannels::new()).unwrap();

        std::thread::scope(|scope| {
            let first = scope.spawn(|| composite.solve(&slow, &NeverEnding, 0).unwrap());
            std::thread::sleep(Duration::from_millis(100));
            let second = composite.solve(&Fixed::instance(), &NeverEnding, 0).unwrap();
            assert_eq!(second.kind(), SatResult::Sat);
            // the win above must not reach the solver still working on the first race
            assert_eq!(first.join().unwrap().kind(), SatResult::Sat);
        });
    }

    #[test]
    fn interrupt_reaches_every_race() {
        let factory: SolverFactory = Box::new(|| -> SharedSolver { Arc::new(Slow::default()) });
        let composite = Arc::new(ParallelComposite::new(2, vec![factory]));
        let slow = Instance::new(domains(&[(9, &[14])]), StationChannels::new()).unwrap();
        let handle = {
            let composite = composite.clone();
            std::thread::spawn(move || composite.solve(&slow, &NeverEnding, 0).unwrap())
        };
        while !handle.is_finished() {
            std::thread::sleep(Duration::from_millis(20));
            composite.interrupt();
        }
        assert_eq!(handle.join().unwrap().kind(), SatResult::Timeout);
    }
}

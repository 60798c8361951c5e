//! Scripted solvers for exercising composites.

use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
    time::{Duration, Instant},
};

use super::PackingSolver;
use crate::{
    error::{PackingError, Result},
    model::{domains, to_assignment, Assignment, Instance, Station, StationChannels},
    result::{Outcome, SatResult, SolvedBy, SolverResult},
    termination::TerminationCriterion,
};

/// Every station on its lowest channel.
fn lowest_channels(instance: &Instance) -> Assignment {
    let channels: StationChannels = instance
        .domains()
        .iter()
        .map(|(&s, d)| (s, *d.first().unwrap()))
        .collect();
    to_assignment(&channels)
}

/// Answers a fixed result kind; SAT puts every station on its lowest channel.
pub struct Fixed {
    kind: SatResult,
    calls: AtomicUsize,
}

impl Fixed {
    pub fn new(kind: SatResult) -> Self {
        Self {
            kind,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn instance() -> Instance {
        Instance::new(domains(&[(1, &[14, 15]), (2, &[15])]), StationChannels::new()).unwrap()
    }
}

impl PackingSolver for Fixed {
    fn solve(
        &self,
        instance: &Instance,
        _termination: &dyn TerminationCriterion,
        _seed: u64,
    ) -> Result<SolverResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = match self.kind {
            SatResult::Sat => Outcome::Sat(lowest_channels(instance)),
            SatResult::Unsat => Outcome::Unsat,
            SatResult::Timeout => Outcome::Timeout,
            SatResult::Crashed => Outcome::Crashed,
            SatResult::Interrupted => Outcome::Interrupted,
        };
        Ok(SolverResult::new(outcome, Duration::from_millis(1), SolvedBy::SatEngine))
    }
}

/// Spins until its termination criterion asks it to stop.
#[derive(Default)]
pub struct Looper {
    pub started: AtomicBool,
    pub stopped: AtomicBool,
}

impl PackingSolver for Looper {
    fn solve(
        &self,
        _instance: &Instance,
        termination: &dyn TerminationCriterion,
        _seed: u64,
    ) -> Result<SolverResult> {
        self.started.store(true, Ordering::SeqCst);
        while !termination.has_to_stop() {
            thread::sleep(Duration::from_millis(5));
        }
        self.stopped.store(true, Ordering::SeqCst);
        Ok(SolverResult::new(Outcome::Interrupted, Duration::ZERO, SolvedBy::Unknown))
    }
}

/// Answers SAT at once when station 1 is present. Anything else takes
/// 400 ms, cut short only by its own `interrupt`.
#[derive(Default)]
pub struct Slow {
    interrupted: AtomicBool,
}

impl PackingSolver for Slow {
    fn solve(
        &self,
        instance: &Instance,
        _termination: &dyn TerminationCriterion,
        _seed: u64,
    ) -> Result<SolverResult> {
        self.interrupted.store(false, Ordering::SeqCst);
        if !instance.contains(Station(1)) {
            let deadline = Instant::now() + Duration::from_millis(400);
            while Instant::now() < deadline {
                if self.interrupted.load(Ordering::SeqCst) {
                    return Ok(SolverResult::new(
                        Outcome::Interrupted,
                        Duration::ZERO,
                        SolvedBy::Unknown,
                    ));
                }
                thread::sleep(Duration::from_millis(5));
            }
        }
        Ok(SolverResult::sat(lowest_channels(instance), Duration::ZERO, SolvedBy::SatEngine))
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

pub struct Failing {
    pub panics: bool,
}

impl PackingSolver for Failing {
    fn solve(
        &self,
        _instance: &Instance,
        _termination: &dyn TerminationCriterion,
        _seed: u64,
    ) -> Result<SolverResult> {
        if self.panics {
            panic!("strategy blew up");
        }
        Err(PackingError::Worker("strategy failed".to_string()))
    }
}

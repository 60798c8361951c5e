//! Cooperative stopping conditions shared by every solving strategy.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

pub trait TerminationCriterion: Send + Sync {
    fn remaining_time(&self) -> Duration;

    fn has_to_stop(&self) -> bool;
}

/// Never asks to stop.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverEnding;

impl TerminationCriterion for NeverEnding {
    fn remaining_time(&self) -> Duration {
        Duration::MAX
    }

    fn has_to_stop(&self) -> bool {
        false
    }
}

/// Stops once a wall-clock budget, counted from construction, is spent.
#[derive(Clone, Copy, Debug)]
pub struct WallClock {
    deadline: Option<Instant>,
}

impl WallClock {
    pub fn new(budget: Duration) -> Self {
        Self {
            // an unrepresentable deadline never arrives
            deadline: Instant::now().checked_add(budget),
        }
    }
}

impl TerminationCriterion for WallClock {
    fn remaining_time(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    fn has_to_stop(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Wraps a criterion with a one-shot interrupt.
pub struct Interruptible<'a> {
    inner: &'a dyn TerminationCriterion,
    interrupted: AtomicBool,
}

impl<'a> Interruptible<'a> {
    pub fn new(inner: &'a dyn TerminationCriterion) -> Self {
        Self {
            inner,
            interrupted: AtomicBool::new(false),
        }
    }

    /// Returns `true` only for the caller that actually performed the interrupt.
    pub fn interrupt(&self) -> bool {
        self.interrupted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }
}

impl TerminationCriterion for Interruptible<'_> {
    fn remaining_time(&self) -> Duration {
        if self.is_interrupted() {
            Duration::ZERO
        } else {
            self.inner.remaining_time()
        }
    }

    fn has_to_stop(&self) -> bool {
        self.is_interrupted() || self.inner.has_to_stop()
    }
}

/// Stops as soon as any of its members stops.
pub struct Disjunctive<'a> {
    criteria: Vec<&'a dyn TerminationCriterion>,
}

impl<'a> Disjunctive<'a> {
    pub fn new(criteria: Vec<&'a dyn TerminationCriterion>) -> Self {
        Self { criteria }
    }
}

impl TerminationCriterion for Disjunctive<'_> {
    fn remaining_time(&self) -> Duration {
        self.criteria
            .iter()
            .map(|c| c.remaining_time())
            .min()
            .unwrap_or(Duration::MAX)
    }

    fn has_to_stop(&self) -> bool {
        self.criteria.iter().any(|c| c.has_to_stop())
    }
}

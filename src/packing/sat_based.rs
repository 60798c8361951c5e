use std::time::Instant;

use log::debug;

use super::PackingSolver;
use crate::{
    encoder::{Encoding, SatEncoder},
    error::Result,
    model::Instance,
    result::{Outcome, SatResult, SolvedBy, SolverResult},
    sat::SatSolver,
    termination::TerminationCriterion,
};

/// Encodes the instance, runs a SAT engine and decodes its model.
pub struct SatBasedSolver {
    encoder: SatEncoder,
    engine: Box<dyn SatSolver>,
}

impl SatBasedSolver {
    pub fn new(encoder: SatEncoder, engine: Box<dyn SatSolver>) -> Self {
        Self { encoder, engine }
    }
}

impl PackingSolver for SatBasedSolver {
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

        let Encoding {
            cnf,
            decoder,
            hints,
        } = self.encoder.encode(instance);
        let result = self
            .engine
            .solve_with_hints(&cnf, &hints, termination, seed);
        debug!(
            "engine answered {:?} on {} stations in {:?}",
            result.result,
            instance.len(),
            result.runtime
        );

        let outcome = match result.result {
            SatResult::Sat => Outcome::Sat(decoder.decode_model(&result.model)?),
            SatResult::Unsat => Outcome::Unsat,
            SatResult::Timeout => Outcome::Timeout,
            SatResult::Crashed => Outcome::Crashed,
            SatResult::Interrupted => Outcome::Interrupted,
        };
        Ok(SolverResult::new(outcome, watch.elapsed(), SolvedBy::SatEngine))
    }

    fn interrupt(&self) {
        self.engine.interrupt();
    }

    fn shutdown(&self) {
        self.engine.shutdown();
    }
}

use std::time::Instant;

use log::debug;

use super::{PackingSolver, SharedSolver};
use crate::{
    error::Result, model::Instance, result::SolverResult, termination::TerminationCriterion,
};

/// Tries its stages in order and stops at the first conclusive answer.
pub struct SequentialComposite {
    stages: Vec<SharedSolver>,
}

impl SequentialComposite {
    pub fn new(stages: Vec<SharedSolver>) -> Self {
        Self { stages }
    }
}

impl PackingSolver for SequentialComposite {
    fn solve(
        &self,
        instance: &Instance,
        termination: &dyn TerminationCriterion,
        seed: u64,
    ) -> Result<SolverResult> {
        let watch = Instant::now();
        let mut last = None;

        for (i, stage) in self.stages.iter().enumerate() {
            if termination.has_to_stop() {
                debug!("out of time before stage {i}");
                return Ok(SolverResult::timeout(watch.elapsed()));
            }
            let result = stage.solve(instance, termination, seed)?;
            if result.is_conclusive() {
                debug!("stage {i} answered {:?}", result.kind());
                return Ok(result.with_runtime(watch.elapsed()));
            }
            last = Some(result);
        }

        Ok(match last {
            Some(result) => result.with_runtime(watch.elapsed()),
            None => SolverResult::timeout(watch.elapsed()),
        })
    }

    fn interrupt(&self) {
        for stage in &self.stages {
            stage.interrupt();
        }
    }

    fn shutdown(&self) {
        for stage in &self.stages {
            stage.shutdown();
        }
    }
}

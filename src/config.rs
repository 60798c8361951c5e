//! Solver configuration, read from JSON.

use std::{fs, path::Path, thread, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::{PackingError, Result},
    packing::NeighbourhoodPresolver,
    sat::{CdclSatSolver, ProcessSatSolver, SatSolver},
};

/// Which SAT engine a pipeline runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EngineConfig {
    Cdcl {
        luby_base: usize,
    },
    Process {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_poll_interval_ms")]
        poll_interval_ms: u64,
    },
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl EngineConfig {
    pub fn build(&self) -> Box<dyn SatSolver> {
        match self {
            EngineConfig::Cdcl { luby_base } => Box::new(CdclSatSolver::new(*luby_base)),
            EngineConfig::Process {
                command,
                args,
                poll_interval_ms,
            } => Box::new(ProcessSatSolver::new(
                command.clone(),
                args.clone(),
                Duration::from_millis(*poll_interval_ms),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    /// Race strategies on a thread pool instead of running a fixed sequence.
    pub parallel: bool,
    pub threads: usize,
    pub presolve: bool,
    /// Split instances into interference components.
    pub decompose: bool,
    pub component_threads: usize,
    /// Keep solving components after one fails.
    pub solve_everything: bool,
    pub underconstrained: bool,
    pub expensive_underconstrained: bool,
    pub recursive_underconstrained: bool,
    /// Prune channels that no neighbour can support before decomposing.
    pub arc_consistency: bool,
    pub cache: bool,
    pub containment_cache: bool,
    pub certifier_cutoff_secs: f64,
    pub min_time_to_cache_secs: f64,
    pub max_missing_stations: usize,
    pub max_to_pack: usize,
    pub uhf: EngineConfig,
    pub vhf: EngineConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            threads: thread::available_parallelism().map_or(1, |n| n.get()),
            presolve: true,
            decompose: true,
            component_threads: 1,
            solve_everything: false,
            underconstrained: true,
            expensive_underconstrained: false,
            recursive_underconstrained: true,
            arc_consistency: true,
            cache: true,
            containment_cache: true,
            certifier_cutoff_secs: 5.0,
            min_time_to_cache_secs: 0.0,
            max_missing_stations: NeighbourhoodPresolver::MAX_MISSING_STATIONS,
            max_to_pack: NeighbourhoodPresolver::MAX_TO_PACK,
            uhf: EngineConfig::Cdcl { luby_base: 32 },
            vhf: EngineConfig::Cdcl { luby_base: 16 },
        }
    }
}

impl SolverConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 || self.component_threads == 0 {
            return Err(PackingError::Config("thread counts must be positive".to_string()));
        }
        for (name, secs) in [
            ("certifier_cutoff_secs", self.certifier_cutoff_secs),
            ("min_time_to_cache_secs", self.min_time_to_cache_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(PackingError::Config(format!(
                    "{name} must be a non-negative number of seconds, got {secs}"
                )));
            }
        }
        if self.max_to_pack < self.max_missing_stations {
            return Err(PackingError::Config(
                "max_to_pack cannot be below max_missing_stations".to_string(),
            ));
        }
        for engine in [&self.uhf, &self.vhf] {
            match engine {
                EngineConfig::Cdcl { luby_base: 0 } => {
                    return Err(PackingError::Config("luby_base must be positive".to_string()))
                }
                EngineConfig::Process { command, .. } if command.is_empty() => {
                    return Err(PackingError::Config("process engine needs a command".to_string()))
                }
                _ => (),
            }
        }
        Ok(())
    }

    pub fn certifier_cutoff(&self) -> Duration {
        Duration::from_secs_f64(self.certifier_cutoff_secs)
    }

    pub fn min_time_to_cache(&self) -> Duration {
        Duration::from_secs_f64(self.min_time_to_cache_secs)
    }
}

//! Entry point for packing queries: builds the per-band solver pipelines
//! from a [`SolverConfig`] and routes each query to one of them.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use log::{debug, info};

use crate::{
    cache::ResultCache,
    config::{EngineConfig, SolverConfig},
    constraint::ConstraintManager,
    data::DataBundle,
    encoder::SatEncoder,
    error::Result,
    model::{Band, Channel, Instance, StationChannels},
    packing::{
        ArcConsistency, AssignmentVerifier, CachingSolver, CertifierKind, ComponentGrouping,
        ContainmentCacheSolver, NeighbourhoodPresolver, ParallelComposite,
        PreviousAssignmentSolver, SatBasedSolver, SequentialComposite, SharedSolver,
        SolverFactory, SubsetCertifier, UnderconstrainedRemover,
    },
    result::{SolvedBy, SolverResult},
    termination::WallClock,
};

/// One packing question against the loaded data.
#[derive(Clone, Debug)]
pub struct Query {
    pub stations: Vec<u32>,
    pub channels: BTreeSet<Channel>,
    pub previous: BTreeMap<u32, Channel>,
    pub cutoff: Duration,
    pub seed: u64,
    pub name: Option<String>,
}

/// Everything a pipeline needs, cheap to clone into strategy factories.
#[derive(Clone)]
struct Parts {
    constraints: Arc<ConstraintManager>,
    engine: EngineConfig,
    config: SolverConfig,
}

impl Parts {
    fn engine(&self) -> SharedSolver {
        Arc::new(SatBasedSolver::new(
            SatEncoder::new(self.constraints.clone()),
            self.engine.build(),
        ))
    }

    /// The engine behind underconstrained removal and component splitting.
    fn core(&self) -> SharedSolver {
        let mut core = self.engine();
        if self.config.decompose {
            core = Arc::new(ComponentGrouping::new(
                core,
                self.constraints.clone(),
                self.config.component_threads,
                self.config.solve_everything,
            ));
        }
        if self.config.underconstrained {
            core = Arc::new(UnderconstrainedRemover::new(
                core,
                self.constraints.clone(),
                self.config.expensive_underconstrained,
                self.config.recursive_underconstrained,
            ));
        }
        if self.config.arc_consistency {
            core = Arc::new(ArcConsistency::new(core, self.constraints.clone()));
        }
        core
    }

    fn presolvers(&self) -> Vec<SharedSolver> {
        let cutoff = self.config.certifier_cutoff();
        let previous: SharedSolver =
            Arc::new(PreviousAssignmentSolver::new(self.constraints.clone()));
        let neighbourhood: SharedSolver = Arc::new(NeighbourhoodPresolver::new(
            self.constraints.clone(),
            vec![
                SubsetCertifier::new(CertifierKind::Sat, self.engine(), cutoff),
                SubsetCertifier::new(CertifierKind::Unsat, self.engine(), cutoff),
            ],
            self.config.max_missing_stations,
            self.config.max_to_pack,
        ));
        vec![previous, neighbourhood]
    }
}

fn pipeline(
    bundle: &DataBundle,
    config: &SolverConfig,
    engine: &EngineConfig,
    cache: Option<&Arc<ResultCache>>,
) -> SharedSolver {
    let parts = Parts {
        constraints: bundle.constraints.clone(),
        engine: engine.clone(),
        config: config.clone(),
    };
    let containment = cache
        .filter(|_| config.containment_cache)
        .map(|cache| -> SharedSolver {
            Arc::new(ContainmentCacheSolver::new(
                cache.clone(),
                bundle.coordinate.clone(),
            ))
        });

    let solver: SharedSolver = if config.parallel {
        let mut factories: Vec<SolverFactory> = vec![];
        if let Some(containment) = containment {
            factories.push(Box::new(move || containment.clone()));
        }
        if config.presolve {
            let parts = parts.clone();
            factories.push(Box::new(move || -> SharedSolver {
                Arc::new(SequentialComposite::new(parts.presolvers()))
            }));
        }
        {
            let parts = parts.clone();
            factories.push(Box::new(move || parts.core()));
        }
        factories.push(Box::new(move || parts.engine()));
        Arc::new(ParallelComposite::new(config.threads, factories))
    } else {
        let mut stages: Vec<SharedSolver> = containment.into_iter().collect();
        if config.presolve {
            stages.extend(parts.presolvers());
        }
        stages.push(parts.core());
        Arc::new(SequentialComposite::new(stages))
    };

    let verified: SharedSolver = Arc::new(AssignmentVerifier::new(
        solver,
        bundle.constraints.clone(),
    ));
    match cache {
        Some(cache) => Arc::new(CachingSolver::new(
            verified,
            cache.clone(),
            bundle.coordinate.clone(),
            bundle.constraints.clone(),
            config.min_time_to_cache(),
        )),
        None => verified,
    }
}

/// Answers packing queries for one data directory.
pub struct PackingFacade {
    bundle: Arc<DataBundle>,
    uhf: SharedSolver,
    vhf: SharedSolver,
    closed: AtomicBool,
}

impl PackingFacade {
    pub fn new(
        bundle: Arc<DataBundle>,
        config: &SolverConfig,
        cache: Option<Arc<ResultCache>>,
    ) -> Result<Self> {
        config.validate()?;
        let cache = cache.filter(|_| config.cache);
        debug!(
            "building {} pipelines, cache {}",
            if config.parallel { "parallel" } else { "sequential" },
            if cache.is_some() { "on" } else { "off" }
        );
        Ok(Self {
            uhf: pipeline(&bundle, config, &config.uhf, cache.as_ref()),
            vhf: pipeline(&bundle, config, &config.vhf, cache.as_ref()),
            bundle,
            closed: AtomicBool::new(false),
        })
    }

    pub fn bundle(&self) -> &DataBundle {
        &self.bundle
    }

    /// The instance a query describes, with domains cut to the query channels.
    pub fn instance(&self, query: &Query) -> Result<Instance> {
        let stations = &self.bundle.stations;
        let domains = stations.restricted_domains(&query.stations, &query.channels)?;
        let previous = query
            .previous
            .iter()
            .map(|(&id, &channel)| Ok((stations.get_station(id)?, channel)))
            .collect::<Result<StationChannels>>()?;
        let instance = Instance::new(domains, previous)?;
        Ok(match &query.name {
            Some(name) => instance.with_name(name.clone()),
            None => instance,
        })
    }

    pub fn solve(&self, query: &Query) -> Result<SolverResult> {
        let watch = Instant::now();
        let instance = self.instance(query)?;
        if instance.is_empty() {
            return Ok(SolverResult::sat(
                Default::default(),
                watch.elapsed(),
                SolvedBy::Trivial,
            ));
        }

        let (band, pipeline) = if Band::is_vhf(&query.channels) {
            ("VHF", &self.vhf)
        } else {
            ("UHF", &self.uhf)
        };
        info!(
            "solving {} ({} stations, {band}) with a {:?} cutoff",
            instance.name(),
            instance.len(),
            query.cutoff
        );
        let termination = WallClock::new(query.cutoff);
        let result = pipeline.solve(&instance, &termination, query.seed)?;
        info!(
            "{} is {:?}, solved by {:?}",
            instance.name(),
            result.kind(),
            result.solved_by
        );
        Ok(result.with_runtime(watch.elapsed()))
    }

    /// Shuts down every engine. Later solves come back CRASHED unless cached.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down solvers");
        self.uhf.shutdown();
        self.vhf.shutdown();
    }
}

impl Drop for PackingFacade {
    fn drop(&mut self) {
        self.close();
    }
}

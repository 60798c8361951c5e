use std::{
    collections::BTreeMap,
    fs::File,
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use log::{error, info};
use serde::Serialize;

use station_packing::{
    cache::{MemoryStore, ResultCache},
    config::SolverConfig,
    data::DataBundle,
    error::{PackingError, Result},
    facade::{PackingFacade, Query},
    io,
    model::{station_channels, Channel},
    result::{SatResult, SolvedBy},
    solver::{self, Options, Solver},
    termination::{TerminationCriterion, WallClock},
    types::Solution,
};

#[derive(Parser, Debug)]
#[command(version, about = "Decides whether TV stations can be packed into a set of channels")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Solve one packing query against a data directory
    Solve(SolveArgs),
    /// Solve a DIMACS CNF file and print the result in competition format
    Dimacs {
        file: PathBuf,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<f64>,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

#[derive(Args, Debug)]
struct SolveArgs {
    /// Directory holding Domain.csv and Interference_Paired.csv
    #[arg(long)]
    data: PathBuf,
    #[arg(long, value_delimiter = ',', required = true)]
    stations: Vec<u32>,
    #[arg(long, value_delimiter = ',', required = true)]
    channels: Vec<Channel>,
    /// Previous assignment as station:channel pairs
    #[arg(long, value_delimiter = ',', value_parser = parse_previous)]
    previous: Vec<(u32, Channel)>,
    /// Cutoff in seconds
    #[arg(long, default_value_t = 60.0)]
    cutoff: f64,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long)]
    name: Option<String>,
    /// JSON solver configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON cache snapshot, read before and written after solving
    #[arg(long)]
    cache_file: Option<PathBuf>,
}

fn parse_previous(s: &str) -> std::result::Result<(u32, Channel), String> {
    let (station, channel) = s
        .split_once(':')
        .ok_or_else(|| format!("expected station:channel, got {s:?}"))?;
    let station = station.trim().parse().map_err(|e| format!("{station:?}: {e}"))?;
    let channel = channel.trim().parse().map_err(|e| format!("{channel:?}: {e}"))?;
    Ok((station, channel))
}

fn seconds(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| PackingError::Config(format!("bad duration {secs}: {e}")))
}

#[derive(Serialize)]
struct Report {
    result: SatResult,
    runtime_secs: f64,
    solved_by: SolvedBy,
    #[serde(skip_serializing_if = "Option::is_none")]
    assignment: Option<BTreeMap<u32, Channel>>,
}

fn solve(args: SolveArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => SolverConfig::from_path(path)?,
        None => SolverConfig::default(),
    };
    let bundle = Arc::new(DataBundle::load(&args.data)?);

    let store = match &args.cache_file {
        Some(path) if path.exists() => Arc::new(MemoryStore::load(path)?),
        _ => Arc::new(MemoryStore::new()),
    };
    let cache = Arc::new(ResultCache::new(store.clone()));

    let facade = PackingFacade::new(bundle, &config, Some(cache))?;
    let query = Query {
        stations: args.stations,
        channels: args.channels.into_iter().collect(),
        previous: args.previous.into_iter().collect(),
        cutoff: seconds(args.cutoff)?,
        seed: args.seed,
        name: args.name,
    };
    let result = facade.solve(&query);
    facade.close();
    let result = result?;

    if let Some(path) = &args.cache_file {
        store.save(path)?;
    }

    let assignment = match result.assignment() {
        Some(assignment) => Some(
            station_channels(assignment)?
                .into_iter()
                .map(|(station, channel)| (station.id(), channel))
                .collect(),
        ),
        None => None,
    };
    let report = Report {
        result: result.kind(),
        runtime_secs: result.runtime.as_secs_f64(),
        solved_by: result.solved_by,
        assignment,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn dimacs(file: PathBuf, timeout: Option<f64>, seed: u64) -> Result<()> {
    let problem = io::read_problem(&mut File::open(&file)?)?;
    info!(
        "{}: {} vars, {} clauses",
        file.display(),
        problem.var_count,
        problem.clauses.len()
    );

    let deadline = WallClock::new(match timeout {
        Some(secs) => seconds(secs)?,
        None => Duration::MAX,
    });
    let options = Options {
        seed,
        ..Options::default()
    };
    let solution = Solver::with_options(problem.clone(), options)
        .solve_until(|| deadline.has_to_stop());

    if let Solution::Sat { .. } = solution {
        if !solver::verify(&problem, true, &solution) {
            return Err(PackingError::UnverifiedAssignment(
                "model does not satisfy the formula".to_string(),
            ));
        }
    }
    io::write_solution(&mut std::io::stdout(), &solution)
}

fn main() -> ExitCode {
    env_logger::init();

    let outcome = match Cli::parse().command {
        Command::Solve(args) => solve(args),
        Command::Dimacs {
            file,
            timeout,
            seed,
        } => dimacs(file, timeout, seed),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

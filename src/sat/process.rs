use std::{
    io::Read,
    process::{Child, Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, error, warn};
use parking_lot::Mutex;

use super::{SatSolver, SatSolverResult};
use crate::{
    cnf::{compress, Cnf, Compression},
    error::Result,
    io::{read_solution, write_problem},
    result::SatResult,
    termination::TerminationCriterion,
    types::Solution,
};

/// Runs an external engine that takes a DIMACS file as its last argument and
/// answers in the competition output format.
pub struct ProcessSatSolver {
    command: String,
    args: Vec<String>,
    poll_interval: Duration,
    current: Mutex<Vec<Arc<AtomicBool>>>,
    closed: AtomicBool,
}

enum Exit {
    Finished(String),
    Stopped,
}

impl ProcessSatSolver {
    pub fn new(command: impl Into<String>, args: Vec<String>, poll_interval: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            poll_interval,
            current: Mutex::new(vec![]),
            closed: AtomicBool::new(false),
        }
    }

    fn run(
        &self,
        cnf: &Cnf,
        stop: &AtomicBool,
        termination: &dyn TerminationCriterion,
    ) -> Result<(Exit, Compression)> {
        let (problem, compression) = compress(cnf)?;
        let mut file = tempfile::Builder::new().suffix(".cnf").tempfile()?;
        write_problem(file.as_file_mut(), &problem)?;

        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // own group, so a kill also reaches whatever a wrapper script started
            command.process_group(0);
        }
        let mut child = command.spawn()?;
        debug!("started {} (pid {})", self.command, child.id());

        // drain stdout concurrently so the child never blocks on a full pipe
        let reader = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut output = String::new();
                stdout.read_to_string(&mut output).map(|_| output)
            })
        });

        let exit = loop {
            if child.try_wait()?.is_some() {
                break None;
            }
            if stop.load(Ordering::Relaxed) || termination.has_to_stop() {
                self.kill(&mut child);
                child.wait()?;
                break Some(Exit::Stopped);
            }
            thread::sleep(self.poll_interval.min(termination.remaining_time()));
        };
        if let Some(exit) = exit {
            // the reader is left to finish on its own; a survivor holding the
            // pipe must not delay the answer
            return Ok((exit, compression));
        }

        let output = match reader {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Ok(String::new()))?,
            None => String::new(),
        };
        drop(file);

        Ok((Exit::Finished(output), compression))
    }

    fn kill(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            let group = format!("-{}", child.id());
            match Command::new("kill")
                .args(["-KILL", "--", &group])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
            {
                Ok(status) if status.success() => (),
                Ok(status) => debug!("kill {group} exited with {status}"),
                Err(e) => debug!("could not run kill for group {group}: {e}"),
            }
        }
        if let Err(e) = child.kill() {
            warn!("failed to kill {}: {e}", self.command);
        }
    }
}

impl SatSolver for ProcessSatSolver {
    fn solve(
        &self,
        cnf: &Cnf,
        termination: &dyn TerminationCriterion,
        _seed: u64,
    ) -> SatSolverResult {
        let watch = Instant::now();
        if self.closed.load(Ordering::Acquire) {
            error!("solve called on a shut down engine");
            return SatSolverResult::new(SatResult::Crashed, Duration::ZERO);
        }
        if termination.has_to_stop() {
            return SatSolverResult::new(SatResult::Timeout, Duration::ZERO);
        }

        let stop = Arc::new(AtomicBool::new(false));
        self.current.lock().push(stop.clone());
        let run = self.run(cnf, &stop, termination);
        self.current.lock().retain(|s| !Arc::ptr_eq(s, &stop));
        let runtime = watch.elapsed();

        let crashed = |message: String| {
            error!("{} crashed: {message}", self.command);
            SatSolverResult::new(SatResult::Crashed, runtime)
        };

        match run {
            Err(e) => crashed(e.to_string()),
            Ok((Exit::Stopped, _)) if stop.load(Ordering::Relaxed) => {
                SatSolverResult::new(SatResult::Interrupted, runtime)
            }
            Ok((Exit::Stopped, _)) => SatSolverResult::new(SatResult::Timeout, runtime),
            Ok((Exit::Finished(output), compression)) => {
                match read_solution(&mut output.as_bytes()) {
                    Ok(Some(Solution::Sat { model })) => match compression.decompress(&model) {
                        Ok(model) => SatSolverResult {
                            result: SatResult::Sat,
                            runtime,
                            model,
                        },
                        Err(e) => crashed(e.to_string()),
                    },
                    Ok(Some(Solution::Unsat)) => SatSolverResult::new(SatResult::Unsat, runtime),
                    Ok(Some(Solution::Unknown)) => {
                        SatSolverResult::new(SatResult::Timeout, runtime)
                    }
                    Ok(None) => crashed("no status line in output".to_string()),
                    Err(e) => crashed(e.to_string()),
                }
            }
        }
    }

    fn interrupt(&self) {
        for stop in self.current.lock().iter() {
            stop.store(true, Ordering::Relaxed);
        }
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.interrupt();
    }
}

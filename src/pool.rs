//! Scoped worker pool: `threads` workers pull job indices from a shared cursor.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
};

use parking_lot::Mutex;

use crate::error::{PackingError, Result};

/// Runs `job(0..jobs)` on at most `threads` workers and joins all of them.
///
/// The first error (or panic) stops workers from picking up further jobs and is
/// returned once every worker has finished.
pub fn run<F>(threads: usize, jobs: usize, job: F) -> Result<()>
where
    F: Fn(usize) -> Result<()> + Sync,
{
    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let failure: Mutex<Option<PackingError>> = Mutex::new(None);

    thread::scope(|scope| {
        for _ in 0..threads.clamp(1, jobs.max(1)) {
            scope.spawn(|| loop {
                if failed.load(Ordering::Acquire) {
                    break;
                }
                let i = next.fetch_add(1, Ordering::AcqRel);
                if i >= jobs {
                    break;
                }
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(i)))
                    .unwrap_or_else(|panic| Err(PackingError::Worker(panic_message(&*panic))));
                if let Err(e) = outcome {
                    failed.store(true, Ordering::Release);
                    failure.lock().get_or_insert(e);
                }
            });
        }
    });

    match failure.into_inner() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use test_log::test;

    use super::run;
    use crate::error::PackingError;

    #[test]
    fn every_job_runs_once() {
        let counts: Vec<AtomicUsize> = (0..50).map(|_| AtomicUsize::new(0)).collect();
        run(4, counts.len(), |i| {
            counts[i].fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert!(counts.iter().all(|c| c.load(Ordering::SeqCst) == 1));
        run(3, 0, |_| Ok(())).unwrap();
    }

    #[test]
    fn errors_and_panics_propagate() {
        let err = run(2, 4, |i| match i {
            2 => Err(PackingError::Worker("boom".to_string())),
            _ => Ok(()),
        });
        assert!(matches!(err, Err(PackingError::Worker(m)) if m == "boom"));

        let err = run(1, 2, |i| {
            if i == 1 {
                panic!("job {i} exploded");
            }
            Ok(())
        });
        assert!(matches!(err, Err(PackingError::Worker(m)) if m == "job 1 exploded"));
    }
}

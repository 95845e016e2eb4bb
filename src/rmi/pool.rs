//! A worker pool that grows on demand and reuses idle workers.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

/// how long an idle worker waits for another job before exiting
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A cached worker pool.
///
/// Jobs are handed off over a zero-capacity crossbeam channel, so a send
/// succeeds only when a worker is already parked on the receiving end.
/// [`spawn`] therefore starts a new worker exactly when no idle one exists,
/// and workers that stay idle past [`IDLE_TIMEOUT`] exit on their own. A job
/// that panics takes its worker with it; the next hand-off simply starts a
/// fresh one.
///
/// Dropping the pool disconnects the channel, letting every idle worker
/// exit; busy workers finish their current job first.
///
/// [`spawn`]: #method.spawn
pub struct CachedPool {
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

impl CachedPool {
    /// creates an empty pool; the first job starts the first worker
    pub fn new() -> CachedPool {
        let (tx, rx) = channel::bounded(0);
        CachedPool { tx, rx }
    }

    /// Runs `job` on an idle worker, starting a new worker if all are busy.
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        let job: Job = Box::new(job);
        if let Err(TrySendError::Full(job)) = self.tx.try_send(job) {
            let rx = self.rx.clone();
            if let Err(e) = thread::Builder::new().spawn(move || run_jobs(rx)) {
                error!("failed to start a pool worker: {}", e);
            }
            // hand the job to whichever worker frees up first
            if self.tx.send(job).is_err() {
                error!("worker pool disconnected before the job could run");
            }
        }
    }
}

impl Default for CachedPool {
    fn default() -> Self {
        Self::new()
    }
}

/// waits for jobs on the shared channel and runs them until idle expiry
fn run_jobs(rx: Receiver<Job>) {
    loop {
        match rx.recv_timeout(IDLE_TIMEOUT) {
            Ok(job) => job(),
            Err(RecvTimeoutError::Timeout) => {
                debug!("idle pool worker expiring");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("pool dropped, worker exiting");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn every_spawned_job_runs() {
        let pool = CachedPool::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let count = Arc::clone(&count);
            pool.spawn(move || {
                thread::sleep(Duration::from_millis(10));
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 20 {
            assert!(Instant::now() < deadline, "jobs did not finish in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn a_panicking_job_does_not_poison_the_pool() {
        let pool = CachedPool::new();
        pool.spawn(|| panic!("deliberate"));

        let done = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&done);
        pool.spawn(move || {
            count.fetch_add(1, Ordering::SeqCst);
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while done.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() < deadline, "job after panic never ran");
            thread::sleep(Duration::from_millis(5));
        }
    }
}

use crate::error::{JobError, Result};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Work executed on every tick of a [`JobRunner`], with exclusive access to
/// the runner's state.
pub trait PruneJob<S>: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn run(&self, state: &mut S) -> Result<()>;
}

/// Owns a single piece of mutable state and serializes every access to it,
/// including the periodic job started with [`JobRunner::start`].
pub struct JobRunner<S> {
    state:          Arc<Mutex<S>>,
    prune_interval: Duration,
    running:        Arc<AtomicBool>,
}

impl<S> Clone for JobRunner<S> {
    fn clone(&self) -> Self {
        Self {
            state:          self.state.clone(),
            prune_interval: self.prune_interval,
            running:        self.running.clone(),
        }
    }
}

impl<S: Send + 'static> JobRunner<S> {
    pub fn new(state: S, prune_interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            prune_interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn prune_interval(&self) -> Duration {
        self.prune_interval
    }

    /// Runs `f` against the state once every earlier caller is done with it.
    /// Waiters are served in arrival order.
    pub async fn access<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut S) -> R,
    {
        let mut state = self.state.lock().await;
        f(&mut state)
    }

    /// Runs `job` once, right now, under the same lock as [`Self::access`].
    pub async fn run_now<J: PruneJob<S>>(&self, job: &J) -> Result<()> {
        let mut state = self.state.lock().await;
        run_once(job, &mut *state)
    }

    /// Spawns the periodic loop. The first pass happens one full interval
    /// after this call, and the next tick is only awaited once a pass has
    /// finished.
    pub fn start<J: PruneJob<S>>(&self, job: J) -> Result<JobHandle> {
        if self.prune_interval.is_zero() {
            return Err(JobError::MsgError("prune interval must be non-zero".into()));
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(JobError::AlreadyRunning);
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let state = self.state.clone();
        let running = self.running.clone();
        let period = self.prune_interval;

        let task = tokio::spawn(async move {
            let name = job.name();
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(job = name, interval = ?period, "periodic job started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    // a stop request and a dropped handle both end the loop
                    _ = stop_rx.changed() => break,
                }

                let started = Instant::now();
                let mut guard = state.lock().await;
                match run_once(&job, &mut *guard) {
                    Ok(()) => {
                        debug!(job = name, elapsed = ?started.elapsed(), "periodic job pass complete")
                    }
                    Err(e) => error!(job = name, error = %e, "periodic job pass failed"),
                }
            }

            running.store(false, Ordering::Release);
            info!(job = name, "periodic job stopped");
        });

        Ok(JobHandle {
            stop_tx,
            task: Some(task),
        })
    }
}

fn run_once<S, J: PruneJob<S>>(job: &J, state: &mut S) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(|| job.run(state))) {
        Ok(result) => result,
        Err(payload) => Err(JobError::Panicked(panic_message(payload.as_ref()).into())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Controls a loop spawned by [`JobRunner::start`]. Dropping the handle ends
/// the loop at its next wake-up.
#[derive(Debug)]
pub struct JobHandle {
    stop_tx: watch::Sender<bool>,
    task:    Option<JoinHandle<()>>,
}

impl JobHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signals the loop and waits for it to exit. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = self.stop_tx.send(true);
        if let Err(e) = task.await {
            error!(error = %e, "periodic job task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        runs: Arc<AtomicUsize>,
    }

    impl PruneJob<Vec<u32>> for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn run(&self, state: &mut Vec<u32>) -> Result<()> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            state.push(n as u32);
            Ok(())
        }
    }

    /// Fails every odd pass, panics on the first one.
    struct Flaky {
        runs: Arc<AtomicUsize>,
    }

    impl PruneJob<Vec<u32>> for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn run(&self, _state: &mut Vec<u32>) -> Result<()> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                panic!("first pass blows up");
            }
            if n % 2 == 1 {
                return Err(JobError::MsgError("odd pass".into()));
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn access_serializes_concurrent_callers() {
        let runner = JobRunner::new(0u64, Duration::from_secs(60));
        let mut tasks = Vec::new();
        for _ in 0..64 {
            let runner = runner.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..10 {
                    runner
                        .access(|n| {
                            let seen = *n;
                            std::thread::yield_now();
                            *n = seen + 1;
                        })
                        .await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(runner.access(|n| *n).await, 640);
    }

    #[tokio::test(start_paused = true)]
    async fn job_runs_once_per_interval() {
        let runner = JobRunner::new(Vec::new(), Duration::from_secs(10));
        let runs = Arc::new(AtomicUsize::new(0));
        let mut handle = runner.start(Counting { runs: runs.clone() }).unwrap();
        assert!(handle.is_running());

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(runner.access(|s| s.clone()).await, vec![0, 1, 2]);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failing_job_keeps_its_schedule() {
        let runner = JobRunner::new(Vec::new(), Duration::from_secs(10));
        let runs = Arc::new(AtomicUsize::new(0));
        let mut handle = runner.start(Flaky { runs: runs.clone() }).unwrap();

        time::sleep(Duration::from_secs(45)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 4);
        assert!(handle.is_running());

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_the_loop() {
        let runner = JobRunner::new(Vec::new(), Duration::from_secs(10));
        let runs = Arc::new(AtomicUsize::new(0));
        let mut handle = runner.start(Counting { runs: runs.clone() }).unwrap();

        time::sleep(Duration::from_secs(15)).await;
        handle.stop().await;
        assert!(!handle.is_running());
        handle.stop().await;

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // a stopped runner can be started again
        let mut again = runner.start(Counting { runs: runs.clone() }).unwrap();
        again.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_ends_the_loop() {
        let runner = JobRunner::new(Vec::new(), Duration::from_secs(10));
        let runs = Arc::new(AtomicUsize::new(0));
        drop(runner.start(Counting { runs: runs.clone() }).unwrap());

        time::sleep(Duration::from_secs(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let mut again = runner.start(Counting { runs: runs.clone() }).unwrap();
        time::sleep(Duration::from_secs(15)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        again.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_rejected() {
        let runner = JobRunner::new(Vec::new(), Duration::from_secs(10));
        let runs = Arc::new(AtomicUsize::new(0));
        let mut handle = runner.start(Counting { runs: runs.clone() }).unwrap();

        let err = runner.start(Counting { runs }).unwrap_err();
        assert!(matches!(err, JobError::AlreadyRunning));

        handle.stop().await;
    }

    #[tokio::test]
    async fn run_now_reports_panics() {
        let runner = JobRunner::new(Vec::new(), Duration::from_secs(10));
        let job = Flaky {
            runs: Arc::new(AtomicUsize::new(0)),
        };
        let err = runner.run_now(&job).await.unwrap_err();
        assert!(matches!(err, JobError::Panicked(msg) if msg.as_str() == "first pass blows up"));
        assert!(matches!(runner.run_now(&job).await, Err(JobError::MsgError(_))));
        assert!(runner.run_now(&job).await.is_ok());
    }
}

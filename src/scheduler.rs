use crate::types::{PipelineError, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Body of a scheduled job: a factory producing one future per dispatch.
pub type JobFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct Job {
    func: JobFn,
    interval: Duration,
    /// Completion time of the last successful run. Failures never touch
    /// this.
    last_run: Option<DateTime<Utc>>,
    /// Dispatch time of the last attempt, successful or not. Gating on
    /// it keeps a failing job from retrying every tick; it waits out its
    /// interval like everyone else.
    last_attempt: Option<DateTime<Utc>>,
    /// Set while a dispatch is in flight; the driver skips the job until
    /// it clears, so one job never overlaps itself.
    running: Arc<AtomicBool>,
}

impl Job {
    fn should_run(&self, now: DateTime<Utc>) -> bool {
        let reference = match (self.last_run, self.last_attempt) {
            (None, None) => return true,
            (run, attempt) => run.max(attempt),
        };
        match reference {
            None => true,
            Some(last) => {
                let elapsed = (now - last).to_std().unwrap_or_default();
                elapsed >= self.interval
            }
        }
    }
}

/// Registry of named periodic jobs driven by a fixed-tick loop. Each
/// eligible job is dispatched onto its own task, so a slow job delays
/// neither the tick cadence nor other jobs.
pub struct Scheduler {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    running: Arc<AtomicBool>,
    tick_interval: Duration,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            tick_interval: Duration::from_secs(1),
            driver: Mutex::new(None),
        }
    }

    /// Shortens the driver tick, mainly for tests.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Registers a job. A duplicate name replaces the prior registration;
    /// replacement keeps the prior dispatch's non-reentrancy guard, so
    /// the new body never starts while the old one is still in flight.
    /// With `run_immediately` the job is eligible on the first tick;
    /// otherwise its first run happens one interval after registration.
    pub async fn add_task(
        &self,
        name: impl Into<String>,
        func: JobFn,
        interval: Duration,
        run_immediately: bool,
    ) -> Result<()> {
        if interval.is_zero() {
            return Err(PipelineError::Config("job interval must be positive".to_string()));
        }

        let name = name.into();
        info!("registering job: {} (interval {:?})", name, interval);

        let mut job = Job {
            func,
            interval,
            last_run: None,
            last_attempt: if run_immediately { None } else { Some(Utc::now()) },
            running: Arc::new(AtomicBool::new(false)),
        };

        let mut jobs = self.jobs.write().await;
        if let Some(prior) = jobs.get(&name) {
            // Keep the in-flight guard so an execution of the replaced
            // body still serializes against the new one.
            job.running = Arc::clone(&prior.running);
            debug!("job {} replaced an existing registration", name);
        }
        jobs.insert(name, job);
        Ok(())
    }

    /// Deregisters a job; no-op if absent. An in-flight execution runs to
    /// completion.
    pub async fn remove_task(&self, name: &str) -> bool {
        let removed = self.jobs.write().await.remove(name).is_some();
        if removed {
            info!("removed job: {}", name);
        }
        removed
    }

    pub async fn task_names(&self) -> Vec<String> {
        self.jobs.read().await.keys().cloned().collect()
    }

    /// Starts the driver loop. A no-op with a warning when already
    /// running.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler is already running");
            return;
        }

        let jobs = Arc::clone(&self.jobs);
        let running = Arc::clone(&self.running);
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            info!("scheduler started");
            while running.load(Ordering::SeqCst) {
                Self::tick(&jobs).await;
                tokio::time::sleep(tick_interval).await;
            }
            info!("scheduler stopped");
        });

        *self.driver.lock().await = Some(handle);
    }

    /// Stops scheduling new dispatches and waits briefly for the driver
    /// to quiesce. In-flight job executions are not cancelled. A no-op
    /// with a warning when not running.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("scheduler is not running");
            return;
        }

        if let Some(handle) = self.driver.lock().await.take() {
            let grace = self.tick_interval * 2 + Duration::from_millis(100);
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("scheduler driver did not quiesce in time");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Scans all jobs and dispatches each eligible, non-running one onto
    /// its own task.
    async fn tick(jobs: &Arc<RwLock<HashMap<String, Job>>>) {
        let now = Utc::now();
        let mut dispatches = Vec::new();

        {
            let mut registry = jobs.write().await;
            for (name, job) in registry.iter_mut() {
                if !job.should_run(now) {
                    continue;
                }
                // Claim the running flag; losing the race means a prior
                // dispatch is still in flight.
                if job
                    .running
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    continue;
                }
                job.last_attempt = Some(now);
                dispatches.push((name.clone(), Arc::clone(&job.func), Arc::clone(&job.running)));
            }
        }

        for (name, func, flag) in dispatches {
            debug!("dispatching job: {}", name);
            let jobs = Arc::clone(jobs);
            tokio::spawn(async move {
                let outcome = func().await;
                match outcome {
                    Ok(()) => {
                        // Only a successful run advances last_run; a failed
                        // job is eligible again once its interval elapses.
                        if let Some(job) = jobs.write().await.get_mut(&name) {
                            job.last_run = Some(Utc::now());
                        }
                    }
                    Err(e) => {
                        error!("job '{}' failed: {}", name, e);
                    }
                }
                flag.store(false, Ordering::SeqCst);
            });
        }
    }
}

//! Periodic pipeline runner.
//!
//! Every schedule gets its own thread driven by a [`crossbeam::channel::tick`]
//! ticker. A firing builds a fresh run scope, synthesizes and parses the
//! pipeline's source and runs it. Failures (and panics) are logged and the
//! schedule keeps going; nothing is shared between firings except what the
//! host installs through its [`ScopeOption`]s.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    config::{Config, ScheduleConfig},
    error::ErrorList,
    evaluator::Evaluator,
    host::{ScopeOption, run_scope},
    parser::parse_file,
};

/// How long [`Scheduler::stop`] waits for in-flight runs.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

const STOP_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("schedule {schedule:?} refers to unknown pipeline {pipeline:?}")]
    UnknownPipeline { schedule: String, pipeline: String },

    #[error("schedule {0:?} has a zero interval")]
    ZeroInterval(String),

    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("failed to start schedule {name:?}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct Scheduler {
    config: Config,
    jobs: Mutex<Vec<Job>>,
}

struct Job {
    name: String,
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    pub fn new(config: Config) -> Self {
        Scheduler {
            config,
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Starts one job per schedule. `options` are applied to the run scope
    /// of every firing.
    pub fn start(&self, options: Vec<ScopeOption>) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock();
        if !jobs.is_empty() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let mut runners = Vec::with_capacity(self.config.schedules.len());
        let options: Arc<[ScopeOption]> = options.into();
        for schedule in &self.config.schedules {
            let pipeline = self.config.pipeline(&schedule.pipeline).ok_or_else(|| {
                SchedulerError::UnknownPipeline {
                    schedule: schedule.name.clone(),
                    pipeline: schedule.pipeline.clone(),
                }
            })?;
            if schedule.every.is_zero() {
                return Err(SchedulerError::ZeroInterval(schedule.name.clone()));
            }
            runners.push(Runner {
                schedule: schedule.clone(),
                source: Config::to_source(pipeline),
                options: options.clone(),
            });
        }

        for runner in runners {
            let name = runner.schedule.name.clone();
            let (stop, stopped) = channel::bounded::<()>(0);
            let handle = thread::Builder::new()
                .name(format!("schedule-{}", name))
                .spawn(move || runner.run(stopped))
                .map_err(|source| SchedulerError::Spawn {
                    name: name.clone(),
                    source,
                })?;
            jobs.push(Job { name, stop, handle });
        }

        info!(jobs = jobs.len(), "scheduler started");
        Ok(())
    }

    /// Stops every job, giving in-flight runs up to [`STOP_GRACE`] to finish.
    pub fn stop(&self) {
        self.stop_within(STOP_GRACE);
    }

    /// Stops every job and waits up to `grace` for in-flight runs. Runs
    /// still going after that are detached; they are not aborted and no
    /// further firings follow them.
    pub fn stop_within(&self, grace: Duration) {
        let jobs = std::mem::take(&mut *self.jobs.lock());
        if jobs.is_empty() {
            return;
        }

        let mut pending: Vec<(String, JoinHandle<()>)> = jobs
            .into_iter()
            .map(|Job { name, stop, handle }| {
                drop(stop);
                (name, handle)
            })
            .collect();

        let deadline = Instant::now() + grace;
        loop {
            let (finished, running): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|(_, handle)| handle.is_finished());
            for (name, handle) in finished {
                if handle.join().is_err() {
                    error!(job = %name, "schedule thread panicked");
                }
            }
            pending = running;
            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(STOP_POLL);
        }

        for (name, _) in &pending {
            warn!(job = %name, "run still in flight, detaching");
        }
        info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.jobs.lock().is_empty()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Runner {
    schedule: ScheduleConfig,
    source: String,
    options: Arc<[ScopeOption]>,
}

impl Runner {
    fn run(self, stop: Receiver<()>) {
        let ticker = channel::tick(self.schedule.every);
        let mut runs = 0u32;
        loop {
            let stopped = channel::select! {
                recv(stop) -> _ => true,
                recv(ticker) -> _ => false,
            };
            if stopped {
                break;
            }

            runs += 1;
            self.fire(runs);
            if self.schedule.iterations > 0 && runs >= self.schedule.iterations {
                break;
            }
        }
        debug!(job = %self.schedule.name, runs, "schedule finished");
    }

    fn fire(&self, run: u32) {
        let job = &self.schedule.name;
        let pipeline = &self.schedule.pipeline;
        debug!(job = %job, pipeline = %pipeline, run, "firing");

        match panic::catch_unwind(AssertUnwindSafe(|| self.execute())) {
            Ok(Ok(())) => {}
            Ok(Err(errors)) => {
                error!(job = %job, pipeline = %pipeline, error = %errors, "pipeline run failed");
            }
            Err(_) => {
                error!(job = %job, pipeline = %pipeline, "pipeline run panicked");
            }
        }
    }

    fn execute(&self) -> Result<(), ErrorList> {
        let scope = run_scope(&self.options);
        let file = parse_file(&self.source, &scope)?;
        Evaluator::new(scope).run_file(&file, &self.schedule.pipeline)?;
        Ok(())
    }
}

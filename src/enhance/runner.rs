//! Background job runner
//!
//! Each accepted job gets its own worker thread. Workers never touch job
//! state: they send a plain [`JobOutcome`] back over a channel and the owner
//! of the runner applies it when it calls [`JobRunner::poll`] or
//! [`JobRunner::wait`].

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::audio::AudioBuffer;
use crate::enhance::job::{EnhancementJob, JobId, JobState, SourceId};
use crate::enhance::params::{ProviderKind, ProviderParams};
use crate::enhance::provider::{EnhancementProvider, ProviderRegistry};
use crate::error::{RescueError, Result};
use crate::loudness::TempResourceScope;

/// What a worker sends back when its job is done
#[derive(Debug)]
struct JobOutcome {
    job_id: JobId,
    result: std::result::Result<AudioBuffer, String>,
}

/// A terminal state observed by the primary context
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub job_id: JobId,
    pub source: SourceId,
    pub provider: ProviderKind,
    pub state: JobState,
    pub result: Option<AudioBuffer>,
    pub error: Option<String>,
}

impl JobEvent {
    fn from_job(job: &EnhancementJob) -> Self {
        Self {
            job_id: job.id(),
            source: job.source().clone(),
            provider: job.provider(),
            state: job.state(),
            result: job.result().cloned(),
            error: job.error().map(str::to_string),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == JobState::Succeeded
    }
}

pub struct JobRunner {
    registry: ProviderRegistry,
    temp_dir: std::path::PathBuf,
    jobs: HashMap<JobId, EnhancementJob>,
    current: HashMap<SourceId, JobId>,
    outcomes_tx: Sender<JobOutcome>,
    outcomes_rx: Receiver<JobOutcome>,
    events: VecDeque<JobEvent>,
}

impl JobRunner {
    pub fn new(registry: ProviderRegistry, temp_dir: impl Into<std::path::PathBuf>) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::channel();
        Self {
            registry,
            temp_dir: temp_dir.into(),
            jobs: HashMap::new(),
            current: HashMap::new(),
            outcomes_tx,
            outcomes_rx,
            events: VecDeque::new(),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn job(&self, job_id: JobId) -> Option<&EnhancementJob> {
        self.jobs.get(&job_id)
    }

    /// The latest job submitted for a source, if it is still held
    pub fn current_job(&self, source: &SourceId) -> Option<&EnhancementJob> {
        self.current.get(source).and_then(|id| self.jobs.get(id))
    }

    pub fn is_busy(&self, source: &SourceId) -> bool {
        self.current_job(source).map(|j| j.is_running()).unwrap_or(false)
    }

    pub fn running_count(&self) -> usize {
        self.jobs.values().filter(|j| j.is_running()).count()
    }

    /// Build a queued job and submit it
    pub fn submit_new(
        &mut self,
        source: SourceId,
        input: AudioBuffer,
        params: ProviderParams,
    ) -> Result<JobId> {
        self.submit(EnhancementJob::new(source, input, params))
    }

    /// Accept a queued job and start its worker
    pub fn submit(&mut self, mut job: EnhancementJob) -> Result<JobId> {
        self.drain();

        if self.is_busy(job.source()) {
            return Err(RescueError::Busy {
                source_id: job.source().to_string(),
            });
        }
        let provider = self.registry.get(job.provider())?;
        job.start()?;

        let job_id = job.id();
        let input = job.input().clone();
        let params = job.params().clone();
        let temp_dir = self.temp_dir.clone();
        let tx = self.outcomes_tx.clone();

        info!(job = %job_id, source = %job.source(), provider = %job.provider(), "job running");

        let spawned = thread::Builder::new()
            .name(format!("podrescue-job-{}", job_id.short()))
            .spawn(move || {
                let result = run_job(provider, &input, &params, temp_dir);
                // The runner may already be gone; nobody is left to tell.
                let _ = tx.send(JobOutcome { job_id, result });
            });

        // A superseded terminal job for the same source is discarded
        if let Some(previous) = self.current.insert(job.source().clone(), job_id) {
            self.jobs.remove(&previous);
        }

        if let Err(e) = spawned {
            job.fail(format!("could not start worker: {}", e))?;
            self.events.push_back(JobEvent::from_job(&job));
            self.jobs.insert(job_id, job);
            return Err(RescueError::Io(e));
        }

        self.jobs.insert(job_id, job);
        Ok(job_id)
    }

    /// Apply every finished outcome and return the events not yet seen
    pub fn poll(&mut self) -> Vec<JobEvent> {
        self.drain();
        self.events.drain(..).collect()
    }

    /// Block until `job_id` is terminal or `timeout` elapses
    ///
    /// Events for any job finished meanwhile stay queued for `poll`.
    pub fn wait(&mut self, job_id: JobId, timeout: Duration) -> Result<JobState> {
        // A timeout too large to add to now means wait without a deadline
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let state = self
                .jobs
                .get(&job_id)
                .map(|j| j.state())
                .ok_or_else(|| RescueError::UnknownJob {
                    job_id: job_id.to_string(),
                })?;
            if state.is_terminal() {
                return Ok(state);
            }

            let received = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    self.outcomes_rx.recv_timeout(remaining)
                }
                None => self
                    .outcomes_rx
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(outcome) => self.apply(outcome),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(RescueError::WaitTimeout {
                        job_id: job_id.to_string(),
                    })
                }
            }
        }
    }

    /// Take the result buffer out of a succeeded job
    pub fn take_result(&mut self, job_id: JobId) -> Result<Option<AudioBuffer>> {
        self.jobs
            .get_mut(&job_id)
            .map(|j| j.take_result())
            .ok_or_else(|| RescueError::UnknownJob {
                job_id: job_id.to_string(),
            })
    }

    fn drain(&mut self) {
        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            self.apply(outcome);
        }
    }

    fn apply(&mut self, outcome: JobOutcome) {
        let Some(job) = self.jobs.get_mut(&outcome.job_id) else {
            warn!(job = %outcome.job_id, "outcome for a discarded job");
            return;
        };
        let applied = match outcome.result {
            Ok(buffer) => {
                info!(job = %outcome.job_id, "job succeeded");
                job.succeed(buffer)
            }
            Err(reason) => {
                warn!(job = %outcome.job_id, reason = %reason, "job failed");
                job.fail(reason)
            }
        };
        match applied {
            Ok(()) => self.events.push_back(JobEvent::from_job(job)),
            Err(e) => warn!(job = %outcome.job_id, error = %e, "could not apply job outcome"),
        }
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("registry", &self.registry)
            .field("jobs", &self.jobs.len())
            .field("running", &self.running_count())
            .finish()
    }
}

/// Worker body: submit then fetch, then check the length
fn run_job(
    provider: Arc<dyn EnhancementProvider>,
    input: &AudioBuffer,
    params: &ProviderParams,
    temp_dir: std::path::PathBuf,
) -> std::result::Result<AudioBuffer, String> {
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| -> Result<AudioBuffer> {
        let mut scope = TempResourceScope::new(temp_dir);
        let raw = provider.submit(input, params, &mut scope)?;
        let output = provider.fetch(raw)?;
        check_duration(provider.as_ref(), input, &output)?;
        Ok(output)
    }));

    match attempt {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("provider panicked: {}", message))
        }
    }
}

fn check_duration(
    provider: &dyn EnhancementProvider,
    input: &AudioBuffer,
    output: &AudioBuffer,
) -> Result<()> {
    if output.is_empty() {
        return Err(RescueError::Provider {
            provider: provider.kind().to_string(),
            reason: "provider returned empty audio".to_string(),
        });
    }
    let drift = (output.duration() - input.duration()).abs();
    if drift > provider.duration_tolerance() {
        return Err(RescueError::Provider {
            provider: provider.kind().to_string(),
            reason: format!(
                "result is {:.3}s long, input was {:.3}s (tolerance {:.3}s)",
                output.duration(),
                input.duration(),
                provider.duration_tolerance()
            ),
        });
    }
    Ok(())
}

use std::rc::Rc;
use std::time::Duration;

use foundation::{JobHandle, TaskId};
use runtime::{JobEvent, JobPhase};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::api::AnalysisApi;
use crate::error::JobError;
use crate::protocol::{AnalysisKind, JobOutput, JobResult, error_text};

#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Delay between status checks.
    pub interval: Duration,
    /// Consecutive transport failures tolerated before the job is failed.
    pub max_transport_errors: u32,
    /// Overall deadline for a job to finish. `None` waits indefinitely.
    pub max_wait: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_transport_errors: 10,
            max_wait: None,
        }
    }
}

/// Watches queued jobs until they finish.
#[derive(Clone)]
pub struct JobPoller {
    api: Rc<dyn AnalysisApi>,
    config: PollConfig,
}

impl JobPoller {
    pub fn new(api: Rc<dyn AnalysisApi>, config: PollConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Takes the handle by value: one handle, one poll sequence.
    pub fn track(&self, kind: AnalysisKind, task: TaskId, job: JobHandle) -> PendingJob {
        PendingJob {
            api: Rc::clone(&self.api),
            config: self.config.clone(),
            kind,
            task,
            job,
            phase: JobPhase::Pending,
        }
    }
}

/// A queued job whose outcome is not known yet.
pub struct PendingJob {
    api: Rc<dyn AnalysisApi>,
    config: PollConfig,
    kind: AnalysisKind,
    task: TaskId,
    job: JobHandle,
    phase: JobPhase,
}

impl PendingJob {
    pub fn handle(&self) -> &JobHandle {
        &self.job
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Polls the worker status until the job succeeds or fails.
    pub async fn await_completion(mut self) -> Result<CompletedJob, JobError> {
        let started = Instant::now();
        let mut transport_errors = 0u32;

        loop {
            match self.api.check_status(&self.job).await {
                Ok(status) => {
                    transport_errors = 0;
                    if let Some(err) = status.error.as_ref().filter(|e| !e.is_null()) {
                        let reason = error_text(err);
                        self.transition(JobEvent::Failed);
                        warn!(kind = %self.kind, job = %self.job, "job failed: {reason}");
                        return Err(JobError::JobFailed(reason));
                    }
                    if status.ready {
                        self.transition(JobEvent::Ready);
                        info!(kind = %self.kind, job = %self.job, "job finished");
                        return Ok(CompletedJob {
                            api: self.api,
                            kind: self.kind,
                            task: self.task,
                            job: self.job,
                            phase: self.phase,
                        });
                    }
                    debug!(kind = %self.kind, job = %self.job, "job still running");
                }
                Err(err) => {
                    transport_errors += 1;
                    if transport_errors > self.config.max_transport_errors {
                        self.transition(JobEvent::Failed);
                        warn!(
                            kind = %self.kind,
                            job = %self.job,
                            "giving up after {transport_errors} failed status checks: {err}"
                        );
                        return Err(JobError::JobFailed(err.to_string()));
                    }
                    debug!(
                        kind = %self.kind,
                        job = %self.job,
                        attempt = transport_errors,
                        "status check failed, retrying: {err}"
                    );
                }
            }

            if let Some(max) = self.config.max_wait
                && started.elapsed() >= max
            {
                self.transition(JobEvent::Failed);
                warn!(kind = %self.kind, job = %self.job, "job timed out");
                return Err(JobError::TimedOut(max));
            }
            sleep(self.config.interval).await;
        }
    }

    fn transition(&mut self, event: JobEvent) {
        match self.phase.advance(event) {
            Ok(next) => self.phase = next,
            Err(err) => warn!(job = %self.job, "{err}"),
        }
    }
}

/// A job the queue reported as finished. Its output is not fetched yet.
pub struct CompletedJob {
    api: Rc<dyn AnalysisApi>,
    kind: AnalysisKind,
    task: TaskId,
    job: JobHandle,
    phase: JobPhase,
}

impl CompletedJob {
    pub fn handle(&self) -> &JobHandle {
        &self.job
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub async fn fetch_output(mut self) -> Result<JobResult, JobError> {
        let outcome = self.load().await;
        let event = if outcome.is_ok() {
            JobEvent::OutputFetched
        } else {
            JobEvent::OutputUnavailable
        };
        match self.phase.advance(event) {
            Ok(next) => self.phase = next,
            Err(err) => warn!(job = %self.job, "{err}"),
        }
        if let Err(err) = &outcome {
            warn!(kind = %self.kind, job = %self.job, "{err}");
        }
        outcome
    }

    async fn load(&self) -> Result<JobResult, JobError> {
        let reply = self
            .api
            .fetch_output(self.kind, &self.task, &self.job)
            .await
            .map_err(|err| JobError::OutputUnavailable(err.to_string()))?;

        if let Some(err) = reply.error.as_ref().filter(|e| !e.is_null()) {
            return Err(JobError::OutputUnavailable(error_text(err)));
        }
        let raw = reply
            .output
            .ok_or_else(|| JobError::OutputUnavailable("reply has no output".into()))?;
        let output: JobOutput = serde_json::from_value(raw)
            .map_err(|err| JobError::OutputUnavailable(format!("bad output: {err}")))?;

        Ok(JobResult {
            bounds: output.bounds,
            image_url: self.api.image_url(self.kind, &self.task, &self.job),
            area: output.area,
            pixel_count: output.pixel_count,
        })
    }
}

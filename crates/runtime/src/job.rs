/// Lifecycle of one backend job as seen by a poller.
///
/// `Succeeded` is not usable on its own: the output still has to be fetched,
/// which either lands in `Fetched` or, if retrieval fails, in `Failed`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum JobPhase {
    #[default]
    Pending,
    Succeeded,
    Fetched,
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// The queue reported the job as finished without error.
    Ready,
    /// The queue reported a failure, or the status could not be obtained.
    Failed,
    OutputFetched,
    OutputUnavailable,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: JobPhase,
    pub event: JobEvent,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid job transition: {:?} on {:?}", self.event, self.from)
    }
}

impl std::error::Error for InvalidTransition {}

impl JobPhase {
    pub fn advance(self, event: JobEvent) -> Result<JobPhase, InvalidTransition> {
        match (self, event) {
            (JobPhase::Pending, JobEvent::Ready) => Ok(JobPhase::Succeeded),
            (JobPhase::Pending, JobEvent::Failed) => Ok(JobPhase::Failed),
            (JobPhase::Succeeded, JobEvent::OutputFetched) => Ok(JobPhase::Fetched),
            (JobPhase::Succeeded, JobEvent::OutputUnavailable) => Ok(JobPhase::Failed),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }
}

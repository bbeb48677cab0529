use std::time::Duration;

/// Transport-level failure talking to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request could not complete (connection, DNS, aborted body, ...).
    Transport(String),
    /// The host answered with a non-success status.
    Status { code: u16, body: String },
    /// The body was not the JSON we expected.
    Decode(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Transport(msg) => write!(f, "request failed: {msg}"),
            ApiError::Status { code, body } if body.is_empty() => write!(f, "HTTP {code}"),
            ApiError::Status { code, body } => write!(f, "HTTP {code}: {body}"),
            ApiError::Decode(msg) => write!(f, "invalid response body: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Why a submission did not produce a rendered result.
///
/// All variants are transient: the user may fix inputs and retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Transport failure or in-band rejection of the job-creation request.
    Submission(String),
    /// The queue reported a terminal failure.
    JobFailed(String),
    /// The job finished but its output could not be retrieved.
    OutputUnavailable(String),
    /// Job-creation reply carried neither a handle nor an error.
    Malformed(String),
    /// `PollConfig::max_wait` elapsed before the job finished.
    TimedOut(Duration),
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::Submission(msg) => f.write_str(msg),
            JobError::JobFailed(msg) => f.write_str(msg),
            JobError::OutputUnavailable(msg) => write!(f, "result unavailable: {msg}"),
            JobError::Malformed(raw) => write!(f, "Invalid response: {raw}"),
            JobError::TimedOut(max) => {
                write!(f, "job did not finish within {}s", max.as_secs())
            }
        }
    }
}

impl std::error::Error for JobError {}

use foundation::{JobHandle, TaskId};
use tracing::{info, warn};

use crate::api::AnalysisApi;
use crate::error::JobError;
use crate::protocol::{JobParameters, SubmitReply};

/// Queues one job. No retries.
///
/// Transport failures and in-band rejections both surface as
/// [`JobError::Submission`]; a reply with neither handle nor error is
/// [`JobError::Malformed`].
pub async fn submit_job(
    api: &dyn AnalysisApi,
    task: &TaskId,
    params: &JobParameters,
) -> Result<JobHandle, JobError> {
    let kind = params.kind();
    let raw = api.submit(task, params).await.map_err(|err| {
        warn!(%kind, %task, "job submission failed: {err}");
        JobError::Submission(err.to_string())
    })?;

    match SubmitReply::from_json(raw) {
        SubmitReply::Accepted(job) => {
            info!(%kind, %task, %job, "job queued");
            Ok(job)
        }
        SubmitReply::Rejected(msg) => {
            warn!(%kind, %task, "job rejected: {msg}");
            Err(JobError::Submission(msg))
        }
        SubmitReply::Malformed(raw) => {
            warn!(%kind, %task, "malformed submission reply: {raw}");
            Err(JobError::Malformed(raw.to_string()))
        }
    }
}

use foundation::{JobHandle, TaskId};
use futures_util::future::LocalBoxFuture;
use serde_json::Value;

use crate::error::ApiError;
use crate::protocol::{
    AnalysisKind, JobParameters, OutputReply, StatusReply, TaskMetadata, TaskRef,
};

/// The host endpoints a panel talks to.
///
/// Futures are local (`!Send`): panels live on a single-threaded executor.
/// Methods return boxed futures for dyn-compatibility.
pub trait AnalysisApi {
    fn fetch_task<'a>(
        &'a self,
        task: &'a TaskRef,
    ) -> LocalBoxFuture<'a, Result<TaskMetadata, ApiError>>;

    /// Returns the raw reply; decoding is the job client's business.
    fn submit<'a>(
        &'a self,
        task: &'a TaskId,
        params: &'a JobParameters,
    ) -> LocalBoxFuture<'a, Result<Value, ApiError>>;

    fn check_status<'a>(
        &'a self,
        job: &'a JobHandle,
    ) -> LocalBoxFuture<'a, Result<StatusReply, ApiError>>;

    fn fetch_output<'a>(
        &'a self,
        kind: AnalysisKind,
        task: &'a TaskId,
        job: &'a JobHandle,
    ) -> LocalBoxFuture<'a, Result<OutputReply, ApiError>>;

    /// URL of the rendered result image.
    fn image_url(&self, kind: AnalysisKind, task: &TaskId, job: &JobHandle) -> String;
}

//! Scripted in-process backend for tests.
//!
//! Replies are queued per endpoint and consumed in order. A reply can also be
//! gated behind a oneshot channel so a test controls exactly when it resolves.

use std::cell::RefCell;
use std::collections::VecDeque;

use foundation::{JobHandle, TaskId};
use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::api::AnalysisApi;
use crate::error::ApiError;
use crate::protocol::{
    AnalysisKind, ApiRoutes, JobParameters, OutputReply, StatusReply, TaskMetadata, TaskRef,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    FetchTask(TaskId),
    Submit(JobParameters),
    CheckStatus(String),
    FetchOutput(String),
}

enum Scripted<T> {
    Now(Result<T, ApiError>),
    Gated(oneshot::Receiver<Result<T, ApiError>>),
}

impl<T> Scripted<T> {
    async fn resolve(self) -> Result<T, ApiError> {
        match self {
            Scripted::Now(reply) => reply,
            Scripted::Gated(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ApiError::Transport("gate dropped".into()))),
        }
    }
}

struct Script<T>(RefCell<VecDeque<Scripted<T>>>);

impl<T> Default for Script<T> {
    fn default() -> Self {
        Script(RefCell::new(VecDeque::new()))
    }
}

impl<T> Script<T> {
    fn push(&self, reply: Result<T, ApiError>) {
        self.0.borrow_mut().push_back(Scripted::Now(reply));
    }

    fn gate(&self) -> oneshot::Sender<Result<T, ApiError>> {
        let (tx, rx) = oneshot::channel();
        self.0.borrow_mut().push_back(Scripted::Gated(rx));
        tx
    }

    fn next(&self, endpoint: &str) -> Scripted<T> {
        self.0.borrow_mut().pop_front().unwrap_or_else(|| {
            Scripted::Now(Err(ApiError::Transport(format!("no scripted {endpoint} reply"))))
        })
    }
}

#[derive(Default)]
pub struct ScriptedApi {
    routes: ApiRoutes,
    tasks: Script<TaskMetadata>,
    submits: Script<Value>,
    statuses: Script<StatusReply>,
    outputs: Script<OutputReply>,
    calls: RefCell<Vec<ApiCall>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Task metadata reply listing the given asset names.
    pub fn with_assets(assets: &[&str]) -> Self {
        let api = Self::new();
        api.push_task(Ok(TaskMetadata {
            available_assets: assets.iter().map(|a| a.to_string()).collect(),
        }));
        api
    }

    pub fn push_task(&self, reply: Result<TaskMetadata, ApiError>) {
        self.tasks.push(reply);
    }

    pub fn gate_task(&self) -> oneshot::Sender<Result<TaskMetadata, ApiError>> {
        self.tasks.gate()
    }

    pub fn push_submit(&self, reply: Result<Value, ApiError>) {
        self.submits.push(reply);
    }

    pub fn gate_submit(&self) -> oneshot::Sender<Result<Value, ApiError>> {
        self.submits.gate()
    }

    pub fn push_status(&self, reply: Result<StatusReply, ApiError>) {
        self.statuses.push(reply);
    }

    pub fn gate_status(&self) -> oneshot::Sender<Result<StatusReply, ApiError>> {
        self.statuses.gate()
    }

    pub fn push_output(&self, reply: Result<OutputReply, ApiError>) {
        self.outputs.push(reply);
    }

    /// Queues a full successful job: accepted submission, ready status and an
    /// output with the given bounds and optional area.
    pub fn script_success(&self, job: &str, bounds: [[f64; 2]; 2], area: Option<f64>) {
        self.push_submit(Ok(serde_json::json!({ "celery_task_id": job })));
        self.push_status(Ok(StatusReply::ready()));
        let mut output = serde_json::json!({ "bounds": bounds, "image": "/tmp/out.png" });
        if let Some(area) = area {
            output["area"] = serde_json::json!(area);
        }
        self.push_output(Ok(OutputReply {
            output: Some(output),
            error: None,
        }));
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.borrow().clone()
    }

    pub fn submit_count(&self) -> usize {
        self.count(|c| matches!(c, ApiCall::Submit(_)))
    }

    pub fn status_count(&self) -> usize {
        self.count(|c| matches!(c, ApiCall::CheckStatus(_)))
    }

    pub fn output_count(&self) -> usize {
        self.count(|c| matches!(c, ApiCall::FetchOutput(_)))
    }

    fn count(&self, pred: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: ApiCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl AnalysisApi for ScriptedApi {
    fn fetch_task<'a>(
        &'a self,
        task: &'a TaskRef,
    ) -> LocalBoxFuture<'a, Result<TaskMetadata, ApiError>> {
        self.record(ApiCall::FetchTask(task.id.clone()));
        self.tasks.next("task").resolve().boxed_local()
    }

    fn submit<'a>(
        &'a self,
        _task: &'a TaskId,
        params: &'a JobParameters,
    ) -> LocalBoxFuture<'a, Result<Value, ApiError>> {
        self.record(ApiCall::Submit(params.clone()));
        self.submits.next("submit").resolve().boxed_local()
    }

    fn check_status<'a>(
        &'a self,
        job: &'a JobHandle,
    ) -> LocalBoxFuture<'a, Result<StatusReply, ApiError>> {
        self.record(ApiCall::CheckStatus(job.to_string()));
        self.statuses.next("status").resolve().boxed_local()
    }

    fn fetch_output<'a>(
        &'a self,
        _kind: AnalysisKind,
        _task: &'a TaskId,
        job: &'a JobHandle,
    ) -> LocalBoxFuture<'a, Result<OutputReply, ApiError>> {
        self.record(ApiCall::FetchOutput(job.to_string()));
        self.outputs.next("output").resolve().boxed_local()
    }

    fn image_url(&self, kind: AnalysisKind, task: &TaskId, job: &JobHandle) -> String {
        self.routes.result_image(kind, task, job)
    }
}

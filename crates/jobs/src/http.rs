use foundation::{JobHandle, TaskId};
use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::api::AnalysisApi;
use crate::error::ApiError;
use crate::protocol::{
    AnalysisKind, ApiRoutes, JobParameters, OutputReply, StatusReply, TaskMetadata, TaskRef,
};

/// [`AnalysisApi`] over the host's HTTP endpoints.
#[derive(Clone)]
pub struct HttpAnalysisApi {
    http: reqwest::Client,
    routes: ApiRoutes,
    token: Option<String>,
}

impl HttpAnalysisApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            routes: ApiRoutes::new(base_url),
            token: None,
        }
    }

    /// Sends `Authorization: JWT <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.header(reqwest::header::AUTHORIZATION, format!("JWT {token}")),
            None => req,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, ApiError> {
        debug!("GET {url}");
        let req = self.authorize(self.http.get(&url));
        read_json(req.send().await).await
    }
}

async fn read_json<T: DeserializeOwned>(
    sent: reqwest::Result<reqwest::Response>,
) -> Result<T, ApiError> {
    let resp = sent.map_err(|e| ApiError::Transport(e.to_string()))?;
    let status = resp.status();
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    if !status.is_success() {
        return Err(ApiError::Status {
            code: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).trim().to_string(),
        });
    }
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

impl AnalysisApi for HttpAnalysisApi {
    fn fetch_task<'a>(
        &'a self,
        task: &'a TaskRef,
    ) -> LocalBoxFuture<'a, Result<TaskMetadata, ApiError>> {
        self.get_json(self.routes.task(task)).boxed_local()
    }

    fn submit<'a>(
        &'a self,
        task: &'a TaskId,
        params: &'a JobParameters,
    ) -> LocalBoxFuture<'a, Result<Value, ApiError>> {
        async move {
            let url = self.routes.generate(params.kind(), task);
            debug!("POST {url}");
            let req = self.authorize(self.http.post(&url).json(params));
            read_json(req.send().await).await
        }
        .boxed_local()
    }

    fn check_status<'a>(
        &'a self,
        job: &'a JobHandle,
    ) -> LocalBoxFuture<'a, Result<StatusReply, ApiError>> {
        self.get_json(self.routes.check(job)).boxed_local()
    }

    fn fetch_output<'a>(
        &'a self,
        kind: AnalysisKind,
        task: &'a TaskId,
        job: &'a JobHandle,
    ) -> LocalBoxFuture<'a, Result<OutputReply, ApiError>> {
        self.get_json(self.routes.result(kind, task, job)).boxed_local()
    }

    fn image_url(&self, kind: AnalysisKind, task: &TaskId, job: &JobHandle) -> String {
        self.routes.result_image(kind, task, job)
    }
}

//! Wire types for the host's task and plugin job endpoints.
//!
//! Shapes follow the host web application:
//! - task metadata: `GET /api/projects/{project}/tasks/{task}/`
//! - job creation: `POST /api/plugins/{kind}/task/{task}/{kind}/generate`
//! - job status: `GET /api/workers/check/{job}`
//! - job output: `GET /api/plugins/{kind}/task/{task}/{kind}/result/{job}`
//!   (append `?serve=image` for the rendered PNG)

use foundation::{GeoBounds, JobHandle, ProjectId, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Hillshade,
    Viewshed,
    Watershed,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 3] = [
        AnalysisKind::Hillshade,
        AnalysisKind::Viewshed,
        AnalysisKind::Watershed,
    ];

    /// Plugin name as used in URLs and settings keys.
    pub fn slug(self) -> &'static str {
        match self {
            AnalysisKind::Hillshade => "hillshade",
            AnalysisKind::Viewshed => "viewshed",
            AnalysisKind::Watershed => "watershed",
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Elevation model used as analysis input.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LayerChoice {
    #[serde(rename = "DSM")]
    Dsm,
    #[serde(rename = "DTM")]
    Dtm,
}

impl LayerChoice {
    /// Preference order when deriving choices from task assets.
    pub const ALL: [LayerChoice; 2] = [LayerChoice::Dsm, LayerChoice::Dtm];

    pub fn label(self) -> &'static str {
        match self {
            LayerChoice::Dsm => "DSM",
            LayerChoice::Dtm => "DTM",
        }
    }

    pub fn asset_name(self) -> &'static str {
        match self {
            LayerChoice::Dsm => "dsm.tif",
            LayerChoice::Dtm => "dtm.tif",
        }
    }

    pub fn available_in(assets: &[String]) -> Vec<LayerChoice> {
        LayerChoice::ALL
            .into_iter()
            .filter(|choice| assets.iter().any(|a| a == choice.asset_name()))
            .collect()
    }
}

impl std::fmt::Display for LayerChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for LayerChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DSM" => Ok(LayerChoice::Dsm),
            "DTM" => Ok(LayerChoice::Dtm),
            other => Err(format!("{other} is not a valid layer")),
        }
    }
}

/// A task as supplied by the host when the control is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub id: TaskId,
    pub project: ProjectId,
}

impl TaskRef {
    pub fn new(id: impl Into<String>, project: u64) -> Self {
        Self {
            id: TaskId::new(id),
            project: ProjectId(project),
        }
    }
}

/// The part of the task resource the panels care about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskMetadata {
    pub available_assets: Vec<String>,
}

/// Body of a job-creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobParameters {
    Hillshade {
        layer: LayerChoice,
        azimuth: f64,
        altitude: f64,
    },
    Viewshed {
        layer: LayerChoice,
        lat: f64,
        lng: f64,
        height: f64,
    },
    Watershed {
        layer: LayerChoice,
        lat: f64,
        lng: f64,
        snap_distance: f64,
    },
}

impl JobParameters {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            JobParameters::Hillshade { .. } => AnalysisKind::Hillshade,
            JobParameters::Viewshed { .. } => AnalysisKind::Viewshed,
            JobParameters::Watershed { .. } => AnalysisKind::Watershed,
        }
    }

    pub fn layer(&self) -> LayerChoice {
        match self {
            JobParameters::Hillshade { layer, .. }
            | JobParameters::Viewshed { layer, .. }
            | JobParameters::Watershed { layer, .. } => *layer,
        }
    }
}

/// Decoded job-creation reply.
#[derive(Debug, PartialEq)]
pub enum SubmitReply {
    Accepted(JobHandle),
    Rejected(String),
    /// Neither a handle nor an error; carries the raw payload.
    Malformed(Value),
}

impl SubmitReply {
    pub fn from_json(raw: Value) -> Self {
        if let Some(id) = raw.get("celery_task_id").and_then(Value::as_str)
            && !id.is_empty()
        {
            return SubmitReply::Accepted(JobHandle::new(id));
        }
        match raw.get("error") {
            Some(err) if !err.is_null() => SubmitReply::Rejected(error_text(err)),
            _ => SubmitReply::Malformed(raw),
        }
    }
}

/// Worker status reply: `{"ready": bool, "error": ...}`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct StatusReply {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub error: Option<Value>,
}

impl StatusReply {
    pub fn ready() -> Self {
        Self {
            ready: true,
            error: None,
        }
    }

    pub fn pending() -> Self {
        Self::default()
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            ready: true,
            error: Some(Value::String(reason.into())),
        }
    }
}

/// Job output reply: `{"output": {...}}` or `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct OutputReply {
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// The `output` object a finished job produces.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobOutput {
    pub bounds: GeoBounds,
    /// Square meters (watershed only).
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub pixel_count: Option<u64>,
}

/// A renderable job result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub bounds: GeoBounds,
    pub image_url: String,
    pub area: Option<f64>,
    pub pixel_count: Option<u64>,
}

/// Error payloads are usually strings; anything else is shown as JSON.
pub fn error_text(err: &Value) -> String {
    match err {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// URL builder for the host endpoints. The default is same-origin.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApiRoutes {
    base: String,
}

impl ApiRoutes {
    /// `base` may be empty for same-origin relative URLs.
    pub fn new(base: impl Into<String>) -> Self {
        let base: String = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn task(&self, task: &TaskRef) -> String {
        format!("{}/api/projects/{}/tasks/{}/", self.base, task.project, task.id)
    }

    pub fn generate(&self, kind: AnalysisKind, task: &TaskId) -> String {
        format!("{}/api/plugins/{kind}/task/{task}/{kind}/generate", self.base)
    }

    pub fn check(&self, job: &JobHandle) -> String {
        format!("{}/api/workers/check/{job}", self.base)
    }

    pub fn result(&self, kind: AnalysisKind, task: &TaskId, job: &JobHandle) -> String {
        format!("{}/api/plugins/{kind}/task/{task}/{kind}/result/{job}", self.base)
    }

    pub fn result_image(&self, kind: AnalysisKind, task: &TaskId, job: &JobHandle) -> String {
        format!("{}?serve=image", self.result(kind, task, job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn layer_choices_follow_asset_order() {
        let assets = vec!["orthophoto.tif".to_string(), "dtm.tif".to_string(), "dsm.tif".to_string()];
        assert_eq!(
            LayerChoice::available_in(&assets),
            vec![LayerChoice::Dsm, LayerChoice::Dtm]
        );
        assert!(LayerChoice::available_in(&["orthophoto.tif".to_string()]).is_empty());
        assert_eq!("dtm".parse::<LayerChoice>(), Ok(LayerChoice::Dtm));
        assert!("ortho".parse::<LayerChoice>().is_err());
    }

    #[test]
    fn parameters_serialize_per_kind() {
        let hs = JobParameters::Hillshade {
            layer: LayerChoice::Dsm,
            azimuth: 315.0,
            altitude: 30.0,
        };
        assert_eq!(
            serde_json::to_value(&hs).unwrap(),
            json!({"layer": "DSM", "azimuth": 315.0, "altitude": 30.0})
        );

        let ws = JobParameters::Watershed {
            layer: LayerChoice::Dtm,
            lat: 45.0,
            lng: 9.0,
            snap_distance: 100.0,
        };
        assert_eq!(ws.kind(), AnalysisKind::Watershed);
        assert_eq!(
            serde_json::to_value(&ws).unwrap(),
            json!({"layer": "DTM", "lat": 45.0, "lng": 9.0, "snap_distance": 100.0})
        );
    }

    #[test]
    fn submit_reply_shapes() {
        assert_eq!(
            SubmitReply::from_json(json!({"celery_task_id": "abc-123"})),
            SubmitReply::Accepted(JobHandle::new("abc-123"))
        );
        assert_eq!(
            SubmitReply::from_json(json!({"error": "queue full"})),
            SubmitReply::Rejected("queue full".to_string())
        );
        assert_eq!(
            SubmitReply::from_json(json!({"error": {"detail": "nope"}})),
            SubmitReply::Rejected(r#"{"detail":"nope"}"#.to_string())
        );
        assert_eq!(
            SubmitReply::from_json(json!({"status": 200})),
            SubmitReply::Malformed(json!({"status": 200}))
        );
        assert_eq!(
            SubmitReply::from_json(json!({"celery_task_id": "", "error": null})),
            SubmitReply::Malformed(json!({"celery_task_id": "", "error": null}))
        );
    }

    #[test]
    fn output_decodes_bounds_and_area() {
        let out: JobOutput = serde_json::from_value(json!({
            "bounds": [[10.0, 10.0], [11.0, 11.0]],
            "image": "/tmp/x/watershed.png",
            "area": 15000.0,
            "pixel_count": 150
        }))
        .unwrap();
        assert_eq!(out.bounds, GeoBounds::from([[10.0, 10.0], [11.0, 11.0]]));
        assert_eq!(out.area, Some(15000.0));
        assert_eq!(out.pixel_count, Some(150));
    }

    #[test]
    fn routes_match_host_layout() {
        let routes = ApiRoutes::new("https://odm.example.org/");
        let task = TaskRef::new("7f3c", 12);
        let job = JobHandle::new("c1");
        assert_eq!(routes.task(&task), "https://odm.example.org/api/projects/12/tasks/7f3c/");
        assert_eq!(
            routes.generate(AnalysisKind::Viewshed, &task.id),
            "https://odm.example.org/api/plugins/viewshed/task/7f3c/viewshed/generate"
        );
        assert_eq!(routes.check(&job), "https://odm.example.org/api/workers/check/c1");
        assert_eq!(
            routes.result_image(AnalysisKind::Hillshade, &task.id, &job),
            "https://odm.example.org/api/plugins/hillshade/task/7f3c/hillshade/result/c1?serve=image"
        );
        assert_eq!(ApiRoutes::new("").check(&job), "/api/workers/check/c1");
    }
}

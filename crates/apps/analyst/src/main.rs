use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use analysis::{format_opacity, AnalysisControl, ComputeOutcome, KindConfig, PanelDeps, ParamField};
use clap::{Parser, Subcommand};
use foundation::{GeoBounds, LatLng};
use jobs::{AnalysisKind, HttpAnalysisApi, LayerChoice, PollConfig, TaskRef};
use layers::InMemoryMap;
use runtime::{MapClick, MapClickBus};
use serde::Serialize;
use settings::JsonFileSettings;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a terrain analysis on a processed task")]
struct Args {
    /// Base URL of the processing host
    #[arg(long, env = "ANALYST_BASE_URL", default_value = "http://localhost:8000")]
    base_url: String,

    /// API token, sent as `Authorization: JWT <token>`
    #[arg(long, env = "ANALYST_TOKEN")]
    token: Option<String>,

    /// Where last-used parameters are remembered
    #[arg(long, env = "ANALYST_SETTINGS", default_value = "analyst-settings.json")]
    settings: PathBuf,

    #[arg(long)]
    project: u64,

    #[arg(long)]
    task: String,

    #[arg(long, default_value_t = 2000)]
    poll_interval_ms: u64,

    /// Give up on jobs that run longer than this
    #[arg(long)]
    max_wait_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Shaded relief from a light direction
    Hillshade {
        /// DSM or DTM (defaults to the first available)
        #[arg(long)]
        layer: Option<LayerChoice>,
        #[arg(long)]
        azimuth: Option<f64>,
        #[arg(long)]
        altitude: Option<f64>,
        #[arg(long)]
        opacity: Option<f64>,
    },

    /// Area visible from an observer point
    Viewshed {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long)]
        layer: Option<LayerChoice>,
        /// Observer height in meters
        #[arg(long)]
        height: Option<f64>,
        #[arg(long)]
        opacity: Option<f64>,
    },

    /// Catchment draining to an outlet point
    Watershed {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long)]
        layer: Option<LayerChoice>,
        /// Snap the outlet to a stream within this many meters
        #[arg(long)]
        snap_distance: Option<f64>,
        #[arg(long)]
        opacity: Option<f64>,
    },
}

/// What the user asked for, independent of the analysis kind.
struct Request {
    kind: AnalysisKind,
    layer: Option<LayerChoice>,
    params: Vec<(ParamField, f64)>,
    opacity: Option<f64>,
    point: Option<LatLng>,
}

impl Command {
    fn into_request(self) -> Request {
        fn given(fields: &[(ParamField, Option<f64>)]) -> Vec<(ParamField, f64)> {
            fields
                .iter()
                .filter_map(|(f, v)| v.map(|v| (*f, v)))
                .collect()
        }

        match self {
            Command::Hillshade {
                layer,
                azimuth,
                altitude,
                opacity,
            } => Request {
                kind: AnalysisKind::Hillshade,
                layer,
                params: given(&[(ParamField::Azimuth, azimuth), (ParamField::Altitude, altitude)]),
                opacity,
                point: None,
            },
            Command::Viewshed {
                lat,
                lng,
                layer,
                height,
                opacity,
            } => Request {
                kind: AnalysisKind::Viewshed,
                layer,
                params: given(&[(ParamField::Height, height)]),
                opacity,
                point: Some(LatLng::new(lat, lng)),
            },
            Command::Watershed {
                lat,
                lng,
                layer,
                snap_distance,
                opacity,
            } => Request {
                kind: AnalysisKind::Watershed,
                layer,
                params: given(&[(ParamField::SnapDistance, snap_distance)]),
                opacity,
                point: Some(LatLng::new(lat, lng)),
            },
        }
    }
}

#[derive(Serialize)]
struct Summary {
    kind: AnalysisKind,
    task: String,
    layer: Option<LayerChoice>,
    bounds: GeoBounds,
    center: LatLng,
    image_url: String,
    opacity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    area: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), BoxError> {
    let args = Args::parse();
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&rt, run(args))
}

async fn run(args: Args) -> Result<(), BoxError> {
    let settings = JsonFileSettings::open(&args.settings)?;
    let mut api = HttpAnalysisApi::new(args.base_url.clone());
    if let Some(token) = &args.token {
        api = api.with_token(token.clone());
    }

    let map = Rc::new(InMemoryMap::new());
    let bus = MapClickBus::new();
    let deps = PanelDeps {
        api: Rc::new(api),
        map: map.clone(),
        clicks: Rc::new(bus.clone()),
        settings: Rc::new(settings),
        poll: PollConfig {
            interval: Duration::from_millis(args.poll_interval_ms),
            max_wait: args.max_wait_secs.map(Duration::from_secs),
            ..PollConfig::default()
        },
    };

    let request = args.command.into_request();
    let task = TaskRef::new(args.task.clone(), args.project);
    let control = AnalysisControl::new(KindConfig::for_kind(request.kind), task, &deps);
    let panel = control.panel().clone();

    control.open().await;
    if let Some(err) = panel.permanent_error() {
        return Err(err.into());
    }

    if let Some(layer) = request.layer {
        panel.select_layer(layer)?;
    }
    for (field, value) in request.params {
        panel.set_param(field, value)?;
    }
    if let Some(opacity) = request.opacity {
        panel.set_opacity(opacity)?;
    }
    if let Some(point) = request.point {
        if !point.is_valid() {
            return Err(format!("invalid coordinate {point}").into());
        }
        panel.toggle_picking()?;
        let outcome = bus.dispatch(MapClick { latlng: point });
        if !outcome.is_consumed() {
            return Err("point was not picked".into());
        }
    }

    info!(kind = %request.kind, task = %args.task, "starting analysis");
    let outcome = tokio::select! {
        outcome = panel.compute() => outcome?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, abandoning job");
            control.remove();
            return Ok(());
        }
    };

    match outcome {
        ComputeOutcome::Rendered(result) => {
            if let Some(point) = request.point {
                if !result.bounds.contains(point) {
                    warn!(%point, "result does not cover the picked point");
                }
            }
            let summary = Summary {
                kind: request.kind,
                task: args.task,
                layer: panel.layer(),
                bounds: result.bounds,
                center: result.bounds.center(),
                image_url: result.image_url,
                opacity: format_opacity(panel.opacity()),
                area: panel.area_label(),
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
            info!(layers = map.len(), "done");
            Ok(())
        }
        ComputeOutcome::Failed(err) => Err(err.into()),
        ComputeOutcome::Cancelled => Err("analysis cancelled".into()),
    }
}

//! The analysis panel controller.
//!
//! One implementation serves every [`KindConfig`]. A panel is a cheap `Clone`
//! handle over shared single-threaded state; async operations never hold a
//! borrow across an await point and re-check their ticket before
//! touching state on resumption (see `runtime::OpSlot`), so a cancelled or
//! superseded result is dropped instead of applied.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use foundation::LatLng;
use jobs::{
    AnalysisApi, JobError, JobParameters, JobPoller, JobResult, LayerChoice, PollConfig, TaskRef,
    submit_job,
};
use layers::{MapSurface, OverlayManager};
use runtime::{
    Abortable, ClickOutcome, ClickSource, ClickSubscription, MapClick, OpSlot, OpTicket,
};
use settings::SettingsStore;
use tracing::{debug, info, warn};

use crate::error::{InputError, PanelError};
use crate::format::format_area;
use crate::kind::{KindConfig, ParamField};
use crate::params::ParamValues;
use crate::picker::PointPicker;

/// Collaborators shared by every panel on a map.
#[derive(Clone)]
pub struct PanelDeps {
    pub api: Rc<dyn AnalysisApi>,
    pub map: Rc<dyn MapSurface>,
    pub clicks: Rc<dyn ClickSource>,
    pub settings: Rc<dyn SettingsStore>,
    pub poll: PollConfig,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PanelPhase {
    /// Task metadata not loaded yet.
    Loading,
    PermanentError,
    Idle,
    Picking,
    Processing,
    Disposed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComputeOutcome {
    Rendered(JobResult),
    /// The job did not produce a result; also available through `error()`.
    Failed(JobError),
    /// The panel was disposed or the job abandoned before it finished.
    Cancelled,
}

#[derive(Debug)]
enum Metadata {
    NotLoaded,
    Loading,
    Ready(Vec<LayerChoice>),
    Failed(PanelError),
}

struct PanelState {
    config: &'static KindConfig,
    task: TaskRef,
    api: Rc<dyn AnalysisApi>,
    settings: Rc<dyn SettingsStore>,
    poller: JobPoller,
    metadata: Metadata,
    layer: Option<LayerChoice>,
    params: ParamValues,
    picker: Option<PointPicker>,
    overlay: OverlayManager,
    error: Option<JobError>,
    area: Option<f64>,
    visible: bool,
    disposed: bool,
    load: OpSlot,
    job: OpSlot,
    clicks: Option<ClickSubscription>,
}

impl PanelState {
    fn phase(&self) -> PanelPhase {
        if self.disposed {
            return PanelPhase::Disposed;
        }
        match self.metadata {
            Metadata::NotLoaded | Metadata::Loading => PanelPhase::Loading,
            Metadata::Failed(_) => PanelPhase::PermanentError,
            Metadata::Ready(_) if self.job.is_busy() => PanelPhase::Processing,
            Metadata::Ready(_) if self.is_picking() => PanelPhase::Picking,
            Metadata::Ready(_) => PanelPhase::Idle,
        }
    }

    fn is_picking(&self) -> bool {
        self.picker.as_ref().is_some_and(PointPicker::is_enabled)
    }

    /// Gate for every mutating operation.
    fn ready_layers(&self) -> Result<&[LayerChoice], InputError> {
        if self.disposed {
            return Err(InputError::Disposed);
        }
        match &self.metadata {
            Metadata::Ready(layers) => Ok(layers),
            _ => Err(InputError::NotReady),
        }
    }

    fn eligible_parameters(&self) -> Result<JobParameters, InputError> {
        self.ready_layers()?;
        if self.job.is_busy() {
            return Err(InputError::Busy);
        }
        let layer = self.layer.ok_or(InputError::NotReady)?;
        self.params
            .job_parameters(self.config, layer, self.overlay.picked_point())
    }

    fn apply_metadata(&mut self, loaded: Result<Vec<String>, String>) {
        let kind = self.config.kind;
        self.metadata = match loaded {
            Ok(assets) => {
                let layers = LayerChoice::available_in(&assets);
                match layers.first().copied() {
                    Some(first) => {
                        info!(%kind, task = %self.task.id, ?layers, "task metadata loaded");
                        self.layer = Some(first);
                        Metadata::Ready(layers)
                    }
                    None => {
                        warn!(%kind, task = %self.task.id, "task has no elevation model");
                        Metadata::Failed(PanelError::NoLayersAvailable { kind })
                    }
                }
            }
            Err(detail) => {
                warn!(%kind, task = %self.task.id, "task metadata unavailable: {detail}");
                Metadata::Failed(PanelError::MetadataLoad(detail))
            }
        };
    }
}

#[derive(Debug, Copy, Clone)]
enum SlotKind {
    Load,
    Job,
}

/// Releases a slot whose operation future is dropped before it resolves,
/// e.g. by a timeout or a losing `select!` arm.
struct SlotGuard {
    state: Weak<RefCell<PanelState>>,
    slot: SlotKind,
    ticket: OpTicket,
}

impl SlotGuard {
    fn new(state: &Rc<RefCell<PanelState>>, slot: SlotKind, ticket: OpTicket) -> Self {
        Self {
            state: Rc::downgrade(state),
            slot,
            ticket,
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let Ok(mut st) = state.try_borrow_mut() else {
            return;
        };
        match self.slot {
            SlotKind::Load if st.load.is_current(self.ticket) => {
                st.load.finish(self.ticket);
                if matches!(st.metadata, Metadata::Loading) {
                    st.metadata = Metadata::NotLoaded;
                }
                debug!("metadata load dropped");
            }
            SlotKind::Job if st.job.is_current(self.ticket) => {
                st.job.finish(self.ticket);
                debug!(kind = %st.config.kind, "job sequence dropped");
            }
            _ => {}
        }
    }
}

/// Handle to one analysis panel. Clones share the same panel.
#[derive(Clone)]
pub struct AnalysisPanel {
    state: Rc<RefCell<PanelState>>,
}

impl std::fmt::Debug for AnalysisPanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("AnalysisPanel")
            .field("kind", &st.config.kind)
            .field("task", &st.task.id)
            .field("phase", &st.phase())
            .finish_non_exhaustive()
    }
}

impl AnalysisPanel {
    /// Creates a hidden panel. Point-picking kinds subscribe to map clicks
    /// right away; the subscription lives until [`AnalysisPanel::dispose`].
    pub fn new(config: &'static KindConfig, task: TaskRef, deps: &PanelDeps) -> Self {
        let params = ParamValues::load(config, deps.settings.as_ref());
        let state = PanelState {
            config,
            task,
            api: Rc::clone(&deps.api),
            settings: Rc::clone(&deps.settings),
            poller: JobPoller::new(Rc::clone(&deps.api), deps.poll.clone()),
            metadata: Metadata::NotLoaded,
            layer: None,
            params,
            picker: config.marker.map(PointPicker::new),
            overlay: OverlayManager::new(Rc::clone(&deps.map)),
            error: None,
            area: None,
            visible: false,
            disposed: false,
            load: OpSlot::new("metadata"),
            job: OpSlot::new("job"),
            clicks: None,
        };
        let panel = Self {
            state: Rc::new(RefCell::new(state)),
        };

        if config.picks_point() {
            let weak: Weak<RefCell<PanelState>> = Rc::downgrade(&panel.state);
            let subscription = deps.clicks.subscribe(Rc::new(move |click: &MapClick| {
                match weak.upgrade() {
                    Some(state) => AnalysisPanel { state }.handle_map_click(click),
                    None => ClickOutcome::Ignored,
                }
            }));
            panel.state.borrow_mut().clicks = Some(subscription);
        }
        panel
    }

    /// Makes the panel visible. The first call loads the task metadata.
    pub async fn show(&self) {
        let (ticket, registration, api, task) = {
            let mut st = self.state.borrow_mut();
            if st.disposed {
                return;
            }
            st.visible = true;
            if !matches!(st.metadata, Metadata::NotLoaded) {
                return;
            }
            let Ok((ticket, registration)) = st.load.begin() else {
                return;
            };
            st.metadata = Metadata::Loading;
            (ticket, registration, Rc::clone(&st.api), st.task.clone())
        };
        let _guard = SlotGuard::new(&self.state, SlotKind::Load, ticket);

        let fetched = Abortable::new(
            async move {
                api.fetch_task(&task)
                    .await
                    .map(|meta| meta.available_assets)
                    .map_err(|err| err.to_string())
            },
            registration,
        )
        .await;

        let Ok(loaded) = fetched else {
            debug!("metadata load cancelled");
            return;
        };
        let mut st = self.state.borrow_mut();
        if st.disposed || !st.load.finish(ticket) {
            return;
        }
        st.apply_metadata(loaded);
    }

    /// Hides the panel. Overlays, marker and in-flight work are kept.
    pub fn hide(&self) {
        self.state.borrow_mut().visible = false;
    }

    pub fn select_layer(&self, layer: LayerChoice) -> Result<(), InputError> {
        let mut st = self.state.borrow_mut();
        if !st.ready_layers()?.contains(&layer) {
            return Err(InputError::UnknownLayer(layer));
        }
        st.layer = Some(layer);
        Ok(())
    }

    pub fn set_param(&self, field: ParamField, value: f64) -> Result<(), InputError> {
        let mut st = self.state.borrow_mut();
        st.ready_layers()?;
        st.params.set(field, value)
    }

    /// Restyles the current overlay and remembers the value immediately.
    pub fn set_opacity(&self, opacity: f64) -> Result<(), InputError> {
        let mut st = self.state.borrow_mut();
        st.ready_layers()?;
        st.params.set_opacity(opacity)?;
        let opacity = st.params.opacity();
        st.overlay.set_overlay_opacity(opacity);
        st.params.persist_opacity(st.config, st.settings.as_ref());
        Ok(())
    }

    /// Flips point picking. Returns whether picking is now on.
    pub fn toggle_picking(&self) -> Result<bool, InputError> {
        let mut st = self.state.borrow_mut();
        st.ready_layers()?;
        let picker = st.picker.as_mut().ok_or(InputError::PickingUnsupported)?;
        Ok(picker.toggle())
    }

    /// Routes a map click to the point picker.
    pub fn handle_map_click(&self, click: &MapClick) -> ClickOutcome {
        let Ok(mut st) = self.state.try_borrow_mut() else {
            return ClickOutcome::Ignored;
        };
        if st.ready_layers().is_err() {
            return ClickOutcome::Ignored;
        }
        let PanelState { picker, overlay, .. } = &mut *st;
        match picker {
            Some(picker) => picker.handle_click(click, overlay),
            None => ClickOutcome::Ignored,
        }
    }

    pub fn can_compute(&self) -> bool {
        self.state.borrow().eligible_parameters().is_ok()
    }

    /// Submits a job with the current parameters, waits for it and renders
    /// the result.
    ///
    /// Ineligible requests are refused with an [`InputError`] before anything
    /// is sent. Job failures are reported as [`ComputeOutcome::Failed`] and
    /// recorded for [`AnalysisPanel::error`]; parameters, the picked point and
    /// the previous overlay are left alone.
    pub async fn compute(&self) -> Result<ComputeOutcome, InputError> {
        let (ticket, registration, params, task, api, poller, config) = {
            let mut st = self.state.borrow_mut();
            let params = st.eligible_parameters()?;
            st.params.persist(st.config, st.settings.as_ref());
            let (ticket, registration) = st.job.begin().map_err(|_| InputError::Busy)?;
            st.error = None;
            if st.config.reports_area {
                st.area = None;
            }
            (
                ticket,
                registration,
                params,
                st.task.id.clone(),
                Rc::clone(&st.api),
                st.poller.clone(),
                st.config,
            )
        };
        let _guard = SlotGuard::new(&self.state, SlotKind::Job, ticket);
        let kind = config.kind;
        info!(%kind, %task, ?params, "submitting job");

        let run = async move {
            let job = submit_job(api.as_ref(), &task, &params).await?;
            poller
                .track(kind, task, job)
                .await_completion()
                .await?
                .fetch_output()
                .await
        };
        let finished = Abortable::new(run, registration).await;

        let Ok(result) = finished else {
            debug!(%kind, "job sequence cancelled");
            return Ok(ComputeOutcome::Cancelled);
        };
        let mut st = self.state.borrow_mut();
        if st.disposed || !st.job.finish(ticket) {
            return Ok(ComputeOutcome::Cancelled);
        }
        match result {
            Ok(result) => {
                let opacity = st.params.opacity();
                st.overlay.set_overlay(result.image_url.clone(), result.bounds, opacity);
                if config.reports_area {
                    st.area = result.area;
                }
                info!(%kind, url = %result.image_url, "result rendered");
                Ok(ComputeOutcome::Rendered(result))
            }
            Err(err) => {
                warn!(%kind, "computation failed: {err}");
                st.error = Some(err.clone());
                Ok(ComputeOutcome::Failed(err))
            }
        }
    }

    /// Removes overlay and marker, forgets the point and area, stops picking.
    pub fn clear(&self) -> Result<(), InputError> {
        let mut st = self.state.borrow_mut();
        st.ready_layers()?;
        st.overlay.clear();
        st.area = None;
        if let Some(picker) = st.picker.as_mut() {
            picker.disable();
        }
        Ok(())
    }

    /// Tears the panel down: cancels in-flight work, removes everything it
    /// put on the map and releases the click subscription. Idempotent.
    pub fn dispose(&self) {
        let subscription = {
            let mut st = self.state.borrow_mut();
            if st.disposed {
                return;
            }
            st.disposed = true;
            st.visible = false;
            st.load.cancel();
            if st.job.cancel().is_some() {
                info!(kind = %st.config.kind, "abandoning running job");
            }
            st.overlay.clear();
            st.area = None;
            if let Some(picker) = st.picker.as_mut() {
                picker.disable();
            }
            st.clicks.take()
        };
        drop(subscription);
    }

    pub fn config(&self) -> &'static KindConfig {
        self.state.borrow().config
    }

    pub fn task(&self) -> TaskRef {
        self.state.borrow().task.clone()
    }

    pub fn phase(&self) -> PanelPhase {
        self.state.borrow().phase()
    }

    pub fn is_visible(&self) -> bool {
        self.state.borrow().visible
    }

    pub fn is_picking(&self) -> bool {
        self.state.borrow().is_picking()
    }

    pub fn layers(&self) -> Vec<LayerChoice> {
        match &self.state.borrow().metadata {
            Metadata::Ready(layers) => layers.clone(),
            _ => Vec::new(),
        }
    }

    pub fn layer(&self) -> Option<LayerChoice> {
        self.state.borrow().layer
    }

    pub fn param(&self, field: ParamField) -> Option<f64> {
        self.state.borrow().params.get(field)
    }

    pub fn opacity(&self) -> f64 {
        self.state.borrow().params.opacity()
    }

    pub fn picked_point(&self) -> Option<LatLng> {
        self.state.borrow().overlay.picked_point()
    }

    /// The last job failure, cleared when a new computation starts.
    pub fn error(&self) -> Option<JobError> {
        self.state.borrow().error.clone()
    }

    pub fn permanent_error(&self) -> Option<PanelError> {
        match &self.state.borrow().metadata {
            Metadata::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    pub fn area(&self) -> Option<f64> {
        self.state.borrow().area
    }

    pub fn area_label(&self) -> Option<String> {
        self.area().map(format_area)
    }

    pub fn has_overlay(&self) -> bool {
        self.state.borrow().overlay.has_overlay()
    }

    pub fn has_marker(&self) -> bool {
        self.state.borrow().overlay.has_marker()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::time::Duration;

    use foundation::{GeoBounds, LatLng};
    use jobs::mock::ScriptedApi;
    use jobs::{ApiError, JobError, JobParameters, LayerChoice, PollConfig, StatusReply, TaskRef};
    use layers::{InMemoryMap, MapEdit, MapLayer};
    use pretty_assertions::assert_eq;
    use runtime::{ClickOutcome, MapClick, MapClickBus};
    use serde_json::json;
    use settings::{InMemorySettings, SettingsStore};
    use tokio::task::LocalSet;

    use super::{AnalysisPanel, ComputeOutcome, PanelDeps, PanelPhase};
    use crate::error::{InputError, PanelError};
    use crate::kind::{HILLSHADE, KindConfig, ParamField, VIEWSHED, WATERSHED};

    struct Harness {
        api: Rc<ScriptedApi>,
        map: Rc<InMemoryMap>,
        bus: MapClickBus,
        settings: Rc<InMemorySettings>,
        deps: PanelDeps,
    }

    impl Harness {
        fn new(api: ScriptedApi) -> Self {
            Self::with_settings(api, InMemorySettings::new())
        }

        fn with_settings(api: ScriptedApi, settings: InMemorySettings) -> Self {
            let api = Rc::new(api);
            let map = Rc::new(InMemoryMap::new());
            let bus = MapClickBus::new();
            let settings = Rc::new(settings);
            let deps = PanelDeps {
                api: api.clone(),
                map: map.clone(),
                clicks: Rc::new(bus.clone()),
                settings: settings.clone(),
                poll: PollConfig::default(),
            };
            Self {
                api,
                map,
                bus,
                settings,
                deps,
            }
        }

        fn panel(&self, config: &'static KindConfig) -> AnalysisPanel {
            AnalysisPanel::new(config, TaskRef::new("t1", 7), &self.deps)
        }

        async fn ready_panel(&self, config: &'static KindConfig) -> AnalysisPanel {
            let panel = self.panel(config);
            panel.show().await;
            assert_eq!(panel.phase(), PanelPhase::Idle);
            panel
        }

        fn setting(&self, key: &str) -> Option<String> {
            self.settings.get(key).unwrap()
        }
    }

    const BOUNDS: [[f64; 2]; 2] = [[10.0, 10.0], [11.0, 11.0]];

    #[tokio::test]
    async fn loads_layers_once_on_first_show() {
        let h = Harness::new(ScriptedApi::with_assets(&["orthophoto.tif", "dtm.tif", "dsm.tif"]));
        let panel = h.panel(&HILLSHADE);
        assert_eq!(panel.phase(), PanelPhase::Loading);
        assert!(!panel.is_visible());

        panel.show().await;
        assert!(panel.is_visible());
        assert_eq!(panel.layers(), vec![LayerChoice::Dsm, LayerChoice::Dtm]);
        assert_eq!(panel.layer(), Some(LayerChoice::Dsm));

        panel.hide();
        panel.show().await;
        assert_eq!(h.api.calls().len(), 1);

        panel.select_layer(LayerChoice::Dtm).unwrap();
        assert_eq!(panel.layer(), Some(LayerChoice::Dtm));
    }

    #[tokio::test]
    async fn missing_elevation_models_is_permanent() {
        let h = Harness::new(ScriptedApi::with_assets(&["orthophoto.tif"]));
        let panel = h.panel(&VIEWSHED);
        panel.show().await;

        assert_eq!(panel.phase(), PanelPhase::PermanentError);
        let err = panel.permanent_error().unwrap();
        assert_eq!(
            err,
            PanelError::NoLayersAvailable {
                kind: jobs::AnalysisKind::Viewshed
            }
        );
        assert!(err.to_string().contains("To compute a viewshed"));

        assert!(!panel.can_compute());
        assert_eq!(panel.compute().await, Err(InputError::NotReady));
        assert_eq!(panel.toggle_picking(), Err(InputError::NotReady));
        assert_eq!(panel.set_param(ParamField::Height, 2.0), Err(InputError::NotReady));
        assert_eq!(panel.set_opacity(0.5), Err(InputError::NotReady));
        assert_eq!(panel.select_layer(LayerChoice::Dsm), Err(InputError::NotReady));
        assert_eq!(panel.clear(), Err(InputError::NotReady));
        assert_eq!(h.bus.dispatch(MapClick::at(1.0, 1.0)), ClickOutcome::Ignored);
        assert_eq!(h.api.submit_count(), 0);
    }

    #[tokio::test]
    async fn metadata_transport_failure_is_permanent() {
        let api = ScriptedApi::new();
        api.push_task(Err(ApiError::Transport("dns error".into())));
        let h = Harness::new(api);
        let panel = h.panel(&HILLSHADE);
        panel.show().await;

        assert_eq!(panel.phase(), PanelPhase::PermanentError);
        assert_eq!(
            panel.permanent_error(),
            Some(PanelError::MetadataLoad("request failed: dns error".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hillshade_renders_with_defaults() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        h.api.script_success("job-1", BOUNDS, None);
        let panel = h.ready_panel(&HILLSHADE).await;
        assert!(panel.can_compute());

        let outcome = panel.compute().await.unwrap();
        let ComputeOutcome::Rendered(result) = outcome else {
            panic!("expected a rendered result, got {outcome:?}");
        };
        assert_eq!(result.bounds, GeoBounds::from(BOUNDS));
        assert_eq!(
            h.api.calls()[1],
            jobs::mock::ApiCall::Submit(JobParameters::Hillshade {
                layer: LayerChoice::Dsm,
                azimuth: 315.0,
                altitude: 30.0
            })
        );

        let overlays = h.map.image_overlays();
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].1.bounds, GeoBounds::from(BOUNDS));
        assert_eq!(overlays[0].1.opacity, 0.7);
        assert_eq!(
            overlays[0].1.image_url,
            "/api/plugins/hillshade/task/t1/hillshade/result/job-1?serve=image"
        );
        assert_eq!(panel.phase(), PanelPhase::Idle);
        assert_eq!(panel.error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn overlay_uses_the_stored_opacity() {
        let settings = InMemorySettings::with_values([("last_hillshade_opacity", "0.4")]);
        let h = Harness::with_settings(ScriptedApi::with_assets(&["dsm.tif"]), settings);
        h.api.script_success("job-1", BOUNDS, None);
        let panel = h.ready_panel(&HILLSHADE).await;
        assert_eq!(panel.opacity(), 0.4);

        panel.compute().await.unwrap();
        assert_eq!(h.map.image_overlays()[0].1.opacity, 0.4);
    }

    #[tokio::test(start_paused = true)]
    async fn new_result_replaces_the_previous_overlay() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        h.api.script_success("job-1", BOUNDS, None);
        h.api.script_success("job-2", [[20.0, 20.0], [21.0, 21.0]], None);
        let panel = h.ready_panel(&HILLSHADE).await;

        panel.compute().await.unwrap();
        let first = h.map.image_overlays()[0].0;
        panel.compute().await.unwrap();

        let overlays = h.map.image_overlays();
        assert_eq!(overlays.len(), 1);
        assert!(h.map.layer(first).is_none());
        let edits = h.map.edits();
        let removed_at = edits.iter().position(|e| *e == MapEdit::Removed(first)).unwrap();
        let added_at = edits
            .iter()
            .rposition(|e| matches!(e, MapEdit::Added(_)))
            .unwrap();
        assert!(removed_at < added_at);
    }

    #[tokio::test(start_paused = true)]
    async fn persisted_settings_are_the_submitted_values() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        h.api.script_success("job-1", BOUNDS, None);
        let panel = h.ready_panel(&HILLSHADE).await;

        panel.set_param(ParamField::Azimuth, 200.0).unwrap();
        panel.set_param(ParamField::Altitude, 45.0).unwrap();
        panel.compute().await.unwrap();
        panel.set_param(ParamField::Azimuth, 100.0).unwrap();

        assert_eq!(h.setting("last_hillshade_azimuth").as_deref(), Some("200"));
        assert_eq!(h.setting("last_hillshade_altitude").as_deref(), Some("45"));
        assert_eq!(panel.param(ParamField::Azimuth), Some(100.0));

        // a fresh panel starts from the last submission
        let api = ScriptedApi::with_assets(&["dsm.tif"]);
        let settings = InMemorySettings::with_values(h.settings.snapshot());
        let next = Harness::with_settings(api, settings).panel(&HILLSHADE);
        assert_eq!(next.param(ParamField::Azimuth), Some(200.0));
        assert_eq!(next.param(ParamField::Altitude), Some(45.0));
    }

    #[tokio::test]
    async fn rejected_edits_leave_values_alone() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        let panel = h.ready_panel(&HILLSHADE).await;

        assert!(matches!(
            panel.set_param(ParamField::Altitude, 91.0),
            Err(InputError::InvalidValue { field: "altitude", .. })
        ));
        assert_eq!(
            panel.set_param(ParamField::Height, 2.0),
            Err(InputError::UnsupportedField(ParamField::Height))
        );
        assert_eq!(
            panel.select_layer(LayerChoice::Dtm),
            Err(InputError::UnknownLayer(LayerChoice::Dtm))
        );
        assert_eq!(panel.toggle_picking(), Err(InputError::PickingUnsupported));
        assert_eq!(panel.param(ParamField::Altitude), Some(30.0));
    }

    #[tokio::test]
    async fn picking_places_a_single_marker() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        let panel = h.ready_panel(&VIEWSHED).await;
        assert!(!panel.can_compute());
        assert_eq!(panel.compute().await, Err(InputError::MissingPoint));

        assert_eq!(h.bus.dispatch(MapClick::at(1.0, 1.0)), ClickOutcome::Ignored);
        assert_eq!(panel.toggle_picking(), Ok(true));
        assert_eq!(panel.phase(), PanelPhase::Picking);
        assert_eq!(h.bus.dispatch(MapClick::at(45.0, 9.0)), ClickOutcome::Consumed);

        assert_eq!(panel.phase(), PanelPhase::Idle);
        assert_eq!(panel.picked_point(), Some(LatLng::new(45.0, 9.0)));
        let markers = h.map.markers();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].1.style.fill_color, "#f03");
        assert!(panel.can_compute());

        panel.toggle_picking().unwrap();
        h.bus.dispatch(MapClick::at(46.0, 10.0));
        assert_eq!(h.map.markers().len(), 1);
        assert_eq!(panel.picked_point(), Some(LatLng::new(46.0, 10.0)));
    }

    #[tokio::test]
    async fn toggling_twice_picks_nothing() {
        let h = Harness::new(ScriptedApi::with_assets(&["dtm.tif"]));
        let panel = h.ready_panel(&WATERSHED).await;

        panel.toggle_picking().unwrap();
        assert_eq!(panel.toggle_picking(), Ok(false));
        assert_eq!(h.bus.dispatch(MapClick::at(45.0, 9.0)), ClickOutcome::Ignored);
        assert_eq!(panel.picked_point(), None);
        assert!(!panel.has_marker());
    }

    #[tokio::test(start_paused = true)]
    async fn viewshed_failure_keeps_the_point() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        h.api.push_submit(Ok(json!({"error": "queue full"})));
        let panel = h.ready_panel(&VIEWSHED).await;

        panel.toggle_picking().unwrap();
        h.bus.dispatch(MapClick::at(45.0, 9.0));
        panel.set_param(ParamField::Height, 2.5).unwrap();

        let outcome = panel.compute().await.unwrap();
        assert_eq!(
            outcome,
            ComputeOutcome::Failed(JobError::Submission("queue full".into()))
        );
        assert_eq!(panel.error().map(|e| e.to_string()).as_deref(), Some("queue full"));
        assert_eq!(panel.picked_point(), Some(LatLng::new(45.0, 9.0)));
        assert!(panel.has_marker());
        assert!(!panel.has_overlay());
        assert_eq!(panel.param(ParamField::Height), Some(2.5));
        assert_eq!(panel.phase(), PanelPhase::Idle);
        assert_eq!(h.setting("last_viewshed_height").as_deref(), Some("2.5"));

        // the next attempt starts without the stale error
        h.api.script_success("job-2", BOUNDS, None);
        assert!(matches!(panel.compute().await, Ok(ComputeOutcome::Rendered(_))));
        assert_eq!(panel.error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_keeps_the_previous_overlay() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        h.api.script_success("job-1", BOUNDS, None);
        h.api.push_submit(Ok(json!({"celery_task_id": "job-2"})));
        h.api.push_status(Ok(StatusReply::failed("out of memory")));
        let panel = h.ready_panel(&HILLSHADE).await;

        panel.compute().await.unwrap();
        let outcome = panel.compute().await.unwrap();
        assert_eq!(
            outcome,
            ComputeOutcome::Failed(JobError::JobFailed("out of memory".into()))
        );
        assert_eq!(h.map.image_overlays().len(), 1);
        assert!(panel.has_overlay());
    }

    #[tokio::test(start_paused = true)]
    async fn watershed_reports_area() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        h.api.script_success("job-1", BOUNDS, Some(15000.0));
        let panel = h.ready_panel(&WATERSHED).await;
        panel.toggle_picking().unwrap();
        h.bus.dispatch(MapClick::at(45.0, 9.0));

        panel.compute().await.unwrap();
        assert_eq!(panel.area(), Some(15000.0));
        assert_eq!(panel.area_label().as_deref(), Some("1.50 ha"));
        assert_eq!(
            h.api.calls()[1],
            jobs::mock::ApiCall::Submit(JobParameters::Watershed {
                layer: LayerChoice::Dsm,
                lat: 45.0,
                lng: 9.0,
                snap_distance: 100.0
            })
        );

        // a failing rerun resets the area
        h.api.push_submit(Ok(json!({"error": "busy"})));
        panel.compute().await.unwrap();
        assert_eq!(panel.area(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_is_idempotent() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        h.api.script_success("job-1", BOUNDS, Some(500.0));
        let panel = h.ready_panel(&WATERSHED).await;
        panel.toggle_picking().unwrap();
        h.bus.dispatch(MapClick::at(45.0, 9.0));
        panel.compute().await.unwrap();
        panel.toggle_picking().unwrap();

        panel.clear().unwrap();
        let after_once = h.map.edits().len();
        panel.clear().unwrap();

        assert_eq!(h.map.edits().len(), after_once);
        assert!(h.map.is_empty());
        assert!(!panel.has_overlay());
        assert!(!panel.has_marker());
        assert_eq!(panel.picked_point(), None);
        assert_eq!(panel.area(), None);
        assert!(!panel.is_picking());
    }

    #[tokio::test(start_paused = true)]
    async fn opacity_applies_live_and_persists() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        h.api.script_success("job-1", BOUNDS, None);
        let panel = h.ready_panel(&HILLSHADE).await;
        panel.compute().await.unwrap();

        panel.set_opacity(0.3).unwrap();
        assert_eq!(h.map.image_overlays()[0].1.opacity, 0.3);
        assert_eq!(h.setting("last_hillshade_opacity").as_deref(), Some("0.3"));
        assert!(panel.set_opacity(1.2).is_err());
        assert_eq!(panel.opacity(), 0.3);
    }

    #[tokio::test]
    async fn foreign_layers_survive_clear_and_dispose() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        let foreign = {
            use layers::MapSurface;
            h.map.add_layer(MapLayer::Marker(layers::CircleMarker::new(
                LatLng::new(0.0, 0.0),
                layers::MarkerStyle::default(),
            )))
        };
        let panel = h.ready_panel(&VIEWSHED).await;
        panel.toggle_picking().unwrap();
        h.bus.dispatch(MapClick::at(45.0, 9.0));

        panel.clear().unwrap();
        panel.dispose();
        assert_eq!(h.map.len(), 1);
        assert!(h.map.layer(foreign).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn second_compute_while_processing_is_refused() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        h.api.push_submit(Ok(json!({"celery_task_id": "job-1"})));
        let gate = h.api.gate_status();
        let panel = h.ready_panel(&HILLSHADE).await;

        LocalSet::new()
            .run_until(async {
                let running = tokio::task::spawn_local({
                    let panel = panel.clone();
                    async move { panel.compute().await }
                });
                while h.api.status_count() == 0 {
                    tokio::task::yield_now().await;
                }
                assert_eq!(panel.phase(), PanelPhase::Processing);
                assert!(!panel.can_compute());
                assert_eq!(panel.compute().await, Err(InputError::Busy));

                gate.send(Ok(StatusReply::failed("stopped"))).unwrap();
                let outcome = running.await.unwrap().unwrap();
                assert!(matches!(outcome, ComputeOutcome::Failed(_)));
            })
            .await;

        assert_eq!(h.api.submit_count(), 1);
        assert_eq!(panel.phase(), PanelPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_during_poll_drops_the_result() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        h.api.push_submit(Ok(json!({"celery_task_id": "job-1"})));
        let gate = h.api.gate_status();
        let panel = h.ready_panel(&WATERSHED).await;
        panel.toggle_picking().unwrap();
        h.bus.dispatch(MapClick::at(45.0, 9.0));
        assert_eq!(h.bus.len(), 1);

        LocalSet::new()
            .run_until(async {
                let running = tokio::task::spawn_local({
                    let panel = panel.clone();
                    async move { panel.compute().await }
                });
                while h.api.status_count() == 0 {
                    tokio::task::yield_now().await;
                }

                panel.dispose();
                let _ = gate.send(Ok(StatusReply::ready()));
                let outcome = running.await.unwrap();
                assert_eq!(outcome, Ok(ComputeOutcome::Cancelled));
            })
            .await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(panel.phase(), PanelPhase::Disposed);
        assert!(h.map.is_empty());
        assert!(h.map.image_overlays().is_empty());
        assert_eq!(h.api.output_count(), 0);
        assert!(h.bus.is_empty());

        panel.dispose();
        assert_eq!(panel.compute().await, Err(InputError::Disposed));
        assert_eq!(h.bus.dispatch(MapClick::at(1.0, 1.0)), ClickOutcome::Ignored);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_during_submit_drops_the_result() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        let gate = h.api.gate_submit();
        let panel = h.ready_panel(&VIEWSHED).await;
        panel.toggle_picking().unwrap();
        h.bus.dispatch(MapClick::at(45.0, 9.0));

        LocalSet::new()
            .run_until(async {
                let running = tokio::task::spawn_local({
                    let panel = panel.clone();
                    async move { panel.compute().await }
                });
                while h.api.submit_count() == 0 {
                    tokio::task::yield_now().await;
                }

                panel.dispose();
                let _ = gate.send(Ok(json!({"celery_task_id": "job-1"})));
                let outcome = running.await.unwrap();
                assert_eq!(outcome, Ok(ComputeOutcome::Cancelled));
            })
            .await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.api.status_count(), 0);
        assert_eq!(h.api.output_count(), 0);
        assert!(h.map.is_empty());
        assert_eq!(panel.phase(), PanelPhase::Disposed);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_compute_releases_the_job() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        h.api.push_submit(Ok(json!({"celery_task_id": "job-1"})));
        let _gate = h.api.gate_status();
        let panel = h.ready_panel(&HILLSHADE).await;

        let timed_out = tokio::time::timeout(Duration::from_secs(1), panel.compute()).await;
        assert!(timed_out.is_err());
        assert_eq!(h.api.status_count(), 1);
        assert_eq!(panel.phase(), PanelPhase::Idle);
        assert!(panel.can_compute());

        h.api.script_success("job-2", BOUNDS, None);
        assert!(matches!(panel.compute().await, Ok(ComputeOutcome::Rendered(_))));
        assert_eq!(h.api.submit_count(), 2);
        assert_eq!(h.map.image_overlays().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_show_loads_on_the_next_show() {
        let api = ScriptedApi::new();
        let _gate = api.gate_task();
        api.push_task(Ok(jobs::TaskMetadata {
            available_assets: vec!["dsm.tif".into()],
        }));
        let h = Harness::new(api);
        let panel = h.panel(&HILLSHADE);

        let timed_out = tokio::time::timeout(Duration::from_secs(1), panel.show()).await;
        assert!(timed_out.is_err());
        assert_eq!(panel.phase(), PanelPhase::Loading);

        panel.show().await;
        assert_eq!(h.api.calls().len(), 2);
        assert_eq!(panel.phase(), PanelPhase::Idle);
        assert_eq!(panel.layers(), vec![LayerChoice::Dsm]);
    }

    #[tokio::test]
    async fn dispose_during_load_keeps_loading_state() {
        let api = ScriptedApi::new();
        let gate = api.gate_task();
        let h = Harness::new(api);
        let panel = h.panel(&HILLSHADE);

        LocalSet::new()
            .run_until(async {
                let showing = tokio::task::spawn_local({
                    let panel = panel.clone();
                    async move { panel.show().await }
                });
                while h.api.calls().is_empty() {
                    tokio::task::yield_now().await;
                }
                panel.dispose();
                let _ = gate.send(Ok(jobs::TaskMetadata {
                    available_assets: vec!["dsm.tif".into()],
                }));
                showing.await.unwrap();
            })
            .await;

        assert_eq!(panel.phase(), PanelPhase::Disposed);
        assert!(panel.layers().is_empty());
    }

    #[tokio::test]
    async fn hide_keeps_overlay_state() {
        let h = Harness::new(ScriptedApi::with_assets(&["dsm.tif"]));
        let panel = h.ready_panel(&VIEWSHED).await;
        panel.toggle_picking().unwrap();
        h.bus.dispatch(MapClick::at(45.0, 9.0));

        panel.hide();
        assert!(!panel.is_visible());
        assert!(panel.has_marker());
        assert_eq!(h.bus.len(), 1);
    }
}

use std::collections::BTreeSet;

use jobs::{AnalysisKind, TaskRef};
use tracing::{debug, info};

use crate::kind::KindConfig;
use crate::panel::{AnalysisPanel, PanelDeps};

/// Map corner a control is docked to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ControlPosition {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Map button that opens one analysis panel.
#[derive(Debug, Clone)]
pub struct AnalysisControl {
    panel: AnalysisPanel,
    position: ControlPosition,
}

impl AnalysisControl {
    pub fn new(config: &'static KindConfig, task: TaskRef, deps: &PanelDeps) -> Self {
        Self {
            panel: AnalysisPanel::new(config, task, deps),
            position: ControlPosition::TopRight,
        }
    }

    pub fn kind(&self) -> AnalysisKind {
        self.panel.config().kind
    }

    pub fn title(&self) -> &'static str {
        self.panel.config().title
    }

    pub fn position(&self) -> ControlPosition {
        self.position
    }

    pub fn panel(&self) -> &AnalysisPanel {
        &self.panel
    }

    pub async fn open(&self) {
        self.panel.show().await;
    }

    pub fn close(&self) {
        self.panel.hide();
    }

    pub fn is_open(&self) -> bool {
        self.panel.is_visible()
    }

    /// Detaches the control; the panel is disposed.
    pub fn remove(self) {
        debug!(kind = %self.kind(), "removing control");
        self.panel.dispose();
    }
}

/// Registers one control per analysis kind when the map shows exactly one
/// task. Duplicate entries for the same task count once.
pub fn mount_controls(tasks: &[TaskRef], deps: &PanelDeps) -> Vec<AnalysisControl> {
    let ids: BTreeSet<_> = tasks.iter().map(|t| &t.id).collect();
    if ids.len() != 1 {
        debug!(tasks = ids.len(), "analysis controls need exactly one task");
        return Vec::new();
    }
    let Some(task) = tasks.first() else {
        return Vec::new();
    };

    info!(task = %task.id, "mounting analysis controls");
    AnalysisKind::ALL
        .into_iter()
        .map(|kind| AnalysisControl::new(KindConfig::for_kind(kind), task.clone(), deps))
        .collect()
}

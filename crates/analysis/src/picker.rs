use layers::{MarkerStyle, OverlayManager};
use runtime::{ClickOutcome, MapClick};
use tracing::debug;

/// On/off switch for capturing the next map click as the analysis point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointPicker {
    enabled: bool,
    style: MarkerStyle,
}

impl PointPicker {
    pub fn new(style: MarkerStyle) -> Self {
        Self {
            enabled: false,
            style,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the new state.
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Places the marker and switches off if picking, otherwise lets the
    /// click through.
    pub fn handle_click(&mut self, click: &MapClick, overlay: &mut OverlayManager) -> ClickOutcome {
        if !self.enabled {
            return ClickOutcome::Ignored;
        }
        overlay.place_marker(click.latlng, self.style);
        self.enabled = false;
        debug!(point = %click.latlng, "point picked");
        ClickOutcome::Consumed
    }
}

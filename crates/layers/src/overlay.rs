use std::rc::Rc;

use foundation::{GeoBounds, LatLng};
use tracing::debug;

use crate::layer::{LayerId, MapLayer, MapSurface};
use crate::raster::ImageOverlay;
use crate::symbology::{CircleMarker, MarkerStyle};

/// Owns one panel's result overlay, its marker and the picked point.
///
/// Ownership contract:
/// - At most one image overlay and one marker are attached at any time.
/// - Replacing either detaches the old layer before attaching the new one.
/// - Only layers created here are ever removed or restyled; the map itself is
///   shared with other panels.
pub struct OverlayManager {
    map: Rc<dyn MapSurface>,
    overlay: Option<LayerId>,
    marker: Option<LayerId>,
    picked: Option<LatLng>,
}

impl std::fmt::Debug for OverlayManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayManager")
            .field("overlay", &self.overlay)
            .field("marker", &self.marker)
            .field("picked", &self.picked)
            .finish_non_exhaustive()
    }
}

impl OverlayManager {
    pub fn new(map: Rc<dyn MapSurface>) -> Self {
        Self {
            map,
            overlay: None,
            marker: None,
            picked: None,
        }
    }

    pub fn overlay_id(&self) -> Option<LayerId> {
        self.overlay
    }

    pub fn has_overlay(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn has_marker(&self) -> bool {
        self.marker.is_some()
    }

    pub fn picked_point(&self) -> Option<LatLng> {
        self.picked
    }

    pub fn is_empty(&self) -> bool {
        self.overlay.is_none() && self.marker.is_none() && self.picked.is_none()
    }

    pub fn set_overlay(
        &mut self,
        image_url: impl Into<String>,
        bounds: GeoBounds,
        opacity: f64,
    ) -> LayerId {
        if let Some(old) = self.overlay.take() {
            self.map.remove_layer(old);
        }
        let overlay = ImageOverlay::new(image_url, bounds, opacity);
        debug!(url = %overlay.image_url, ?bounds, opacity = overlay.opacity, "attaching overlay");
        let id = self.map.add_layer(MapLayer::Image(overlay));
        self.overlay = Some(id);
        id
    }

    /// Restyles the attached overlay in place. No-op without one.
    pub fn set_overlay_opacity(&mut self, opacity: f64) -> bool {
        match self.overlay {
            Some(id) => self.map.set_opacity(id, opacity),
            None => false,
        }
    }

    pub fn place_marker(&mut self, point: LatLng, style: MarkerStyle) -> LayerId {
        if let Some(old) = self.marker.take() {
            self.map.remove_layer(old);
        }
        let id = self
            .map
            .add_layer(MapLayer::Marker(CircleMarker::new(point, style)));
        self.marker = Some(id);
        self.picked = Some(point);
        id
    }

    pub fn clear(&mut self) {
        if let Some(id) = self.overlay.take() {
            self.map.remove_layer(id);
        }
        if let Some(id) = self.marker.take() {
            self.map.remove_layer(id);
        }
        self.picked = None;
    }
}

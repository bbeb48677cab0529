use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::layer::{LayerId, MapLayer, MapSurface};
use crate::raster::{ImageOverlay, clamp_opacity};
use crate::symbology::CircleMarker;

/// A mutation applied to an [`InMemoryMap`], in order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MapEdit {
    Added(LayerId),
    Removed(LayerId),
    OpacityChanged(LayerId),
}

/// Headless map surface.
///
/// Keeps layers in id order and records every edit so callers can check
/// ordering guarantees such as detach-before-attach.
#[derive(Debug, Default)]
pub struct InMemoryMap {
    next_id: Cell<u64>,
    layers: RefCell<BTreeMap<LayerId, MapLayer>>,
    edits: RefCell<Vec<MapEdit>>,
}

impl InMemoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.layers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn layer(&self, id: LayerId) -> Option<MapLayer> {
        self.layers.borrow().get(&id).cloned()
    }

    pub fn image_overlays(&self) -> Vec<(LayerId, ImageOverlay)> {
        self.layers
            .borrow()
            .iter()
            .filter_map(|(id, l)| match l {
                MapLayer::Image(img) => Some((*id, img.clone())),
                MapLayer::Marker(_) => None,
            })
            .collect()
    }

    pub fn markers(&self) -> Vec<(LayerId, CircleMarker)> {
        self.layers
            .borrow()
            .iter()
            .filter_map(|(id, l)| match l {
                MapLayer::Marker(m) => Some((*id, *m)),
                MapLayer::Image(_) => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<MapEdit> {
        self.edits.borrow().clone()
    }
}

impl MapSurface for InMemoryMap {
    fn add_layer(&self, layer: MapLayer) -> LayerId {
        let id = LayerId(self.next_id.get());
        self.next_id.set(id.0.wrapping_add(1));
        self.layers.borrow_mut().insert(id, layer);
        self.edits.borrow_mut().push(MapEdit::Added(id));
        id
    }

    fn remove_layer(&self, id: LayerId) -> bool {
        let removed = self.layers.borrow_mut().remove(&id).is_some();
        if removed {
            self.edits.borrow_mut().push(MapEdit::Removed(id));
        }
        removed
    }

    fn set_opacity(&self, id: LayerId, opacity: f64) -> bool {
        let mut layers = self.layers.borrow_mut();
        let Some(MapLayer::Image(img)) = layers.get_mut(&id) else {
            return false;
        };
        img.opacity = clamp_opacity(opacity);
        self.edits.borrow_mut().push(MapEdit::OpacityChanged(id));
        true
    }
}

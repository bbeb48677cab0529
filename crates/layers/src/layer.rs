use crate::raster::ImageOverlay;
use crate::symbology::CircleMarker;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub u64);

/// Anything a panel can put on the map.
#[derive(Debug, Clone, PartialEq)]
pub enum MapLayer {
    Image(ImageOverlay),
    Marker(CircleMarker),
}

/// The host map, shared by every panel that draws on it.
///
/// Methods take `&self`: the map is borrowed by many owners at once and
/// implementations use interior mutability. Panels must only remove or
/// restyle layers they added themselves.
pub trait MapSurface {
    fn add_layer(&self, layer: MapLayer) -> LayerId;

    /// Returns `false` if `id` was not on the map.
    fn remove_layer(&self, id: LayerId) -> bool;

    /// Returns `false` if `id` was not on the map or has no opacity.
    fn set_opacity(&self, id: LayerId, opacity: f64) -> bool;
}

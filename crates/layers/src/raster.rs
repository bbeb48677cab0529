use foundation::GeoBounds;

/// Georeferenced image drawn over the map.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOverlay {
    pub image_url: String,
    pub bounds: GeoBounds,
    pub opacity: f64,
}

impl ImageOverlay {
    pub fn new(image_url: impl Into<String>, bounds: GeoBounds, opacity: f64) -> Self {
        Self {
            image_url: image_url.into(),
            bounds,
            opacity: clamp_opacity(opacity),
        }
    }
}

pub fn clamp_opacity(opacity: f64) -> f64 {
    if opacity.is_nan() {
        return 1.0;
    }
    opacity.clamp(0.0, 1.0)
}

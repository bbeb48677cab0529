use foundation::LatLng;

/// Circle marker symbology, in CSS terms.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MarkerStyle {
    pub radius_px: f32,
    pub stroke_color: &'static str,
    pub stroke_weight_px: f32,
    pub fill_color: &'static str,
    pub fill_opacity: f32,
}

impl MarkerStyle {
    pub const fn filled(fill_color: &'static str) -> Self {
        Self {
            radius_px: 8.0,
            stroke_color: "#fff",
            stroke_weight_px: 2.0,
            fill_color,
            fill_opacity: 0.9,
        }
    }
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self::filled("#f03")
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CircleMarker {
    pub center: LatLng,
    pub style: MarkerStyle,
}

impl CircleMarker {
    pub const fn new(center: LatLng, style: MarkerStyle) -> Self {
        Self { center, style }
    }
}

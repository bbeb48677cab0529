//! Per-analysis configuration.
//!
//! The three analyses share one panel implementation; everything that differs
//! between them lives in a [`KindConfig`].

use jobs::AnalysisKind;
use layers::MarkerStyle;

/// A numeric job parameter the user can edit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ParamField {
    /// Light source direction, degrees clockwise from north.
    Azimuth,
    /// Light source elevation above the horizon, degrees.
    Altitude,
    /// Observer height above ground, meters.
    Height,
    /// Radius used to snap the outlet to the nearest stream, meters.
    SnapDistance,
}

impl ParamField {
    /// Name on the wire and in settings keys.
    pub fn key(self) -> &'static str {
        match self {
            ParamField::Azimuth => "azimuth",
            ParamField::Altitude => "altitude",
            ParamField::Height => "height",
            ParamField::SnapDistance => "snap_distance",
        }
    }

    pub fn default_value(self) -> f64 {
        match self {
            ParamField::Azimuth => 315.0,
            ParamField::Altitude => 30.0,
            ParamField::Height => 1.7,
            ParamField::SnapDistance => 100.0,
        }
    }

    pub fn accepts(self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            ParamField::Azimuth => (0.0..=360.0).contains(&value),
            ParamField::Altitude => (0.0..=90.0).contains(&value),
            ParamField::Height => value > 0.0,
            ParamField::SnapDistance => value >= 0.0,
        }
    }
}

impl std::str::FromStr for ParamField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "azimuth" => Ok(ParamField::Azimuth),
            "altitude" => Ok(ParamField::Altitude),
            "height" => Ok(ParamField::Height),
            "snap_distance" => Ok(ParamField::SnapDistance),
            other => Err(format!("unknown parameter {other}")),
        }
    }
}

pub const OPACITY_KEY: &str = "opacity";
pub const DEFAULT_OPACITY: f64 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub struct KindConfig {
    pub kind: AnalysisKind,
    pub title: &'static str,
    pub fields: &'static [ParamField],
    /// `Some` for analyses that need a point picked on the map.
    pub marker: Option<MarkerStyle>,
    /// Whether results carry a catchment area worth showing.
    pub reports_area: bool,
}

pub const HILLSHADE: KindConfig = KindConfig {
    kind: AnalysisKind::Hillshade,
    title: "Hillshade",
    fields: &[ParamField::Azimuth, ParamField::Altitude],
    marker: None,
    reports_area: false,
};

pub const VIEWSHED: KindConfig = KindConfig {
    kind: AnalysisKind::Viewshed,
    title: "Viewshed",
    fields: &[ParamField::Height],
    marker: Some(MarkerStyle::filled("#f03")),
    reports_area: false,
};

pub const WATERSHED: KindConfig = KindConfig {
    kind: AnalysisKind::Watershed,
    title: "Watershed",
    fields: &[ParamField::SnapDistance],
    marker: Some(MarkerStyle::filled("#0096ff")),
    reports_area: true,
};

impl KindConfig {
    pub fn for_kind(kind: AnalysisKind) -> &'static KindConfig {
        match kind {
            AnalysisKind::Hillshade => &HILLSHADE,
            AnalysisKind::Viewshed => &VIEWSHED,
            AnalysisKind::Watershed => &WATERSHED,
        }
    }

    pub fn picks_point(&self) -> bool {
        self.marker.is_some()
    }

    pub fn supports(&self, field: ParamField) -> bool {
        self.fields.contains(&field)
    }

    /// Settings key holding the last used value of `field`.
    pub fn settings_key(&self, field: &str) -> String {
        settings::last_used_key(self.kind.slug(), field)
    }
}

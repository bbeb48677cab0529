use serde::{Deserialize, Serialize};

use crate::geo::LatLng;

/// Geographic bounding box.
///
/// On the wire this is the corner pair `[[south, west], [north, east]]`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 2]; 2]", into = "[[f64; 2]; 2]")]
pub struct GeoBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl GeoBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        GeoBounds {
            south_west,
            north_east,
        }
    }

    /// Builds bounds from two arbitrary corners, normalizing their order.
    pub fn from_corners(a: LatLng, b: LatLng) -> Self {
        GeoBounds {
            south_west: LatLng::new(a.lat.min(b.lat), a.lng.min(b.lng)),
            north_east: LatLng::new(a.lat.max(b.lat), a.lng.max(b.lng)),
        }
    }

    pub fn south(&self) -> f64 {
        self.south_west.lat
    }

    pub fn west(&self) -> f64 {
        self.south_west.lng
    }

    pub fn north(&self) -> f64 {
        self.north_east.lat
    }

    pub fn east(&self) -> f64 {
        self.north_east.lng
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south() + self.north()) * 0.5,
            (self.west() + self.east()) * 0.5,
        )
    }

    pub fn contains(&self, p: LatLng) -> bool {
        p.lat >= self.south() && p.lat <= self.north() && p.lng >= self.west() && p.lng <= self.east()
    }
}

impl From<[[f64; 2]; 2]> for GeoBounds {
    fn from(corners: [[f64; 2]; 2]) -> Self {
        let [[s, w], [n, e]] = corners;
        GeoBounds::from_corners(LatLng::new(s, w), LatLng::new(n, e))
    }
}

impl From<GeoBounds> for [[f64; 2]; 2] {
    fn from(b: GeoBounds) -> Self {
        [[b.south(), b.west()], [b.north(), b.east()]]
    }
}

use foundation::LatLng;

/// Human-readable area: km² from one million square meters, hectares from
/// ten thousand, square meters below that.
pub fn format_area(square_meters: f64) -> String {
    if square_meters >= 1_000_000.0 {
        format!("{:.2} km²", square_meters / 1_000_000.0)
    } else if square_meters >= 10_000.0 {
        format!("{:.2} ha", square_meters / 10_000.0)
    } else {
        format!("{square_meters:.1} m²")
    }
}

pub fn format_coordinate(point: LatLng) -> String {
    point.to_string()
}

pub fn format_opacity(opacity: f64) -> String {
    format!("{}%", (opacity * 100.0).round())
}

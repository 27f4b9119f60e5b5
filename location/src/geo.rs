//! Distance and formatting helpers.

use crate::Location;

/// Mean Earth radius in meters (IUGG).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance in meters between two coordinates.
#[must_use]
pub fn haversine_distance(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());

    let d_lat = lat2 - lat1;
    let d_lon = lon2 - lon1;
    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
}

/// Human-readable distance: whole meters below one kilometer, otherwise
/// kilometers with one decimal.
#[must_use]
pub fn format_distance(meters: f64) -> String {
    if meters < 1_000.0 {
        format!("{meters:.0} m")
    } else {
        format!("{:.1} km", meters / 1_000.0)
    }
}

impl Location {
    /// Distance in meters to another reading.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        haversine_distance(
            (self.latitude, self.longitude),
            (other.latitude, other.longitude),
        )
    }

    /// Coordinates as `"lat, lon"` with six decimals.
    #[must_use]
    pub fn format(&self) -> String {
        format!("{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

//! Small geometry helpers shared by adapters and reports.

const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance in metres.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Round to a fixed number of decimals.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Axis-aligned box of `half_side_m` around a point, as
/// `(min_lat, min_lon, max_lat, max_lon)`.
pub fn bbox_around(lat: f64, lon: f64, half_side_m: f64) -> (f64, f64, f64, f64) {
    let d_lat = (half_side_m / EARTH_RADIUS_M).to_degrees();
    let cos_lat = lat.to_radians().cos().abs().max(1e-6);
    let d_lon = (half_side_m / (EARTH_RADIUS_M * cos_lat)).to_degrees();
    (lat - d_lat, lon - d_lon, lat + d_lat, lon + d_lon)
}

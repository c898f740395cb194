/// Local-flat map geometry for flood regions.
///
/// Everything here treats the world as flat around the points involved: an
/// equirectangular projection at 111,320 m per degree, with longitude spacing
/// scaled by the cosine of latitude. Polygon generation, overlap distance and
/// merge midpoints all go through these helpers so they agree with each other.
use glam::DVec2;

use crate::flood::GeoPoint;

/// Metres per degree of latitude.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Vertices on a generated circle, not counting the closing vertex.
pub const POLYGON_SEGMENTS: usize = 32;

/// Floor for the cosine of latitude. Keeps longitude scaling finite near the poles
/// (the clamp engages above roughly 89.4 degrees).
pub const MIN_COS_LATITUDE: f64 = 0.01;

/// Cosine of a latitude in degrees, clamped away from zero.
pub fn longitude_scale(lat: f64) -> f64 {
    lat.to_radians().cos().abs().max(MIN_COS_LATITUDE)
}

/// Bring a longitude (or longitude difference) into [-180, 180).
/// In-range values come back bit-for-bit unchanged.
pub fn wrap_longitude(lon: f64) -> f64 {
    if (-180.0..180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// Offset of `to` from `from` in metres as (east, north). The east component
/// takes the short way round, so points either side of the antimeridian are close.
pub fn local_offset(from: GeoPoint, to: GeoPoint) -> DVec2 {
    let scale = longitude_scale((from.lat + to.lat) / 2.0);
    let mut dlon = to.lon - from.lon;
    if dlon.abs() > 180.0 {
        dlon = wrap_longitude(dlon);
    }
    DVec2::new(
        dlon * METERS_PER_DEGREE * scale,
        (to.lat - from.lat) * METERS_PER_DEGREE,
    )
}

/// Distance between two points in metres. Symmetric.
pub fn distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    local_offset(a, b).length()
}

/// Simple lat/lon average. Fine at city scale. When the points straddle the
/// antimeridian the average lands on the far side of the globe, so it is
/// flipped back by half a turn.
pub fn midpoint(a: GeoPoint, b: GeoPoint) -> GeoPoint {
    let lat = (a.lat + b.lat) / 2.0;
    let lon = (a.lon + b.lon) / 2.0;
    if (b.lon - a.lon).abs() > 180.0 {
        GeoPoint::new(lat, wrap_longitude(lon + 180.0))
    } else {
        GeoPoint::new(lat, lon)
    }
}

/// Move a point by an (east, north) offset in metres, scaled at the point's latitude.
/// The resulting longitude is wrapped into [-180, 180).
pub fn offset_point(center: GeoPoint, offset_m: DVec2) -> GeoPoint {
    let deg = offset_m / METERS_PER_DEGREE;
    GeoPoint::new(
        center.lat + deg.y,
        wrap_longitude(center.lon + deg.x / longitude_scale(center.lat)),
    )
}

/// Closed ring approximating a circle: `POLYGON_SEGMENTS` evenly spaced vertices
/// followed by a copy of the first, so 33 points in total.
pub fn generate_polygon(center: GeoPoint, radius_m: f64) -> Vec<GeoPoint> {
    let mut points = Vec::with_capacity(POLYGON_SEGMENTS + 1);
    for i in 0..POLYGON_SEGMENTS {
        let angle = std::f64::consts::TAU * i as f64 / POLYGON_SEGMENTS as f64;
        let unit = DVec2::new(angle.cos(), angle.sin());
        points.push(offset_point(center, unit * radius_m));
    }
    points.push(points[0]);
    points
}

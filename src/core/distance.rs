use geo::{HaversineDistance, Point};

use crate::models::{BoundingBox, GeoPoint};

/// Mean Earth radius in meters (the value `geo` uses for haversine)
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Length of one degree of latitude on the mean sphere
const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Slack added to bounding boxes so the pre-filter never drops a point the
/// exact distance check would keep
const BOX_PADDING: f64 = 1.01;

/// Great-circle distance between two points, in meters
#[inline]
pub fn haversine_distance(from: &GeoPoint, to: &GeoPoint) -> f64 {
    Point::new(from.lon, from.lat).haversine_distance(&Point::new(to.lon, to.lat))
}

/// Calculate a bounding box enclosing a circle of `radius_m` around `center`
///
/// Much cheaper than haversine, used as a pre-filter. The box is a superset of
/// the circle: longitude span is taken at the most poleward edge, and near the
/// poles or the antimeridian the full longitude band is used.
pub fn calculate_bounding_box(center: &GeoPoint, radius_m: f64) -> BoundingBox {
    let lat_delta = radius_m * BOX_PADDING / METERS_PER_DEGREE;

    let min_lat = (center.lat - lat_delta).max(-90.0);
    let max_lat = (center.lat + lat_delta).min(90.0);

    let poleward = min_lat.abs().max(max_lat.abs());
    let cos_lat = poleward.to_radians().cos();

    let (min_lon, max_lon) = if cos_lat <= f64::EPSILON {
        (-180.0, 180.0)
    } else {
        let lon_delta = lat_delta / cos_lat;
        let (west, east) = (center.lon - lon_delta, center.lon + lon_delta);
        if west < -180.0 || east > 180.0 {
            (-180.0, 180.0)
        } else {
            (west, east)
        }
    };

    BoundingBox {
        min_lat,
        max_lat,
        min_lon,
        max_lon,
    }
}

/// Check if a point is within a bounding box
#[inline]
pub fn is_within_bounding_box(point: &GeoPoint, bbox: &BoundingBox) -> bool {
    point.lat >= bbox.min_lat
        && point.lat <= bbox.max_lat
        && point.lon >= bbox.min_lon
        && point.lon <= bbox.max_lon
}

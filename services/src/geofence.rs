//! Great-circle proximity check for presence claims. Pure functions, no
//! state; callers must fail closed when subject coordinates are unavailable.

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceCheck {
    pub within_radius: bool,
    pub distance_m: f64,
}

/// Haversine distance in meters between two (latitude, longitude) pairs in
/// degrees.
pub fn distance_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Distance exactly equal to the radius counts as within range.
pub fn check(subject: (f64, f64), anchor: (f64, f64), radius_m: f64) -> GeofenceCheck {
    let distance_m = distance_m(subject, anchor);
    GeofenceCheck {
        within_radius: distance_m <= radius_m,
        distance_m,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Degrees of longitude on the equator spanning roughly one meter.
    const LON_DEGREE_PER_M: f64 = 1.0 / 111_194.926;

    #[test]
    fn zero_distance_for_identical_points() {
        let d = distance_m((-25.7545, 28.2314), (-25.7545, 28.2314));
        assert!(d.abs() < 1e-9);
    }

    #[test]
    fn known_distance_on_equator() {
        // One degree of longitude on the equator is ~111.195 km.
        let d = distance_m((0.0, 0.0), (0.0, 1.0));
        assert!((d - 111_194.926).abs() < 1.0, "got {d}");
    }

    #[test]
    fn subject_inside_radius_is_within() {
        let subject = (0.0, 49.0 * LON_DEGREE_PER_M);
        let res = check(subject, (0.0, 0.0), 50.0);
        assert!(res.within_radius);
        assert!((res.distance_m - 49.0).abs() < 0.1);
    }

    #[test]
    fn subject_beyond_radius_is_out() {
        let subject = (0.0, 51.0 * LON_DEGREE_PER_M);
        let res = check(subject, (0.0, 0.0), 50.0);
        assert!(!res.within_radius);
        assert!((res.distance_m - 51.0).abs() < 0.1);
    }

    #[test]
    fn distance_equal_to_radius_is_within() {
        let subject = (0.0, 0.0005);
        let anchor = (0.0, 0.0);
        let d = distance_m(subject, anchor);

        assert!(check(subject, anchor, d).within_radius);
        // radius just below the computed distance puts the subject out
        assert!(!check(subject, anchor, d - 1e-6).within_radius);
    }
}

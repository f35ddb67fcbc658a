use crate::model::employee::Coordinates;

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
pub const DEFAULT_RADIUS_METERS: f64 = 100.0;

/// Great-circle distance (haversine) between two points, in meters.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

pub fn is_within_radius(distance: f64, radius_meters: f64) -> bool {
    distance <= radius_meters
}

#[derive(Debug, Clone, Copy)]
pub struct Geofence {
    pub radius_meters: f64,
}

impl Default for Geofence {
    fn default() -> Self {
        Self {
            radius_meters: DEFAULT_RADIUS_METERS,
        }
    }
}

impl Geofence {
    pub fn distance(&self, site: Coordinates, position: Coordinates) -> f64 {
        distance_meters(
            site.latitude,
            site.longitude,
            position.latitude,
            position.longitude,
        )
    }

    pub fn contains(&self, distance: f64) -> bool {
        is_within_radius(distance, self.radius_meters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINTS: [(f64, f64); 5] = [
        (21.1250, -101.6860),
        (0.0, 0.0),
        (-33.8688, 151.2093),
        (89.9, 179.9),
        (40.4168, -3.7038),
    ];

    #[test]
    fn same_point_is_zero() {
        for (lat, lon) in POINTS {
            assert_eq!(distance_meters(lat, lon, lat, lon), 0.0);
        }
    }

    #[test]
    fn distance_is_symmetric() {
        for (a_lat, a_lon) in POINTS {
            for (b_lat, b_lon) in POINTS {
                let ab = distance_meters(a_lat, a_lon, b_lat, b_lon);
                let ba = distance_meters(b_lat, b_lon, a_lat, a_lon);
                assert!((ab - ba).abs() < 1e-6, "{ab} vs {ba}");
            }
        }
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = distance_meters(10.0, 20.0, 11.0, 20.0);
        assert!((d - 111_194.93).abs() < 1.0, "{d}");
    }

    #[test]
    fn radius_is_inclusive() {
        let fence = Geofence::default();
        assert!(fence.contains(100.0));
        assert!(fence.contains(40.0));
        assert!(!fence.contains(100.01));
    }
}

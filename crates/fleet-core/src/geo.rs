//! Geographic types and calculations for device positioning

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Earth's radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Decimal places kept when converting NMEA coordinates
const NMEA_DECIMALS: f64 = 1_000_000.0;

/// Geographic position with latitude and longitude in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
}

impl Default for GeoPoint {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

impl GeoPoint {
    /// Create a new geographic point
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Create a point, failing on out-of-range coordinates
    pub fn validated(latitude: f64, longitude: f64) -> CoreResult<Self> {
        let point = Self::new(latitude, longitude);
        if point.is_valid() {
            Ok(point)
        } else {
            Err(CoreError::invalid_position(latitude, longitude))
        }
    }

    /// Create a point from NMEA degrees-minutes values
    ///
    /// `3453.00000, 05035.0000` becomes `(34.883333, 50.583333)`.
    pub fn from_nmea(lat_nmea: f64, lon_nmea: f64) -> CoreResult<Self> {
        Self::validated(nmea_to_decimal(lat_nmea), nmea_to_decimal(lon_nmea))
    }

    /// Check if this point is valid
    pub fn is_valid(&self) -> bool {
        self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Calculate distance to another point using the Haversine formula
    /// Returns distance in kilometers
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lng = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }

    /// Convert to (latitude, longitude) tuple
    pub fn to_tuple(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Convert to array [latitude, longitude]
    pub fn to_array(&self) -> [f64; 2] {
        [self.latitude, self.longitude]
    }
}

/// Convert one NMEA degrees-minutes value to decimal degrees
///
/// `decimal = floor(value / 100) + (value mod 100) / 60`, rounded to
/// six decimal places.
pub fn nmea_to_decimal(value: f64) -> f64 {
    let degrees = (value / 100.0).floor();
    let minutes = value % 100.0;
    let decimal = degrees + minutes / 60.0;
    (decimal * NMEA_DECIMALS).round() / NMEA_DECIMALS
}

/// Geographic bounding box for area pre-checks
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl GeoBounds {
    pub fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    /// Check if a point is within these bounds
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }
}

/// Polygon bounding the area a task assignment targets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<GeoPoint>,
}

impl Polygon {
    pub fn new(vertices: Vec<GeoPoint>) -> Self {
        Self { vertices }
    }

    /// Polygon with no configured coordinates; contains nothing
    pub fn empty() -> Self {
        Self {
            vertices: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Check if a point is inside this polygon using ray casting
    pub fn contains(&self, point: &GeoPoint) -> bool {
        if self.vertices.len() < 3 {
            return false;
        }

        match self.bounds() {
            Some(bounds) if bounds.contains(point) => {}
            _ => return false,
        }

        let mut inside = false;
        let n = self.vertices.len();
        let mut j = n - 1;

        for i in 0..n {
            let vi = &self.vertices[i];
            let vj = &self.vertices[j];

            if ((vi.longitude > point.longitude) != (vj.longitude > point.longitude))
                && (point.latitude
                    < (vj.latitude - vi.latitude) * (point.longitude - vi.longitude)
                        / (vj.longitude - vi.longitude)
                        + vi.latitude)
            {
                inside = !inside;
            }
            j = i;
        }

        inside
    }

    /// Bounding box of this polygon; `None` when it has no vertices
    pub fn bounds(&self) -> Option<GeoBounds> {
        if self.vertices.is_empty() {
            return None;
        }

        let min_lat = self.vertices.iter().map(|v| v.latitude).fold(f64::MAX, f64::min);
        let max_lat = self.vertices.iter().map(|v| v.latitude).fold(f64::MIN, f64::max);
        let min_lng = self.vertices.iter().map(|v| v.longitude).fold(f64::MAX, f64::min);
        let max_lng = self.vertices.iter().map(|v| v.longitude).fold(f64::MIN, f64::max);

        Some(GeoBounds::new(min_lat, max_lat, min_lng, max_lng))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nmea_conversion() {
        assert_eq!(nmea_to_decimal(3453.00000), 34.883333);
        assert_eq!(nmea_to_decimal(5035.0000), 50.583333);

        let point = GeoPoint::from_nmea(3453.00000, 5035.0000).unwrap();
        assert_eq!(point.latitude, 34.883333);
        assert_eq!(point.longitude, 50.583333);
    }

    #[test]
    fn test_nmea_rejects_out_of_range() {
        // 9900.0 converts past 90 degrees latitude
        assert!(GeoPoint::from_nmea(9900.0, 5035.0).is_err());
    }

    #[test]
    fn test_distance_calculation() {
        // Tehran to Qom (approximately 125 km)
        let tehran = GeoPoint::new(35.6892, 51.3890);
        let qom = GeoPoint::new(34.6399, 50.8759);

        let distance = tehran.distance_to(&qom);
        assert!(distance > 100.0 && distance < 150.0);
    }

    #[test]
    fn test_zero_distance() {
        let point = GeoPoint::new(34.883333, 50.583333);
        assert!(point.distance_to(&point).abs() < 1e-9);
    }

    #[test]
    fn test_point_validity() {
        assert!(GeoPoint::new(45.0, 90.0).is_valid());
        assert!(!GeoPoint::new(100.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 200.0).is_valid());
    }

    #[test]
    fn test_polygon_contains() {
        let square = Polygon::new(vec![
            GeoPoint::new(34.0, 50.0),
            GeoPoint::new(34.0, 51.0),
            GeoPoint::new(35.0, 51.0),
            GeoPoint::new(35.0, 50.0),
        ]);

        assert!(square.contains(&GeoPoint::new(34.5, 50.5)));
        assert!(!square.contains(&GeoPoint::new(35.5, 50.5)));
        assert!(!square.contains(&GeoPoint::new(34.5, 49.5)));
    }

    #[test]
    fn test_degenerate_polygon_contains_nothing() {
        let line = Polygon::new(vec![GeoPoint::new(34.0, 50.0), GeoPoint::new(35.0, 51.0)]);
        assert!(!line.contains(&GeoPoint::new(34.5, 50.5)));
        assert!(!Polygon::empty().contains(&GeoPoint::new(34.5, 50.5)));
    }

    #[test]
    fn test_polygon_bounds() {
        let square = Polygon::new(vec![
            GeoPoint::new(34.0, 50.0),
            GeoPoint::new(34.0, 51.0),
            GeoPoint::new(35.0, 51.0),
            GeoPoint::new(35.0, 50.0),
        ]);

        let bounds = square.bounds().unwrap();
        assert_eq!(bounds.min_lat, 34.0);
        assert_eq!(bounds.max_lat, 35.0);
        assert_eq!(bounds.min_lng, 50.0);
        assert_eq!(bounds.max_lng, 51.0);

        assert!(Polygon::empty().bounds().is_none());
    }

    #[test]
    fn test_bounds_contains() {
        let bounds = GeoBounds::new(30.0, 40.0, 50.0, 60.0);
        assert!(bounds.contains(&GeoPoint::new(35.0, 55.0)));
        assert!(!bounds.contains(&GeoPoint::new(45.0, 55.0)));
    }
}

//! Coordinate parsing, validation, and distance helpers.

use haversine::{Location as HaversineLocation, Units, distance};
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Parse a "lat,lon" string. Validity is checked separately with
    /// [`Coordinates::is_valid`].
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let (lat, lon) = value.split_once(',')?;
        Some(Self {
            latitude: lat.trim().parse().ok()?,
            longitude: lon.trim().parse().ok()?,
        })
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Round both components to `places` decimal places.
    #[must_use]
    pub fn rounded(&self, places: u32) -> Self {
        Self {
            latitude: round_to(self.latitude, places),
            longitude: round_to(self.longitude, places),
        }
    }

    /// Cache-key string at a fixed precision, so near-duplicate queries land
    /// on the same entry.
    #[must_use]
    pub fn cache_key(&self, places: u32) -> String {
        let places = places as usize;
        format!("{:.places$},{:.places$}", self.latitude, self.longitude)
    }

    /// Full-precision "lat,lon" string for provider query parameters.
    #[must_use]
    pub fn to_param(&self) -> String {
        format!("{:.4},{:.4}", self.latitude, self.longitude)
    }
}

/// Round `value` to `places` decimal places.
#[must_use]
pub fn round_to(value: f64, places: u32) -> f64 {
    let multiplier = 10_f64.powi(i32::try_from(places).unwrap_or(0));
    (value * multiplier).round() / multiplier
}

/// Exact great-circle distance between two points, in miles.
#[must_use]
pub fn distance_miles(from: Coordinates, to: Coordinates) -> f64 {
    distance(
        HaversineLocation {
            latitude: from.latitude,
            longitude: from.longitude,
        },
        HaversineLocation {
            latitude: to.latitude,
            longitude: to.longitude,
        },
        Units::Miles,
    )
}

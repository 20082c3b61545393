//! Nearest-city resolution with long-lived result caching.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{City, CityDirectory, FullCity};
use crate::Result;
use crate::cache::{Cached, FetchSource, valid_for};
use crate::coordinates::{self, Coordinates};

/// How long a nearest-city assignment stays cached; it does not change on
/// any practical horizon.
const RESULT_MAX_AGE_DAYS: i64 = 90;

/// Decimal places for the coordinate cache key, so near-duplicate queries
/// share an entry.
const COORDINATE_KEY_PLACES: u32 = 2;
const DISTANCE_ROUNDING_PLACES: u32 = 2;

/// A directory record plus its rounded distance in miles from the queried
/// point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosestCity {
    pub city: City,
    pub distance_from_queried: f64,
}

struct ClosestCitySource {
    directory: Arc<CityDirectory>,
}

#[async_trait]
impl FetchSource for ClosestCitySource {
    type Arg = Coordinates;
    type Item = Option<ClosestCity>;

    async fn fetch(&self, queried: Coordinates) -> Result<Option<ClosestCity>> {
        let mut min_distance = f64::MAX;
        let mut closest: Option<&FullCity> = None;
        for record in self.directory.records() {
            let distance = coordinates::distance_miles(queried, record.city.coordinates());
            if distance < min_distance {
                min_distance = distance;
                closest = Some(record);
            }
        }

        Ok(closest.map(|record| ClosestCity {
            city: record.city.clone(),
            distance_from_queried: coordinates::round_to(min_distance, DISTANCE_ROUNDING_PLACES),
        }))
    }

    async fn valid_until(&self, _key: &str, _item: &Option<ClosestCity>) -> Result<i64> {
        Ok(valid_for(chrono::Duration::days(RESULT_MAX_AGE_DAYS)))
    }
}

/// Maps arbitrary coordinates to the nearest known city by exact
/// great-circle distance, caching each assignment under its rounded
/// coordinates.
pub struct ClosestCityResolver {
    cache: Cached<ClosestCitySource>,
}

impl ClosestCityResolver {
    #[must_use]
    pub fn new(directory: Arc<CityDirectory>) -> Self {
        Self {
            cache: Cached::new("cities.closest", ClosestCitySource { directory }),
        }
    }

    /// Returns the nearest known city, or `None` for an empty directory.
    ///
    /// # Errors
    ///
    /// Propagates cache engine failures.
    pub async fn resolve(&self, queried: Coordinates) -> Result<Option<ClosestCity>> {
        let key = queried.cache_key(COORDINATE_KEY_PLACES);
        Ok(self.cache.get(&key, queried).await?.item)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;

    #[tokio::test]
    async fn test_resolves_nearest_by_great_circle_distance() {
        let directory = Arc::new(testing::directory(&[
            (1, "Origin", "AA", 100, 0.0, 0.0),
            (2, "Far", "BB", 100, 10.0, 10.0),
        ]));
        let resolver = ClosestCityResolver::new(directory);

        let closest = resolver
            .resolve(Coordinates::new(1.0, 1.0))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(closest.city.geonameid, 1);
        assert!(closest.distance_from_queried > 0.0);
        // Rounded to two places, roughly 97-98 miles from (0, 0).
        assert!((90.0..110.0).contains(&closest.distance_from_queried));
        assert_eq!(
            closest.distance_from_queried,
            coordinates::round_to(closest.distance_from_queried, 2)
        );
    }

    #[tokio::test]
    async fn test_empty_directory_resolves_to_none() {
        let directory = Arc::new(testing::directory(&[]));
        let resolver = ClosestCityResolver::new(directory);

        let closest = resolver.resolve(Coordinates::new(42.0, -71.0)).await.unwrap();
        assert!(closest.is_none());
    }

    #[tokio::test]
    async fn test_repeat_queries_share_the_cached_assignment() {
        let directory = Arc::new(testing::directory(&[(
            1, "Origin", "AA", 100, 0.0, 0.0,
        )]));
        let resolver = ClosestCityResolver::new(directory);

        let first = resolver.resolve(Coordinates::new(1.0001, 1.0001)).await.unwrap();
        let second = resolver.resolve(Coordinates::new(1.0049, 0.9951)).await.unwrap();
        assert_eq!(first, second);
    }
}

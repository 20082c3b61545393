//! Integration tests over the city directory and its resolvers, end to end
//! from dataset files on disk.

use std::sync::Arc;

use skycast::{CityDirectory, CityQuery, CityResolver, ClosestCityResolver, Coordinates};
use tempfile::TempDir;

const DATASET: &str = r#"{
    "5128581": ["New York City", "NY", 8804190, 40.71427, -74.00597, "America/New_York"],
    "4930956": ["Boston", "MA", 667137, 42.35843, -71.05977, "America/New_York"],
    "4887398": ["Chicago", "IL", 2746388, 41.85003, -87.65005, "America/Chicago"],
    "5809844": ["Seattle", "WA", 737015, 47.60621, -122.33207, "America/Los_Angeles"],
    "4990729": ["Detroit", "MI", 639111, 42.33143, -83.04575, "America/Detroit"],
    "4250542": ["Springfield", "IL", 114394, 39.80172, -89.64371, "America/Chicago"],
    "4951788": ["Springfield", "MA", 155929, 42.10148, -72.58981, "America/New_York"],
    "4409896": ["Springfield", "MO", 169176, 37.21533, -93.29824, "America/Chicago"],
    "5091383": ["Concord", "NH", 43976, 43.20814, -71.53757, "America/New_York"],
    "4671654": ["Austin", "TX", 961855, 30.26715, -97.74306, "America/Chicago"],
    "4180439": ["Atlanta", "GA", 498715, 33.74900, -84.38798, "America/New_York"]
}"#;

const QUERY_CACHE: &str = r#"{
    "spr": [5, 6, 7, 0, 1, 2, 3, 4, 8, 9]
}"#;

async fn load_directory() -> (TempDir, Arc<CityDirectory>) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("cities-by-id.json"), DATASET).unwrap();
    std::fs::write(dir.path().join("query-cache.json"), QUERY_CACHE).unwrap();
    let directory = CityDirectory::load(dir.path()).await.unwrap();
    (dir, Arc::new(directory))
}

#[tokio::test]
async fn test_search_ranks_prefix_matches_by_population() {
    let (_dir, directory) = load_directory().await;

    let results = directory.search("springfield");
    let leading: Vec<u64> = results.iter().take(3).map(|c| c.geonameid).collect();
    assert_eq!(leading, vec![4_409_896, 4_951_788, 4_250_542]);

    // Repeat calls return the identical ordering.
    assert_eq!(results, directory.search("springfield"));
}

#[tokio::test]
async fn test_empty_query_returns_top_cities_truncated_to_limit() {
    let (_dir, directory) = load_directory().await;

    let results = directory.search("");
    assert_eq!(results.len(), 10);
    assert_eq!(results[0].city_name, "New York City");
    assert_eq!(results[1].city_name, "Chicago");
    // The smallest city falls outside the result limit.
    assert!(results.iter().all(|c| c.city_name != "Concord"));
}

#[tokio::test]
async fn test_precomputed_query_is_served_from_the_query_cache() {
    let (_dir, directory) = load_directory().await;

    let results: Vec<u64> = directory.search("spr").iter().map(|c| c.geonameid).collect();
    assert_eq!(
        results,
        vec![
            4_250_542, 4_951_788, 4_409_896, 5_128_581, 4_930_956, 4_887_398, 5_809_844,
            4_990_729, 5_091_383, 4_671_654
        ]
    );
}

#[tokio::test]
async fn test_closest_city_resolution_with_rounded_distance() {
    let (_dir, directory) = load_directory().await;
    let resolver = ClosestCityResolver::new(directory);

    let closest = resolver
        .resolve(Coordinates::new(42.30, -71.10))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(closest.city.city_name, "Boston");
    assert!(closest.distance_from_queried > 0.0);
    assert!(closest.distance_from_queried < 10.0);
}

#[tokio::test]
async fn test_resolution_precedence_and_warnings() {
    let (_dir, directory) = load_directory().await;
    let resolver = CityResolver::new(directory);

    let resolved = resolver
        .resolve(&CityQuery {
            geonameid: Some("4887398".to_owned()),
            coordinates: None,
            search_query: Some("seattle".to_owned()),
        })
        .await;

    assert_eq!(resolved.cities.len(), 1);
    assert_eq!(resolved.cities[0].city_name, "Chicago");
    assert!(resolved
        .warnings
        .iter()
        .any(|w| w.contains("'query' was ignored since 'id' took precedence")));
}

#[tokio::test]
async fn test_identifier_lookup_misses_return_no_city() {
    let (_dir, directory) = load_directory().await;
    let resolver = CityResolver::new(directory);

    let resolved = resolver
        .resolve(&CityQuery {
            geonameid: Some("0".to_owned()),
            coordinates: None,
            search_query: None,
        })
        .await;

    assert!(resolved.cities.is_empty());
    assert!(resolved.warnings.iter().any(|w| w.contains("'id' was invalid")));
}

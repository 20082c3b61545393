//! City directory: an immutable in-memory index over the prepared city
//! dataset, backing identifier lookup, fuzzy search, and nearest-city
//! resolution.
//!
//! The dataset is produced offline; this module only reads it. All derived
//! views (full record list, by-identifier map, population-ranked top
//! subset, display strings) are computed in a single load pass and shared by
//! reference for the rest of the process lifetime.

pub mod closest;
pub mod resolve;
pub mod search;

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;
use crate::coordinates::Coordinates;
use crate::error::SkycastError;

/// Maximum number of records returned by searches and the top-cities view.
pub const CITY_SEARCH_RESULT_LIMIT: usize = 10;

const CITIES_BY_ID_FILENAME: &str = "cities-by-id.json";
const QUERY_CACHE_FILENAME: &str = "query-cache.json";

/// Canonical city record. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub city_name: String,
    pub state_code: String,
    pub population: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub time_zone: String,
    pub geonameid: u64,
}

impl City {
    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Directory entry with its "City, ST" display string and the lowercase form
/// searches match against, both computed once at load time.
#[derive(Debug, Clone)]
pub struct FullCity {
    pub city: City,
    pub display_name: String,
    pub display_name_lower: String,
}

/// Raw dataset row: a fixed-order tuple keyed by identifier in the file.
#[derive(Debug, Deserialize)]
pub(crate) struct InputCity(
    pub String, // name
    pub String, // region code
    pub u64,    // population
    pub f64,    // latitude
    pub f64,    // longitude
    pub String, // IANA time zone
);

/// The loaded directory and its derived views.
pub struct CityDirectory {
    cities: Vec<FullCity>,
    by_id: HashMap<u64, usize>,
    top_city_offsets: Vec<usize>,
    query_cache: HashMap<String, Vec<usize>>,
}

impl CityDirectory {
    /// Load the directory from the prepared dataset files in `data_dir`.
    ///
    /// # Errors
    ///
    /// Absence or malformation of either file is fatal
    /// ([`SkycastError::CityData`]); there is no retry or partial load.
    pub async fn load(data_dir: impl AsRef<Path>) -> Result<Self> {
        let started = Instant::now();
        let data_dir = data_dir.as_ref();

        let cities_raw = read_data_file(data_dir, CITIES_BY_ID_FILENAME).await?;
        // Query-cache offsets are positional, so the dataset map must be
        // consumed in file order.
        let cities_by_id: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&cities_raw).map_err(|err| {
                SkycastError::city_data(format!("{CITIES_BY_ID_FILENAME}: {err}"))
            })?;

        let mut entries = Vec::with_capacity(cities_by_id.len());
        for (geonameid, value) in cities_by_id {
            let id: u64 = geonameid.parse().map_err(|_| {
                SkycastError::city_data(format!(
                    "{CITIES_BY_ID_FILENAME}: invalid identifier \"{geonameid}\""
                ))
            })?;
            let input: InputCity = serde_json::from_value(value).map_err(|err| {
                SkycastError::city_data(format!("{CITIES_BY_ID_FILENAME}: id {id}: {err}"))
            })?;
            entries.push((id, input));
        }

        let query_cache_raw = read_data_file(data_dir, QUERY_CACHE_FILENAME).await?;
        let query_cache: HashMap<String, Vec<usize>> = serde_json::from_str(&query_cache_raw)
            .map_err(|err| SkycastError::city_data(format!("{QUERY_CACHE_FILENAME}: {err}")))?;

        let directory = Self::from_entries(entries, query_cache);
        debug!(
            cities = directory.cities.len(),
            cached_queries = directory.query_cache.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded city directory"
        );
        Ok(directory)
    }

    pub(crate) fn from_entries(
        entries: Vec<(u64, InputCity)>,
        query_cache: HashMap<String, Vec<usize>>,
    ) -> Self {
        let mut cities = Vec::with_capacity(entries.len());
        let mut by_id = HashMap::with_capacity(entries.len());
        for (geonameid, input) in entries {
            let InputCity(city_name, state_code, population, latitude, longitude, time_zone) =
                input;
            let display_name = format!("{city_name}, {state_code}");
            let display_name_lower = display_name.to_lowercase();
            by_id.insert(geonameid, cities.len());
            cities.push(FullCity {
                city: City {
                    city_name,
                    state_code,
                    population,
                    latitude,
                    longitude,
                    time_zone,
                    geonameid,
                },
                display_name,
                display_name_lower,
            });
        }

        // Stable sort keeps encounter order for population ties.
        let mut top_city_offsets: Vec<usize> = (0..cities.len()).collect();
        top_city_offsets
            .sort_by(|&a, &b| cities[b].city.population.cmp(&cities[a].city.population));
        top_city_offsets.truncate(CITY_SEARCH_RESULT_LIMIT);

        Self {
            cities,
            by_id,
            top_city_offsets,
            query_cache,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    /// Population-ranked top cities, truncated to the result limit.
    #[must_use]
    pub fn top_cities(&self) -> Vec<City> {
        self.top_city_offsets
            .iter()
            .map(|&offset| self.cities[offset].city.clone())
            .collect()
    }

    /// Look up a record by its string-encoded identifier. Anything that is
    /// not a positive integer with an entry resolves to `None`.
    #[must_use]
    pub fn city_with_id(&self, geonameid: &str) -> Option<City> {
        let id: u64 = geonameid.parse().ok().filter(|id| *id > 0)?;
        self.by_id
            .get(&id)
            .map(|&offset| self.cities[offset].city.clone())
    }

    pub(crate) fn records(&self) -> &[FullCity] {
        &self.cities
    }
}

async fn read_data_file(data_dir: &Path, file_name: &str) -> Result<String> {
    let path = data_dir.join(file_name);
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|err| SkycastError::city_data(format!("failed to read {}: {err}", path.display())))
}

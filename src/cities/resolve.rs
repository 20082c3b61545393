//! Resolution of a queried city from an identifier, coordinates, or free
//! search text.
//!
//! Lookup keys are considered in precedence order (identifier, then
//! coordinates, then search text). Invalid or ignored keys produce advisory
//! warnings for the caller to surface; resolution failures never surface as
//! errors, only as empty data plus a warning.

use std::sync::Arc;

use tracing::warn;

use super::closest::ClosestCityResolver;
use super::{City, CityDirectory};
use crate::coordinates::Coordinates;

pub const QUERY_KEY_ID: &str = "id";
pub const QUERY_KEY_COORDINATES: &str = "coordinates";
pub const QUERY_KEY_SEARCH: &str = "query";

/// One inbound city lookup, as the (excluded) route layer hands it over.
#[derive(Debug, Default, Clone)]
pub struct CityQuery {
    pub geonameid: Option<String>,
    pub coordinates: Option<String>,
    pub search_query: Option<String>,
}

/// Resolution outcome: matched records plus advisory warnings.
#[derive(Debug, Default)]
pub struct ResolvedCities {
    pub cities: Vec<City>,
    pub warnings: Vec<String>,
}

pub struct CityResolver {
    directory: Arc<CityDirectory>,
    closest: ClosestCityResolver,
}

impl CityResolver {
    #[must_use]
    pub fn new(directory: Arc<CityDirectory>) -> Self {
        let closest = ClosestCityResolver::new(Arc::clone(&directory));
        Self { directory, closest }
    }

    pub async fn resolve(&self, query: &CityQuery) -> ResolvedCities {
        let mut warnings = Vec::new();

        if let Some(geonameid) = non_empty(query.geonameid.as_deref()) {
            let city = self.directory.city_with_id(geonameid);
            add_warnings_for_value(
                city.is_some(),
                query,
                QUERY_KEY_ID,
                &[QUERY_KEY_COORDINATES, QUERY_KEY_SEARCH],
                &mut warnings,
            );
            if let Some(city) = city {
                return ResolvedCities {
                    cities: vec![city],
                    warnings,
                };
            }
        }

        if let Some(raw) = non_empty(query.coordinates.as_deref()) {
            let mut resolved = None;
            if let Some(coordinates) = Coordinates::parse(raw).filter(Coordinates::is_valid) {
                match self.closest.resolve(coordinates).await {
                    Ok(found) => resolved = found,
                    Err(err) => warn!("closest-city resolution failed: {err}"),
                }
            }
            add_warnings_for_value(
                resolved.is_some(),
                query,
                QUERY_KEY_COORDINATES,
                &[QUERY_KEY_SEARCH],
                &mut warnings,
            );
            if let Some(closest) = resolved {
                return ResolvedCities {
                    cities: vec![closest.city],
                    warnings,
                };
            }
        }

        if let Some(raw) = query.search_query.as_deref() {
            let normalized = normalize_query(raw);
            if normalized != raw {
                warnings.push(format!(
                    "'{QUERY_KEY_SEARCH}' value was unformatted; it was normalized to \
                     \"{normalized}\" for the search"
                ));
            }
            return ResolvedCities {
                cities: self.directory.search(&normalized),
                warnings,
            };
        }

        warnings.push(format!(
            "no valid lookup was provided; valid keys are: '{QUERY_KEY_ID}', \
             '{QUERY_KEY_COORDINATES}', '{QUERY_KEY_SEARCH}'"
        ));
        ResolvedCities {
            cities: Vec::new(),
            warnings,
        }
    }
}

/// Trim, collapse internal whitespace, and lowercase a raw search query.
#[must_use]
pub fn normalize_query(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn add_warnings_for_value(
    valid: bool,
    query: &CityQuery,
    key: &str,
    downstream_keys: &[&str],
    warnings: &mut Vec<String>,
) {
    if valid {
        for &downstream in downstream_keys {
            if query_has(query, downstream) {
                warnings.push(format!("'{downstream}' was ignored since '{key}' took precedence"));
            }
        }
    } else {
        warnings.push(format!("'{key}' was invalid"));
    }
}

fn query_has(query: &CityQuery, key: &str) -> bool {
    match key {
        QUERY_KEY_COORDINATES => query.coordinates.is_some(),
        QUERY_KEY_SEARCH => query.search_query.is_some(),
        _ => query.geonameid.is_some(),
    }
}

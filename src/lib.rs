//! `Skycast` - weather aggregation core
//!
//! This library provides the freshness-aware caching engine and the city
//! resolution/search engine that sit in front of every upstream provider
//! call: cached values carry per-provider expiration rules, city lookups run
//! against an immutable in-memory directory with fuzzy text search and
//! nearest-neighbor resolution.

pub mod cache;
pub mod cities;
pub mod config;
pub mod coordinates;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod providers;

// Re-export core types for public API
pub use cache::{CacheEntry, Cached, FetchSource};
pub use cities::closest::{ClosestCity, ClosestCityResolver};
pub use cities::resolve::{CityQuery, CityResolver, ResolvedCities};
pub use cities::{CITY_SEARCH_RESULT_LIMIT, City, CityDirectory, FullCity};
pub use config::SkycastConfig;
pub use coordinates::Coordinates;
pub use error::SkycastError;
pub use providers::airnow::AirNowClient;
pub use providers::nws::NwsClient;
pub use providers::station::StationClient;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, SkycastError>;

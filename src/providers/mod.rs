//! Upstream weather providers, each fronted by its own freshness caches.

pub mod airnow;
pub mod nws;
pub mod station;

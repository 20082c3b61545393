//! Regional air-quality service integration.
//!
//! The provider publishes hourly readings stamped in the observed location's
//! local time, with a lag between reading and upload. The expiration rule
//! therefore parses the payload's own timestamps in the queried city's IANA
//! zone before adding the recording interval and upload allowance.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::Result;
use crate::cache::{CacheEntry, Cached, FetchSource};
use crate::cities::City;
use crate::config::AirNowConfig;
use crate::error::SkycastError;

/// Seconds between consecutive published readings.
const RECORDING_INTERVAL_SECS: i64 = 60 * 60;
/// Allowance for the provider's upload lag after a reading.
const UPLOAD_DELAY_SECS: i64 = 30 * 60;
/// Search radius passed to the observations endpoint, miles.
const SEARCH_RADIUS_MILES: u32 = 100;

/// One raw observation row as the provider encodes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirNowObservation {
    #[serde(rename = "DateObserved")]
    pub date_observed: String,
    #[serde(rename = "HourObserved")]
    pub hour_observed: u32,
    #[serde(rename = "ParameterName")]
    pub parameter_name: String,
    #[serde(rename = "AQI")]
    pub aqi: i64,
    #[serde(rename = "Category")]
    pub category: AqiCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AqiCategory {
    #[serde(rename = "Number")]
    pub number: u8,
    #[serde(rename = "Name")]
    pub name: String,
}

/// Raw observations paired with the queried city's zone, which the
/// expiration rule needs to interpret the provider's local timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationsWithZone {
    pub observations: Vec<AirNowObservation>,
    pub time_zone: String,
}

/// One pollutant reading in the public response shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollutantObservation {
    pub pollutant: String,
    pub aqi: i64,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirQualityObservations {
    pub read_time: i64,
    pub valid_until: i64,
    pub observations: Vec<PollutantObservation>,
}

/// Latest reading timestamp across the observations, unix seconds; `0` when
/// no timestamp can be interpreted.
fn latest_read_time(item: &ObservationsWithZone) -> i64 {
    let Ok(zone) = item.time_zone.parse::<Tz>() else {
        error!("unknown time zone \"{}\"", item.time_zone);
        return 0;
    };

    item.observations
        .iter()
        .map(|observation| {
            let stamp = format!(
                "{} {}:00",
                observation.date_observed.trim(),
                observation.hour_observed
            );
            match NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M") {
                Ok(naive) => zone
                    .from_local_datetime(&naive)
                    .single()
                    .map_or(0, |reading| reading.timestamp()),
                Err(err) => {
                    error!("couldn't parse \"{stamp}\": {err}");
                    0
                }
            }
        })
        .fold(0, i64::max)
}

struct AirNowSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[async_trait]
impl FetchSource for AirNowSource {
    type Arg = City;
    type Item = ObservationsWithZone;

    async fn fetch(&self, city: City) -> Result<ObservationsWithZone> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SkycastError::config("airnow.api_key is not configured"))?;

        let url = format!("{}aq/observation/latLong/current/", self.base_url);
        let params = [
            ("format", "application/json".to_owned()),
            ("latitude", city.latitude.to_string()),
            ("longitude", city.longitude.to_string()),
            ("distance", SEARCH_RADIUS_MILES.to_string()),
            ("API_KEY", api_key.to_owned()),
        ];
        let response = self.client.get(&url).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SkycastError::api(format!(
                "observations request returned {status}"
            )));
        }

        let observations: Vec<AirNowObservation> = response.json().await?;
        Ok(ObservationsWithZone {
            observations,
            time_zone: city.time_zone,
        })
    }

    async fn valid_until(&self, _key: &str, item: &ObservationsWithZone) -> Result<i64> {
        let latest = latest_read_time(item);
        Ok(if latest > 0 {
            latest + RECORDING_INTERVAL_SECS + UPLOAD_DELAY_SECS
        } else {
            0
        })
    }
}

/// Client for the regional air-quality service.
pub struct AirNowClient {
    current: Cached<AirNowSource>,
}

impl AirNowClient {
    /// # Errors
    ///
    /// Returns a configuration error when the HTTP client cannot be built.
    pub fn new(config: &AirNowConfig, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(user_agent)
            .build()
            .map_err(|err| SkycastError::config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            current: Cached::new(
                "airnow.current",
                AirNowSource {
                    client,
                    base_url: config.base_url.clone(),
                    api_key: config.api_key.clone(),
                },
            ),
        })
    }

    /// Current observations for the queried city, keyed by its coordinates.
    pub async fn current(&self, city: &City) -> Result<CacheEntry<ObservationsWithZone>> {
        let key = city.coordinates().to_param();
        self.current.get(&key, city.clone()).await
    }
}

/// Map a cache entry to the public air-quality shape, worst AQI first.
#[must_use]
pub fn to_air_quality(entry: &CacheEntry<ObservationsWithZone>) -> AirQualityObservations {
    let mut observations: Vec<PollutantObservation> = entry
        .item
        .observations
        .iter()
        .map(|observation| PollutantObservation {
            pollutant: observation.parameter_name.clone(),
            aqi: observation.aqi,
            category: observation.category.name.clone(),
        })
        .collect();
    observations.sort_by(|a, b| b.aqi.cmp(&a.aqi));

    AirQualityObservations {
        read_time: latest_read_time(&entry.item),
        valid_until: entry.valid_until,
        observations,
    }
}

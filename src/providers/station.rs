//! Private station network integration.
//!
//! A small Davis-style network with one home station whose hardware reports
//! on its own recording interval. The station list cannot change within a
//! process lifetime and is fetched once; current conditions are cached
//! until the next expected sensor reading has had time to upload.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::error;

use crate::Result;
use crate::cache::{CacheEntry, Cached, FetchSource};
use crate::config::StationConfig;
use crate::coordinates::{self, Coordinates};
use crate::error::SkycastError;

/// Sensor catalog ids for the record types we read.
const SENSOR_TYPE_MAIN: u32 = 43;
const SENSOR_TYPE_BAROMETER: u32 = 242;

/// Seconds of upload grace after a reading reaches the network.
const UPLOAD_GRACE_SECS: i64 = 10;

/// Miles within which the home station is representative of a query.
const USE_WITHIN_MILES: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationsResponse {
    #[serde(default)]
    pub stations: Vec<Station>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub station_id: u64,
    #[serde(default)]
    pub station_name: String,
    /// Minutes between consecutive sensor recordings.
    #[serde(default)]
    pub recording_interval: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentConditions {
    #[serde(default)]
    pub sensors: Vec<Sensor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub sensor_type: u32,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MainSensorData {
    #[serde(default)]
    pub ts: i64,
    pub temp: Option<f64>,
    pub hum: Option<f64>,
    pub dew_point: Option<f64>,
    pub heat_index: Option<f64>,
    pub thsw_index: Option<f64>,
    pub thw_index: Option<f64>,
    pub wind_speed_avg_last_10_min: Option<f64>,
    pub wind_dir_scalar_avg_last_10_min: Option<f64>,
    pub wind_speed_hi_last_10_min: Option<f64>,
    pub rainfall_last_15_min_in: Option<f64>,
    pub rainfall_last_60_min_in: Option<f64>,
    pub rainfall_last_24_hr_in: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BarometerSensorData {
    #[serde(default)]
    pub ts: i64,
    pub bar_sea_level: Option<f64>,
    pub bar_trend: Option<f64>,
}

impl CurrentConditions {
    fn sensor_data<T: DeserializeOwned + Default>(&self, sensor_type: u32) -> T {
        self.sensors
            .iter()
            .find(|sensor| sensor.sensor_type == sensor_type)
            .and_then(|sensor| sensor.data.first())
            .and_then(|row| serde_json::from_value(row.clone()).ok())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn main_sensor(&self) -> MainSensorData {
        self.sensor_data(SENSOR_TYPE_MAIN)
    }

    #[must_use]
    pub fn barometer(&self) -> BarometerSensorData {
        self.sensor_data(SENSOR_TYPE_BAROMETER)
    }
}

struct StationCore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    main_station: OnceCell<Option<Station>>,
}

impl StationCore {
    /// The network's first station, resolved once per process. List failures
    /// are logged and settle as "no station".
    async fn main_station(&self) -> Option<Station> {
        self.main_station
            .get_or_init(|| self.load_main_station())
            .await
            .clone()
    }

    async fn load_main_station(&self) -> Option<Station> {
        match self.fetch_stations().await {
            Ok(response) => response.stations.into_iter().next(),
            Err(err) => {
                error!("couldn't fetch the station list: {err}");
                None
            }
        }
    }

    fn credentials(&self) -> Result<(&str, &str)> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SkycastError::config("station.api_key is not configured"))?;
        let api_secret = self
            .api_secret
            .as_deref()
            .ok_or_else(|| SkycastError::config("station.api_secret is not configured"))?;
        Ok((api_key, api_secret))
    }

    async fn fetch_stations(&self) -> Result<StationsResponse> {
        let (api_key, api_secret) = self.credentials()?;
        let url = format!("{}stations", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("api-key", api_key)])
            .header("X-Api-Secret", api_secret)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SkycastError::api(format!(
                "station list request returned {status}"
            )));
        }
        Ok(response.json().await?)
    }

    async fn fetch_current(&self, station_id: u64) -> Result<CurrentConditions> {
        let (api_key, api_secret) = self.credentials()?;
        let url = format!("{}current/{station_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("api-key", api_key)])
            .header("X-Api-Secret", api_secret)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SkycastError::api(format!(
                "current conditions request returned {status}"
            )));
        }
        Ok(response.json().await?)
    }
}

struct CurrentSource {
    core: Arc<StationCore>,
}

#[async_trait]
impl FetchSource for CurrentSource {
    type Arg = ();
    type Item = Option<CurrentConditions>;

    async fn fetch(&self, _arg: ()) -> Result<Option<CurrentConditions>> {
        let Some(station) = self.core.main_station().await else {
            return Ok(None);
        };
        match self.core.fetch_current(station.station_id).await {
            Ok(conditions) => Ok(Some(conditions)),
            Err(err) => {
                error!("couldn't fetch current conditions: {err}");
                Ok(None)
            }
        }
    }

    async fn valid_until(&self, _key: &str, item: &Option<CurrentConditions>) -> Result<i64> {
        let last_reading = item
            .as_ref()
            .map_or(0, |conditions| conditions.main_sensor().ts);
        if last_reading == 0 {
            return Ok(0);
        }
        let recording_interval_secs = self
            .core
            .main_station()
            .await
            .map_or(0, |station| station.recording_interval * 60);
        Ok(last_reading + recording_interval_secs + UPLOAD_GRACE_SECS)
    }
}

/// Client for the private station network.
pub struct StationClient {
    home_coordinates: Coordinates,
    current: Cached<CurrentSource>,
}

impl StationClient {
    /// # Errors
    ///
    /// Returns a configuration error when the HTTP client cannot be built or
    /// the configured home coordinates do not parse.
    pub fn new(config: &StationConfig, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(user_agent)
            .build()
            .map_err(|err| SkycastError::config(format!("failed to build HTTP client: {err}")))?;

        let home_coordinates = Coordinates::parse(&config.home_coordinates)
            .filter(Coordinates::is_valid)
            .ok_or_else(|| {
                SkycastError::config(format!(
                    "station.home_coordinates \"{}\" is not a valid \"lat,lon\" pair",
                    config.home_coordinates
                ))
            })?;

        let core = Arc::new(StationCore {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            main_station: OnceCell::new(),
        });

        Ok(Self {
            home_coordinates,
            current: Cached::new("station.current", CurrentSource { core }),
        })
    }

    /// Whether the home station is representative of the queried point.
    #[must_use]
    pub fn should_use(&self, queried: Coordinates) -> bool {
        coordinates::distance_miles(self.home_coordinates, queried) < USE_WITHIN_MILES
    }

    /// Current conditions at the home station. The item is `None` when the
    /// network was unreachable; the entry then expires immediately.
    pub async fn current(&self) -> Result<CacheEntry<Option<CurrentConditions>>> {
        let key = self.home_coordinates.to_param();
        self.current.get(&key, ()).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationWind {
    pub speed: Option<f64>,
    pub direction_deg: Option<f64>,
    pub gust_speed: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationPressure {
    pub at_sea_level: Option<f64>,
    pub trend: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationRainfall {
    pub last_15_min: Option<f64>,
    pub last_1_hr: Option<f64>,
    pub last_24_hr: Option<f64>,
}

/// Station observations in the public response shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationObservations {
    pub read_time: i64,
    pub valid_until: i64,
    pub temperature: Option<f64>,
    pub heat_index: Option<f64>,
    pub dew_point: Option<f64>,
    pub humidity: Option<f64>,
    pub feels_like: Option<f64>,
    pub wind: StationWind,
    pub pressure: StationPressure,
    pub rainfall: StationRainfall,
}

/// Map a cache entry to the public station observations shape.
#[must_use]
pub fn to_observations(entry: &CacheEntry<Option<CurrentConditions>>) -> StationObservations {
    let main = entry
        .item
        .as_ref()
        .map(CurrentConditions::main_sensor)
        .unwrap_or_default();
    let barometer = entry
        .item
        .as_ref()
        .map(CurrentConditions::barometer)
        .unwrap_or_default();

    StationObservations {
        read_time: main.ts,
        valid_until: entry.valid_until,
        temperature: main.temp,
        heat_index: main.heat_index,
        dew_point: main.dew_point,
        humidity: main.hum.map(|value| coordinates::round_to(value, 0)),
        feels_like: main.thsw_index.or(main.thw_index),
        wind: StationWind {
            speed: main.wind_speed_avg_last_10_min,
            direction_deg: main
                .wind_dir_scalar_avg_last_10_min
                .map(|value| coordinates::round_to(value, 0)),
            gust_speed: main.wind_speed_hi_last_10_min,
        },
        pressure: StationPressure {
            at_sea_level: barometer.bar_sea_level,
            trend: barometer.bar_trend,
        },
        rainfall: StationRainfall {
            last_15_min: main.rainfall_last_15_min_in,
            last_1_hr: main.rainfall_last_60_min_in,
            last_24_hr: main.rainfall_last_24_hr_in,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::unix_now;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> StationConfig {
        StationConfig {
            api_key: Some("key".to_owned()),
            api_secret: Some("secret".to_owned()),
            base_url: format!("{}/", server.uri()),
            home_coordinates: "42.35826159869919,-71.05360507074275".to_owned(),
            timeout_seconds: 5,
        }
    }

    #[tokio::test]
    async fn test_should_use_within_five_miles_of_home() {
        let server = MockServer::start().await;
        let client = StationClient::new(&config_for(&server), "skycast-tests").unwrap();

        assert!(client.should_use(Coordinates::new(42.40, -71.05)));
        assert!(!client.should_use(Coordinates::new(43.35, -71.05)));
    }

    #[tokio::test]
    async fn test_expiration_tracks_sensor_reading_and_interval() {
        let core = Arc::new(StationCore {
            client: Client::new(),
            base_url: String::new(),
            api_key: Some("key".to_owned()),
            api_secret: Some("secret".to_owned()),
            main_station: OnceCell::new_with(Some(Some(Station {
                station_id: 7,
                station_name: "Home".to_owned(),
                recording_interval: 5,
            }))),
        });
        let source = CurrentSource { core };

        let conditions = Some(CurrentConditions {
            sensors: vec![Sensor {
                sensor_type: SENSOR_TYPE_MAIN,
                data: vec![json!({ "ts": 1_770_000_000, "temp": 68.4 })],
            }],
        });
        assert_eq!(
            source.valid_until("k", &conditions).await.unwrap(),
            1_770_000_000 + 5 * 60 + UPLOAD_GRACE_SECS
        );

        assert_eq!(source.valid_until("k", &None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_current_fetches_station_list_once_and_caches_conditions() {
        let server = MockServer::start().await;
        let recent = unix_now();
        Mock::given(method("GET"))
            .and(path("/stations"))
            .and(query_param("api-key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stations": [
                    { "station_id": 7, "station_name": "Home", "recording_interval": 15 }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/current/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sensors": [
                    {
                        "sensor_type": SENSOR_TYPE_MAIN,
                        "data": [{ "ts": recent, "temp": 68.4, "hum": 54.2 }]
                    },
                    {
                        "sensor_type": SENSOR_TYPE_BAROMETER,
                        "data": [{ "ts": recent, "bar_sea_level": 29.92, "bar_trend": -0.01 }]
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = StationClient::new(&config_for(&server), "skycast-tests").unwrap();
        let first = client.current().await.unwrap();
        let second = client.current().await.unwrap();

        assert!(first.is_fresh_at(unix_now()));
        assert_eq!(first.valid_until, second.valid_until);

        let observations = to_observations(&first);
        assert_eq!(observations.read_time, recent);
        assert_eq!(observations.temperature, Some(68.4));
        assert_eq!(observations.humidity, Some(54.0));
        assert_eq!(observations.pressure.at_sea_level, Some(29.92));
    }

    #[test]
    fn test_feels_like_falls_back_across_indices() {
        let entry = CacheEntry {
            item: Some(CurrentConditions {
                sensors: vec![Sensor {
                    sensor_type: SENSOR_TYPE_MAIN,
                    data: vec![json!({ "ts": 1_770_000_000, "thw_index": 71.2 })],
                }],
            }),
            valid_until: 1_770_000_900,
        };
        let observations = to_observations(&entry);
        assert_eq!(observations.feels_like, Some(71.2));
    }
}

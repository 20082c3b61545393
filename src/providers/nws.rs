//! National forecast service integration.
//!
//! Five cached resources, each with its own staleness rule: point metadata
//! and station lists barely change (one week); current observations track
//! the station's hourly recording cadence; forecasts are valid until one
//! hour past the provider's own update time, floored at fifteen minutes
//! from now. Active alerts are deliberately uncached.

use std::cmp;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::cache::{CacheEntry, Cached, FetchSource, unix_now, valid_for};
use crate::config::NwsConfig;
use crate::coordinates::Coordinates;
use crate::error::SkycastError;
use crate::fetch::fetch_json_with_retry;

/// Seconds between consecutive readings at an observation station.
const RECORDING_INTERVAL_SECS: i64 = 60 * 60;
/// Seconds a published forecast stays fresh past its own update time.
const FORECAST_SHELF_AFTER_UPDATE_SECS: i64 = 60 * 60;
/// Floor applied to forecast expirations, seconds from now.
const FORECAST_MIN_SHELF_LIFE_SECS: i64 = 15 * 60;
/// Shelf life for point metadata and station lists.
const METADATA_SHELF_LIFE_WEEKS: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsResponse {
    pub properties: PointsProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsProperties {
    pub forecast: String,
    pub forecast_grid_data: String,
    pub observation_stations: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationsResponse {
    #[serde(default)]
    pub features: Vec<StationFeature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationFeature {
    pub properties: StationProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationProperties {
    pub station_identifier: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationResponse {
    pub properties: ObservationProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationProperties {
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub text_description: Option<String>,
    #[serde(default)]
    pub temperature: QuantitativeValue,
    #[serde(default)]
    pub dewpoint: QuantitativeValue,
    #[serde(default)]
    pub relative_humidity: QuantitativeValue,
    #[serde(default)]
    pub wind_direction: QuantitativeValue,
    #[serde(default)]
    pub wind_speed: QuantitativeValue,
    #[serde(default)]
    pub wind_gust: QuantitativeValue,
    #[serde(default)]
    pub barometric_pressure: QuantitativeValue,
    #[serde(default)]
    pub visibility: QuantitativeValue,
}

/// A measured value with its unit, as the provider encodes all readings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantitativeValue {
    pub value: Option<f64>,
    #[serde(default)]
    pub unit_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub properties: ForecastProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastProperties {
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub periods: Vec<ForecastPeriod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPeriod {
    pub number: u32,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_daytime: bool,
    #[serde(default)]
    pub temperature: QuantitativeValue,
    #[serde(default)]
    pub wind_speed: QuantitativeValue,
    #[serde(default)]
    pub wind_direction: Option<String>,
    #[serde(default)]
    pub short_forecast: String,
    #[serde(default)]
    pub detailed_forecast: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridDataResponse {
    pub properties: GridDataProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridDataProperties {
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub temperature: GridLayer,
    #[serde(default)]
    pub probability_of_precipitation: GridLayer,
    #[serde(default)]
    pub sky_cover: GridLayer,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridLayer {
    #[serde(default)]
    pub uom: Option<String>,
    #[serde(default)]
    pub values: Vec<GridValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridValue {
    pub valid_time: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsResponse {
    #[serde(default)]
    pub features: Vec<AlertFeature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertFeature {
    pub properties: AlertProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertProperties {
    pub event: Option<String>,
    pub severity: Option<String>,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub onset: Option<DateTime<Utc>>,
    pub ends: Option<DateTime<Utc>>,
}

/// Valid until one hour past the forecast's own update time, floored at
/// fifteen minutes from now; a payload without an update time is
/// immediately stale.
fn forecast_valid_until(update_time: Option<DateTime<Utc>>) -> i64 {
    match update_time {
        Some(updated) => cmp::max(
            updated.timestamp() + FORECAST_SHELF_AFTER_UPDATE_SECS,
            unix_now() + FORECAST_MIN_SHELF_LIFE_SECS,
        ),
        None => 0,
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SkycastError::api(format!("{url} returned {status}")));
    }
    Ok(response.json().await?)
}

struct PointsSource {
    client: Client,
    base_url: String,
}

#[async_trait]
impl FetchSource for PointsSource {
    type Arg = Coordinates;
    type Item = PointsResponse;

    async fn fetch(&self, coordinates: Coordinates) -> Result<PointsResponse> {
        let url = format!("{}points/{}", self.base_url, coordinates.to_param());
        get_json(&self.client, &url).await
    }

    async fn valid_until(&self, _key: &str, _item: &PointsResponse) -> Result<i64> {
        Ok(valid_for(chrono::Duration::weeks(METADATA_SHELF_LIFE_WEEKS)))
    }
}

struct StationsSource {
    client: Client,
}

#[async_trait]
impl FetchSource for StationsSource {
    type Arg = String;
    type Item = StationsResponse;

    async fn fetch(&self, stations_url: String) -> Result<StationsResponse> {
        get_json(&self.client, &stations_url).await
    }

    async fn valid_until(&self, _key: &str, _item: &StationsResponse) -> Result<i64> {
        Ok(valid_for(chrono::Duration::weeks(METADATA_SHELF_LIFE_WEEKS)))
    }
}

struct ObservationSource {
    client: Client,
    base_url: String,
}

#[async_trait]
impl FetchSource for ObservationSource {
    type Arg = String;
    type Item = ObservationResponse;

    async fn fetch(&self, station_id: String) -> Result<ObservationResponse> {
        let url = format!("{}stations/{station_id}/observations/latest", self.base_url);
        get_json(&self.client, &url).await
    }

    async fn valid_until(&self, _key: &str, item: &ObservationResponse) -> Result<i64> {
        Ok(match item.properties.timestamp {
            Some(reading) => reading.timestamp() + RECORDING_INTERVAL_SECS,
            None => 0,
        })
    }
}

struct SummaryForecastSource {
    client: Client,
}

#[async_trait]
impl FetchSource for SummaryForecastSource {
    type Arg = String;
    type Item = Option<ForecastResponse>;

    async fn fetch(&self, forecast_url: String) -> Result<Option<ForecastResponse>> {
        let request = self
            .client
            .get(&forecast_url)
            .header("Feature-Flags", "forecast_temperature_qv,forecast_wind_speed_qv");
        Ok(fetch_json_with_retry(
            "nws.summary_forecast",
            request,
            |forecast: &ForecastResponse| !forecast.properties.periods.is_empty(),
        )
        .await)
    }

    async fn valid_until(&self, _key: &str, item: &Option<ForecastResponse>) -> Result<i64> {
        Ok(forecast_valid_until(
            item.as_ref().and_then(|f| f.properties.update_time),
        ))
    }
}

struct GridDataSource {
    client: Client,
}

#[async_trait]
impl FetchSource for GridDataSource {
    type Arg = String;
    type Item = Option<GridDataResponse>;

    async fn fetch(&self, grid_url: String) -> Result<Option<GridDataResponse>> {
        let request = self.client.get(&grid_url);
        Ok(fetch_json_with_retry(
            "nws.forecast_grid_data",
            request,
            |grid: &GridDataResponse| grid.properties.update_time.is_some(),
        )
        .await)
    }

    async fn valid_until(&self, _key: &str, item: &Option<GridDataResponse>) -> Result<i64> {
        Ok(forecast_valid_until(
            item.as_ref().and_then(|g| g.properties.update_time),
        ))
    }
}

/// Client for the national forecast service.
pub struct NwsClient {
    client: Client,
    base_url: String,
    points: Cached<PointsSource>,
    stations: Cached<StationsSource>,
    current: Cached<ObservationSource>,
    summary_forecast: Cached<SummaryForecastSource>,
    forecast_grid: Cached<GridDataSource>,
}

impl NwsClient {
    /// # Errors
    ///
    /// Returns a configuration error when the HTTP client cannot be built.
    pub fn new(config: &NwsConfig, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(user_agent)
            .build()
            .map_err(|err| SkycastError::config(format!("failed to build HTTP client: {err}")))?;
        let base_url = config.base_url.clone();

        Ok(Self {
            points: Cached::new(
                "nws.points",
                PointsSource {
                    client: client.clone(),
                    base_url: base_url.clone(),
                },
            ),
            stations: Cached::new(
                "nws.stations",
                StationsSource {
                    client: client.clone(),
                },
            ),
            current: Cached::new(
                "nws.current",
                ObservationSource {
                    client: client.clone(),
                    base_url: base_url.clone(),
                },
            ),
            summary_forecast: Cached::new(
                "nws.summary_forecast",
                SummaryForecastSource {
                    client: client.clone(),
                },
            ),
            forecast_grid: Cached::new(
                "nws.forecast_grid_data",
                GridDataSource {
                    client: client.clone(),
                },
            ),
            client,
            base_url,
        })
    }

    /// Grid metadata for the queried coordinates.
    pub async fn points(&self, coordinates: Coordinates) -> Result<CacheEntry<PointsResponse>> {
        let key = coordinates.to_param();
        self.points.get(&key, coordinates).await
    }

    async fn stations(&self, coordinates: Coordinates) -> Result<CacheEntry<StationsResponse>> {
        let points = self.points(coordinates).await?;
        let stations_url = points.item.properties.observation_stations.clone();
        self.stations.get(&stations_url, stations_url.clone()).await
    }

    async fn nearest_station(&self, coordinates: Coordinates) -> Result<Option<StationFeature>> {
        let stations = self.stations(coordinates).await?;
        Ok(stations.item.features.into_iter().next())
    }

    /// Latest observation from the station nearest the queried coordinates.
    pub async fn current(&self, coordinates: Coordinates) -> Result<CacheEntry<ObservationResponse>> {
        let station = self.nearest_station(coordinates).await?.ok_or_else(|| {
            SkycastError::api(format!(
                "no observation stations near {}",
                coordinates.to_param()
            ))
        })?;
        let station_id = station.properties.station_identifier;
        self.current.get(&station_id, station_id.clone()).await
    }

    /// Summary forecast named by the points entry. The item is `None` when
    /// the upstream stayed unavailable through the whole retry budget.
    pub async fn summary_forecast(
        &self,
        points: &CacheEntry<PointsResponse>,
    ) -> Result<CacheEntry<Option<ForecastResponse>>> {
        let url = points.item.properties.forecast.clone();
        self.summary_forecast.get(&url, url.clone()).await
    }

    /// Gridded forecast data named by the points entry.
    pub async fn forecast_grid_data(
        &self,
        points: &CacheEntry<PointsResponse>,
    ) -> Result<CacheEntry<Option<GridDataResponse>>> {
        let url = points.item.properties.forecast_grid_data.clone();
        self.forecast_grid.get(&url, url.clone()).await
    }

    /// Active alerts for the queried point; intentionally uncached, alerts
    /// cannot tolerate a staleness window.
    pub async fn alerts(&self, coordinates: Option<Coordinates>) -> Result<AlertsResponse> {
        let mut request = self.client.get(format!("{}alerts/active", self.base_url));
        if let Some(coordinates) = coordinates {
            request = request.query(&[("point", coordinates.to_param())]);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SkycastError::api(format!("alerts request returned {status}")));
        }
        Ok(response.json().await?)
    }
}

//! Bounded-retry fetching for flaky upstreams.
//!
//! Some providers intermittently return errors or half-populated payloads.
//! [`fetch_json_with_retry`] absorbs those failures up to a fixed attempt
//! budget and degrades to a "no data" sentinel instead of erroring, so
//! callers treat a dead upstream like an empty one and diagnose via logs.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{error, info, warn};

/// Total attempts per request, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

/// Fetches and decodes JSON, retrying with exponential backoff.
///
/// An attempt fails when the request errors, the status is not `200 OK`, the
/// body fails to decode, or `accept` rejects the decoded payload. Failed
/// attempts wait `2^(attempt-1)` seconds before retrying. Once the attempt
/// budget is spent the failure is logged and `None` is returned; callers
/// must treat that the same as a legitimately empty result.
pub async fn fetch_json_with_retry<T, F>(label: &str, request: RequestBuilder, accept: F) -> Option<T>
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool,
{
    for attempt in 1..=MAX_ATTEMPTS {
        match attempt_fetch(&request, &accept).await {
            Ok(payload) => {
                if attempt > 1 {
                    info!(source = label, "attempt #{attempt} succeeded");
                }
                return Some(payload);
            }
            Err(reason) => {
                warn!(source = label, "attempt #{attempt} failed: {reason}");
            }
        }
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(Duration::from_secs(1 << (attempt - 1))).await;
        }
    }

    error!(source = label, "all attempts failed, returning no data");
    None
}

async fn attempt_fetch<T, F>(request: &RequestBuilder, accept: &F) -> Result<T, String>
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool,
{
    let request = request
        .try_clone()
        .ok_or_else(|| "request cannot be cloned for retry".to_owned())?;
    let response = request
        .send()
        .await
        .map_err(|err| format!("request error: {err}"))?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(format!("unexpected status {status}"));
    }

    let payload: T = response
        .json()
        .await
        .map_err(|err| format!("decode error: {err}"))?;
    if !accept(&payload) {
        return Err("payload rejected by acceptance check".to_owned());
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Payload {
        value: u32,
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": 7})))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let request = client.get(format!("{}/data", server.uri()));
        let payload: Option<Payload> = fetch_json_with_retry("test.data", request, |p: &Payload| p.value > 0).await;

        assert_eq!(payload.map(|p| p.value), Some(7));
    }

    #[tokio::test]
    async fn test_retries_after_server_error_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": 3})))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let request = client.get(format!("{}/data", server.uri()));
        let payload: Option<Payload> = fetch_json_with_retry("test.data", request, |_| true).await;

        assert_eq!(payload.map(|p| p.value), Some(3));
    }

    #[tokio::test]
    async fn test_rejected_payload_exhausts_to_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": 0})))
            .expect(u64::from(MAX_ATTEMPTS))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let request = client.get(format!("{}/data", server.uri()));
        let payload: Option<Payload> = fetch_json_with_retry("test.data", request, |p: &Payload| p.value > 0).await;

        assert!(payload.is_none());
    }
}

//! Elering NPS client for day-ahead spot prices.
//!
//! Fetches today's and tomorrow's prices for one bidding area and turns
//! them into a validated [`PriceSeries`] in cents per kWh.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use spotplug_types::PriceSample;

use crate::series::{PriceSeries, SeriesError};

/// Default Elering price endpoint.
pub const ELERING_URL: &str = "https://dashboard.elering.ee/api/nps/price";

/// Default bidding area.
pub const DEFAULT_AREA: &str = "ee";

/// Errors from fetching or decoding a price series.
#[derive(Debug, thiserror::Error)]
pub enum PriceSourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid price series: {0}")]
    InvalidSeries(#[from] SeriesError),
}

/// Anything that can supply a full price series.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, now: DateTime<Utc>) -> Result<PriceSeries, PriceSourceError>;
}

/// Elering API response.
#[derive(Debug, Deserialize)]
struct NpsResponse {
    data: HashMap<String, Vec<NpsEntry>>,
}

#[derive(Debug, Deserialize)]
struct NpsEntry {
    /// Unix timestamp in seconds
    timestamp: i64,
    /// EUR per MWh
    price: f64,
}

/// Client for the Elering NPS price API.
#[derive(Debug, Clone)]
pub struct EleringClient {
    http: reqwest::Client,
    url: String,
    area: String,
}

impl EleringClient {
    /// Create a client for the default endpoint and area.
    pub fn new() -> Self {
        Self::with_url(ELERING_URL, DEFAULT_AREA)
    }

    /// Create a client with a custom endpoint and bidding area.
    pub fn with_url(url: &str, area: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.to_string(),
            area: area.to_lowercase(),
        }
    }

    /// Query window: start of today (UTC) through the end of tomorrow.
    fn window(now: DateTime<Utc>) -> (String, String) {
        let start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();
        let end = start + Duration::days(2);
        let fmt = "%Y-%m-%dT%H:%M:%S.000Z";
        (start.format(fmt).to_string(), end.format(fmt).to_string())
    }

    fn parse(&self, body: NpsResponse) -> Result<PriceSeries, PriceSourceError> {
        let entries = body.data.get(&self.area).ok_or_else(|| {
            PriceSourceError::InvalidResponse(format!("no prices for area '{}'", self.area))
        })?;

        let samples = entries
            .iter()
            .map(|entry| {
                let timestamp = DateTime::from_timestamp(entry.timestamp, 0).ok_or_else(|| {
                    PriceSourceError::InvalidResponse(format!(
                        "timestamp out of range: {}",
                        entry.timestamp
                    ))
                })?;
                // EUR/MWh -> cents/kWh
                Ok(PriceSample::new(timestamp, entry.price / 10.0))
            })
            .collect::<Result<Vec<_>, PriceSourceError>>()?;

        Ok(PriceSeries::new(samples)?)
    }
}

impl Default for EleringClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceSource for EleringClient {
    async fn fetch(&self, now: DateTime<Utc>) -> Result<PriceSeries, PriceSourceError> {
        let (start, end) = Self::window(now);
        debug!("Fetching electricity prices from {} to {}", start, end);

        let text = self
            .http
            .get(&self.url)
            .query(&[("start", start.as_str()), ("end", end.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let series = self.parse(serde_json::from_str(&text)?)?;
        info!("Fetched {} price entries for {}", series.len(), self.area);
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_covers_two_days() {
        let now = DateTime::parse_from_rfc3339("2025-03-10T17:42:11Z")
            .unwrap()
            .with_timezone(&Utc);
        let (start, end) = EleringClient::window(now);

        assert_eq!(start, "2025-03-10T00:00:00.000Z");
        assert_eq!(end, "2025-03-12T00:00:00.000Z");
    }

    #[test]
    fn test_parse_converts_units() {
        let body: NpsResponse = serde_json::from_str(
            r#"{"success":true,"data":{"ee":[
                {"timestamp":1735689600,"price":85.0},
                {"timestamp":1735690500,"price":-12.5}
            ],"fi":[]}}"#,
        )
        .unwrap();

        let series = EleringClient::new().parse(body).unwrap();

        assert_eq!(series.len(), 2);
        assert!((series.samples()[0].price - 8.5).abs() < 1e-9);
        assert!((series.samples()[1].price + 1.25).abs() < 1e-9);
        assert_eq!(series.step(), Duration::minutes(15));
    }

    #[test]
    fn test_parse_missing_area() {
        let body: NpsResponse = serde_json::from_str(r#"{"data":{"lv":[]}}"#).unwrap();

        assert!(matches!(
            EleringClient::new().parse(body),
            Err(PriceSourceError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unordered() {
        let body: NpsResponse = serde_json::from_str(
            r#"{"data":{"ee":[
                {"timestamp":1735690500,"price":1.0},
                {"timestamp":1735689600,"price":1.0}
            ]}}"#,
        )
        .unwrap();

        assert!(matches!(
            EleringClient::new().parse(body),
            Err(PriceSourceError::InvalidSeries(_))
        ));
    }
}

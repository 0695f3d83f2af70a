/// Best-effort IP geolocation for lockout forensics
///
/// Every failure mode — bad status, malformed body, timeout, lookup
/// refusal — degrades to a placeholder. This lookup can never fail a
/// caller.

use crate::{
    config::GeolocationConfig,
    error::{CoreError, CoreResult},
};
use serde::Deserialize;

const UNKNOWN_LOCATION: &str = "Unknown location";

/// Resolved (or degraded) location for an IP address
#[derive(Debug, Clone, PartialEq)]
pub struct GeoInfo {
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GeoInfo {
    /// The placeholder used whenever resolution is unavailable
    pub fn unknown() -> Self {
        Self {
            location: UNKNOWN_LOCATION.to_string(),
            latitude: None,
            longitude: None,
        }
    }
}

/// ip-api.com JSON response shape
#[derive(Debug, Deserialize)]
struct GeoApiResponse {
    status: String,
    city: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
    country: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Geolocation lookup service
pub struct GeoLocator {
    client: reqwest::Client,
    endpoint: String,
}

impl GeoLocator {
    /// Create a new locator with a short request timeout
    pub fn new(config: &GeolocationConfig) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Skytrade-Core/0.1")
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve an IP to an approximate location
    pub async fn lookup(&self, ip: &str) -> GeoInfo {
        let url = format!("{}/{}", self.endpoint, ip);

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Geolocation lookup failed for {}: {}", ip, e);
                return GeoInfo::unknown();
            }
        };

        if !response.status().is_success() {
            tracing::warn!(
                "Geolocation lookup for {} returned status {}",
                ip,
                response.status()
            );
            return GeoInfo::unknown();
        }

        let body: GeoApiResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("Geolocation response for {} was malformed: {}", ip, e);
                return GeoInfo::unknown();
            }
        };

        if body.status != "success" {
            return GeoInfo::unknown();
        }

        let parts: Vec<String> = [body.city, body.region_name, body.country]
            .into_iter()
            .flatten()
            .collect();

        if parts.is_empty() {
            return GeoInfo::unknown();
        }

        GeoInfo {
            location: parts.join(", "),
            latitude: body.lat,
            longitude: body.lon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_placeholder() {
        let info = GeoInfo::unknown();
        assert_eq!(info.location, "Unknown location");
        assert!(info.latitude.is_none());
        assert!(info.longitude.is_none());
    }

    #[test]
    fn test_response_parsing() {
        let body: GeoApiResponse = serde_json::from_str(
            r#"{"status":"success","city":"Lisbon","regionName":"Lisboa","country":"Portugal","lat":38.72,"lon":-9.13}"#,
        )
        .unwrap();
        assert_eq!(body.status, "success");
        assert_eq!(body.city.as_deref(), Some("Lisbon"));
        assert_eq!(body.lat, Some(38.72));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_degrades() {
        let locator = GeoLocator::new(&GeolocationConfig {
            // Reserved TEST-NET address, nothing listens there
            endpoint: "http://192.0.2.1/json".to_string(),
            timeout_secs: 1,
        })
        .unwrap();

        let info = locator.lookup("203.0.113.7").await;
        assert_eq!(info, GeoInfo::unknown());
    }
}

/// OpenWeather current-weather API client
///
/// Issues one GET per coordinate pair and classifies the outcome. No retry
/// happens here: transient failures are retried by the next scheduled cycle.
///
/// API Documentation: https://openweathermap.org/current

use reqwest::Url;
use serde_json::Value;

use crate::ingest::http::HttpGet;
use crate::model::{ApiError, is_valid_latitude, is_valid_longitude};

/// Error bodies are kept for diagnostics but clipped to this many characters.
const MAX_ERROR_BODY_CHARS: usize = 200;

// ============================================================================
// Client contract
// ============================================================================

/// A weather provider that returns the raw JSON payload for a location.
pub trait ApiClient {
    /// Whether a credential is configured. Checked once per cycle, before
    /// anything else happens.
    fn has_credential(&self) -> bool;

    fn fetch(&self, latitude: f64, longitude: f64) -> Result<Value, ApiError>;
}

// ============================================================================
// OpenWeather implementation
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenWeatherClient<H> {
    http: H,
    base_url: String,
    api_key: Option<String>,
}

impl<H: HttpGet> OpenWeatherClient<H> {
    pub fn new(http: H, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn http(&self) -> &H {
        &self.http
    }
}

impl<H: HttpGet> ApiClient for OpenWeatherClient<H> {
    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn fetch(&self, latitude: f64, longitude: f64) -> Result<Value, ApiError> {
        let api_key = self.api_key.as_deref().ok_or(ApiError::MissingCredential)?;

        if !is_valid_latitude(latitude) || !is_valid_longitude(longitude) {
            return Err(ApiError::InvalidCoordinates {
                lat: latitude,
                lon: longitude,
            });
        }

        let url = build_weather_url(&self.base_url, api_key, latitude, longitude)?;

        let response = self
            .http
            .get(&url)
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        classify_response(response.status, &response.body)
    }
}

/// Build `<base>?lat=..&lon=..&appid=..`.
pub fn build_weather_url(
    base_url: &str,
    api_key: &str,
    latitude: f64,
    longitude: f64,
) -> Result<Url, ApiError> {
    Url::parse_with_params(
        base_url,
        &[
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
            ("appid", api_key.to_string()),
        ],
    )
    .map_err(|e| ApiError::Transport(format!("invalid API URL '{}': {}", base_url, e)))
}

/// Map status + body onto the client's result.
///
/// 2xx must carry a JSON body; 4xx and 5xx keep the (clipped) body so the
/// provider's explanation ends up in the log.
pub fn classify_response(status: u16, body: &str) -> Result<Value, ApiError> {
    match status {
        200..=299 => serde_json::from_str(body).map_err(|e| ApiError::InvalidResponse(e.to_string())),
        400..=499 => Err(ApiError::Client {
            status,
            body: truncate_body(body),
        }),
        500..=599 => Err(ApiError::Server {
            status,
            body: truncate_body(body),
        }),
        _ => Err(ApiError::UnexpectedStatus { status }),
    }
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_ERROR_BODY_CHARS {
        let clipped: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{}...", clipped)
    } else {
        trimmed.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

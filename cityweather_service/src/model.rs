/// Core data types for the city weather collector.
///
/// This module defines the shared domain model imported by all other modules:
/// cities, stored observations, the closed weather-condition set, and the
/// error taxonomy used across ingest, validation, storage and the cycle.
/// It contains no I/O.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Physical ranges
// ---------------------------------------------------------------------------

pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

/// Upper bound for sea-level pressure in hPa. Lower bound is exclusive zero.
pub const MAX_PRESSURE_HPA: i32 = 1500;

pub fn is_valid_latitude(lat: f64) -> bool {
    lat.is_finite() && (LATITUDE_RANGE.0..=LATITUDE_RANGE.1).contains(&lat)
}

pub fn is_valid_longitude(lon: f64) -> bool {
    lon.is_finite() && (LONGITUDE_RANGE.0..=LONGITUDE_RANGE.1).contains(&lon)
}

// ---------------------------------------------------------------------------
// City
// ---------------------------------------------------------------------------

/// A tracked city, as stored after seeding.
///
/// Cities are inserted once from the reference list and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub id: Uuid,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub population: i64,
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: population({}), (lat={}, lon={})",
            self.name, self.population, self.lat, self.lon
        )
    }
}

// ---------------------------------------------------------------------------
// Weather condition
// ---------------------------------------------------------------------------

/// OpenWeather's top-level condition groups (`weather[].main`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Thunderstorm,
    Drizzle,
    Rain,
    Snow,
    Mist,
    Smoke,
    Haze,
    Dust,
    Fog,
    Sand,
    Ash,
    Squall,
    Tornado,
    Clear,
    Clouds,
}

impl Condition {
    pub const ALL: [Condition; 15] = [
        Condition::Thunderstorm,
        Condition::Drizzle,
        Condition::Rain,
        Condition::Snow,
        Condition::Mist,
        Condition::Smoke,
        Condition::Haze,
        Condition::Dust,
        Condition::Fog,
        Condition::Sand,
        Condition::Ash,
        Condition::Squall,
        Condition::Tornado,
        Condition::Clear,
        Condition::Clouds,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Thunderstorm => "Thunderstorm",
            Condition::Drizzle => "Drizzle",
            Condition::Rain => "Rain",
            Condition::Snow => "Snow",
            Condition::Mist => "Mist",
            Condition::Smoke => "Smoke",
            Condition::Haze => "Haze",
            Condition::Dust => "Dust",
            Condition::Fog => "Fog",
            Condition::Sand => "Sand",
            Condition::Ash => "Ash",
            Condition::Squall => "Squall",
            Condition::Tornado => "Tornado",
            Condition::Clear => "Clear",
            Condition::Clouds => "Clouds",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Condition::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownCondition(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Stored observation
// ---------------------------------------------------------------------------

/// One persisted weather snapshot for a city.
///
/// `created_at` is the write time, not the provider's `dt`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherObservation {
    pub id: Uuid,
    pub city_id: Uuid,
    pub temperature: f64, // Kelvin
    pub condition: Condition,
    pub description: String,
    pub pressure: i32,
    pub humidity: i32,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub clouds: i32,
    pub created_at: DateTime<Utc>,
}

/// Step of the per-city pipeline a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Validate,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Validate => write!(f, "validate"),
            Stage::Persist => write!(f, "persist"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures from a single weather API call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// No API key configured; raised before any request is built.
    #[error("API key is not configured")]
    MissingCredential,
    #[error("coordinates out of range: lat={lat}, lon={lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },
    /// 4xx: bad key or bad request; will repeat until an operator intervenes.
    #[error("client error ({status}): {body}")]
    Client { status: u16, body: String },
    /// 5xx: upstream fault, retried next cycle.
    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },
    #[error("unexpected HTTP status: {status}")]
    UnexpectedStatus { status: u16 },
    #[error("invalid response body: {0}")]
    InvalidResponse(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    /// Errors that are expected to clear up by the next scheduled cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Server { .. }
                | ApiError::UnexpectedStatus { .. }
                | ApiError::InvalidResponse(_)
                | ApiError::Transport(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::MissingCredential => "missing_credential",
            ApiError::InvalidCoordinates { .. } => "invalid_coordinates",
            ApiError::Client { .. } => "client_error",
            ApiError::Server { .. } => "server_error",
            ApiError::UnexpectedStatus { .. } => "unexpected_status",
            ApiError::InvalidResponse(_) => "invalid_response",
            ApiError::Transport(_) => "transport_error",
        }
    }
}

/// Payload rejected by the response schema validator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// Missing field or wrong type; the message comes from serde and names the field.
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("payload contains no weather condition entry")]
    MissingCondition,
    #[error("unknown weather condition '{0}'")]
    UnknownCondition(String),
    #[error("{field} out of range: got {value}, expected {expected}")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl ValidationError {
    /// Name of the offending field, when the failure is a range check.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::OutOfRange { field, .. } => Some(field),
            ValidationError::MissingCondition | ValidationError::UnknownCondition(_) => {
                Some("weather")
            }
            ValidationError::Malformed(_) => None,
        }
    }
}

/// Failures from the relational store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// Connection could not be established (or was lost and could not be re-established).
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Write failed: constraint violation, aborted transaction, lost connection.
    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Errors that abort a whole cycle. Everything else is per-city.
#[derive(Debug, Error, PartialEq)]
pub enum CycleError {
    #[error("cycle aborted: API key is not configured")]
    MissingCredential,
    #[error("cycle aborted: cannot resolve city list: {0}")]
    StoreUnavailable(StoreError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_round_trips_through_str() {
        for condition in Condition::ALL {
            assert_eq!(condition.as_str().parse::<Condition>(), Ok(condition));
        }
    }

    #[test]
    fn test_condition_rejects_unknown_and_wrong_case() {
        assert_eq!(
            "Sunny".parse::<Condition>(),
            Err(ValidationError::UnknownCondition("Sunny".to_string()))
        );
        assert!("rain".parse::<Condition>().is_err());
    }

    #[test]
    fn test_coordinate_bounds_are_inclusive() {
        assert!(is_valid_latitude(90.0));
        assert!(is_valid_latitude(-90.0));
        assert!(!is_valid_latitude(90.0001));
        assert!(is_valid_longitude(-180.0));
        assert!(!is_valid_longitude(180.5));
        assert!(!is_valid_longitude(f64::NAN));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::Server { status: 503, body: String::new() }.is_transient());
        assert!(ApiError::Transport("timed out".into()).is_transient());
        assert!(ApiError::InvalidResponse("eof".into()).is_transient());
        assert!(!ApiError::Client { status: 401, body: String::new() }.is_transient());
        assert!(!ApiError::MissingCredential.is_transient());
    }

    #[test]
    fn test_validation_error_names_field() {
        let err = ValidationError::OutOfRange {
            field: "humidity",
            value: "150".to_string(),
            expected: "[0, 100]",
        };
        assert_eq!(err.field(), Some("humidity"));
        assert!(err.to_string().contains("humidity"));
    }
}

/// City reference list used to seed the store.
///
/// The list lives in `data/cities.toml` and is compiled into the binary so
/// seeding never depends on the working directory. It is the single source
/// of truth for which cities can be tracked; the store decides which of them
/// are in the top N at query time.

use serde::Deserialize;
use thiserror::Error;

use crate::model::{is_valid_latitude, is_valid_longitude};

const REFERENCE_CITIES_TOML: &str = include_str!("../data/cities.toml");

// ---------------------------------------------------------------------------
// Reference entries
// ---------------------------------------------------------------------------

/// One row of the reference list, before it has been assigned an id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReferenceCity {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub population: i64,
}

#[derive(Debug, Deserialize)]
struct ReferenceFile {
    #[serde(default)]
    city: Vec<ReferenceCity>,
}

#[derive(Debug, Error, PartialEq)]
pub enum CityListError {
    #[error("failed to parse city list: {0}")]
    Parse(String),
    #[error("city list is empty")]
    Empty,
    #[error("invalid entry '{name}': {reason}")]
    InvalidEntry { name: String, reason: String },
    #[error("duplicate city name '{0}'")]
    Duplicate(String),
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parse and validate the built-in reference list.
pub fn load_reference_cities() -> Result<Vec<ReferenceCity>, CityListError> {
    parse_reference_cities(REFERENCE_CITIES_TOML)
}

/// Parse a reference list in the `[[city]]` TOML layout.
///
/// Every entry must have in-range coordinates, a non-negative population and
/// a name that is unique (case-insensitively) within the list.
pub fn parse_reference_cities(text: &str) -> Result<Vec<ReferenceCity>, CityListError> {
    let file: ReferenceFile =
        toml::from_str(text).map_err(|e| CityListError::Parse(e.to_string()))?;

    if file.city.is_empty() {
        return Err(CityListError::Empty);
    }

    let mut seen = std::collections::HashSet::new();
    for city in &file.city {
        let invalid = |reason: String| CityListError::InvalidEntry {
            name: city.name.clone(),
            reason,
        };

        if city.name.trim().is_empty() {
            return Err(invalid("name is empty".to_string()));
        }
        if !is_valid_latitude(city.lat) {
            return Err(invalid(format!("latitude {} outside [-90, 90]", city.lat)));
        }
        if !is_valid_longitude(city.lon) {
            return Err(invalid(format!("longitude {} outside [-180, 180]", city.lon)));
        }
        if city.population < 0 {
            return Err(invalid(format!("negative population {}", city.population)));
        }
        if !seen.insert(city.name.to_lowercase()) {
            return Err(CityListError::Duplicate(city.name.clone()));
        }
    }

    Ok(file.city)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

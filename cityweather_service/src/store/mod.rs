/// Storage contracts for cities and weather observations.
///
/// - `pg`: production backend (`postgres` crate, one connection per store).
/// - `memory`: in-process backend for development runs (`memory://`) and tests.
///
/// Every write is its own transaction; nothing spans more than one city.

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::cities::ReferenceCity;
use crate::model::{City, StoreError, WeatherObservation};
use crate::validate::WeatherReading;

pub mod memory;
pub mod pg;

pub trait CityStore {
    /// Bulk-insert `reference` in batches of `chunk_size` if the store holds
    /// no cities. Returns the number of rows inserted (0 if already seeded).
    fn seed_if_empty(
        &mut self,
        reference: &[ReferenceCity],
        chunk_size: usize,
    ) -> Result<usize, StoreError>;

    /// Up to `n` cities, most populous first; equal populations keep
    /// insertion order.
    fn top_cities(&mut self, n: usize) -> Result<Vec<City>, StoreError>;

    fn count(&mut self) -> Result<usize, StoreError>;

    /// Case-insensitive lookup by name.
    fn find_by_name(&mut self, name: &str) -> Result<Option<City>, StoreError>;
}

pub trait WeatherStore {
    /// Persist `reading` for `city` with a fresh id and the current time.
    fn append(
        &mut self,
        reading: &WeatherReading,
        city: &City,
    ) -> Result<WeatherObservation, StoreError>;

    /// Observations for `city`, most recent first.
    fn history(&mut self, city: &City) -> Result<Vec<WeatherObservation>, StoreError>;
}

/// Build the row `append` writes. Timestamps are truncated to microseconds,
/// the resolution of `TIMESTAMPTZ`, so a stored row reads back unchanged.
pub fn new_observation(
    reading: &WeatherReading,
    city: &City,
    now: DateTime<Utc>,
) -> WeatherObservation {
    WeatherObservation {
        id: Uuid::new_v4(),
        city_id: city.id,
        temperature: reading.temperature(),
        condition: reading.condition(),
        description: reading.description().to_string(),
        pressure: reading.pressure(),
        humidity: reading.humidity(),
        wind_speed: reading.wind_speed(),
        wind_direction: reading.wind_direction(),
        clouds: reading.clouds(),
        created_at: now.trunc_subsecs(6),
    }
}

/// Assign ids to reference entries, preserving order.
pub fn new_cities(reference: &[ReferenceCity]) -> Vec<City> {
    reference
        .iter()
        .map(|r| City {
            id: Uuid::new_v4(),
            name: r.name.clone(),
            lat: r.lat,
            lon: r.lon,
            population: r.population,
        })
        .collect()
}

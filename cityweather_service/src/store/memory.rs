/// In-process store.
///
/// Backs `DATABASE_URL=memory://` for running the pipeline without a
/// database, and the pipeline tests. Mirrors the relational backend's
/// behaviour: insertion-ordered ties, foreign-key check on append,
/// most-recent-first history. Data is lost when the process exits.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::Utc;

use crate::cities::ReferenceCity;
use crate::model::{City, StoreError, WeatherObservation};
use crate::store::{CityStore, WeatherStore, new_cities, new_observation};
use crate::validate::WeatherReading;

#[derive(Debug, Default)]
struct Tables {
    /// Insertion order.
    cities: Vec<City>,
    /// Insertion order; history reverses it.
    weather: Vec<WeatherObservation>,
    /// Test hook: when set, every write fails with this error.
    fail_writes: Option<StoreError>,
}

/// Shared tables. Hand out one handle per store trait.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Rc<RefCell<Tables>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn city_store(&self) -> MemoryCityStore {
        MemoryCityStore {
            tables: Rc::clone(&self.tables),
        }
    }

    pub fn weather_store(&self) -> MemoryWeatherStore {
        MemoryWeatherStore {
            tables: Rc::clone(&self.tables),
        }
    }

    pub fn observation_count(&self) -> usize {
        self.tables.borrow().weather.len()
    }

    /// Make every subsequent write fail with `error` (`None` to clear).
    pub fn fail_writes(&self, error: Option<StoreError>) {
        self.tables.borrow_mut().fail_writes = error;
    }
}

#[derive(Debug, Clone)]
pub struct MemoryCityStore {
    tables: Rc<RefCell<Tables>>,
}

#[derive(Debug, Clone)]
pub struct MemoryWeatherStore {
    tables: Rc<RefCell<Tables>>,
}

impl CityStore for MemoryCityStore {
    fn seed_if_empty(
        &mut self,
        reference: &[ReferenceCity],
        chunk_size: usize,
    ) -> Result<usize, StoreError> {
        let mut tables = self.tables.borrow_mut();
        if !tables.cities.is_empty() {
            return Ok(0);
        }
        if let Some(err) = tables.fail_writes.clone() {
            return Err(err);
        }

        let mut inserted = 0;
        for chunk in reference.chunks(chunk_size.max(1)) {
            tables.cities.extend(new_cities(chunk));
            inserted += chunk.len();
        }
        Ok(inserted)
    }

    fn top_cities(&mut self, n: usize) -> Result<Vec<City>, StoreError> {
        let tables = self.tables.borrow();
        let mut cities = tables.cities.clone();
        // Stable sort keeps insertion order among equal populations.
        cities.sort_by(|a, b| b.population.cmp(&a.population));
        cities.truncate(n);
        Ok(cities)
    }

    fn count(&mut self) -> Result<usize, StoreError> {
        Ok(self.tables.borrow().cities.len())
    }

    fn find_by_name(&mut self, name: &str) -> Result<Option<City>, StoreError> {
        let wanted = name.trim().to_lowercase();
        Ok(self
            .tables
            .borrow()
            .cities
            .iter()
            .find(|c| c.name.to_lowercase() == wanted)
            .cloned())
    }
}

impl WeatherStore for MemoryWeatherStore {
    fn append(
        &mut self,
        reading: &WeatherReading,
        city: &City,
    ) -> Result<WeatherObservation, StoreError> {
        let mut tables = self.tables.borrow_mut();
        if let Some(err) = tables.fail_writes.clone() {
            return Err(err);
        }
        if !tables.cities.iter().any(|c| c.id == city.id) {
            return Err(StoreError::Persistence(format!(
                "city_id {} does not reference an existing city",
                city.id
            )));
        }

        let observation = new_observation(reading, city, Utc::now());
        tables.weather.push(observation.clone());
        Ok(observation)
    }

    fn history(&mut self, city: &City) -> Result<Vec<WeatherObservation>, StoreError> {
        let tables = self.tables.borrow();
        let mut rows: Vec<WeatherObservation> = tables
            .weather
            .iter()
            .rev()
            .filter(|o| o.city_id == city.id)
            .cloned()
            .collect();
        // Stable: rows with equal created_at stay newest-inserted first.
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

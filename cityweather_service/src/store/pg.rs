/// PostgreSQL-backed stores.
///
/// Schema: `sql/001_cities_weather.sql`. `cities.seq` and `weather.seq` are
/// BIGSERIAL insertion counters used as stable tie-breakers.

use chrono::{DateTime, Utc};
use postgres::Row;
use uuid::Uuid;

use crate::cities::ReferenceCity;
use crate::db::PgConnection;
use crate::logging::DataSource;
use crate::model::{City, Condition, StoreError, WeatherObservation};
use crate::store::{CityStore, WeatherStore, new_cities, new_observation};
use crate::validate::WeatherReading;

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// A dropped connection is reported as unavailability; anything else
/// (constraint violations, bad SQL) as a failed write.
fn persistence_error(err: postgres::Error) -> StoreError {
    if err.is_closed() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Persistence(err.to_string())
    }
}

fn read_error(err: postgres::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

// ---------------------------------------------------------------------------
// Cities
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PgCityStore {
    conn: PgConnection,
}

impl PgCityStore {
    pub fn new(conn: PgConnection) -> Self {
        Self { conn }
    }
}

fn city_from_row(row: &Row) -> City {
    City {
        id: row.get("id"),
        name: row.get("name"),
        lat: row.get("lat"),
        lon: row.get("lon"),
        population: row.get("population"),
    }
}

impl CityStore for PgCityStore {
    fn seed_if_empty(
        &mut self,
        reference: &[ReferenceCity],
        chunk_size: usize,
    ) -> Result<usize, StoreError> {
        if self.count()? > 0 {
            return Ok(0);
        }

        let client = self.conn.client()?;
        let mut inserted = 0;
        for chunk in reference.chunks(chunk_size.max(1)) {
            let mut tx = client.transaction().map_err(persistence_error)?;
            let stmt = tx
                .prepare(
                    "INSERT INTO cities (id, name, lat, lon, population)
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .map_err(persistence_error)?;
            for city in new_cities(chunk) {
                tx.execute(
                    &stmt,
                    &[&city.id, &city.name, &city.lat, &city.lon, &city.population],
                )
                .map_err(persistence_error)?;
            }
            tx.commit().map_err(persistence_error)?;
            inserted += chunk.len();
        }

        tracing::info!(source = %DataSource::Database, inserted, "seeded cities table");
        Ok(inserted)
    }

    fn top_cities(&mut self, n: usize) -> Result<Vec<City>, StoreError> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let rows = self
            .conn
            .client()?
            .query(
                "SELECT id, name, lat, lon, population
                 FROM cities
                 ORDER BY population DESC, seq ASC
                 LIMIT $1",
                &[&limit],
            )
            .map_err(read_error)?;
        Ok(rows.iter().map(city_from_row).collect())
    }

    fn count(&mut self) -> Result<usize, StoreError> {
        let row = self
            .conn
            .client()?
            .query_one("SELECT COUNT(*) FROM cities", &[])
            .map_err(read_error)?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as usize)
    }

    fn find_by_name(&mut self, name: &str) -> Result<Option<City>, StoreError> {
        let row = self
            .conn
            .client()?
            .query_opt(
                "SELECT id, name, lat, lon, population
                 FROM cities
                 WHERE lower(name) = lower($1)
                 ORDER BY seq
                 LIMIT 1",
                &[&name.trim()],
            )
            .map_err(read_error)?;
        Ok(row.as_ref().map(city_from_row))
    }
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PgWeatherStore {
    conn: PgConnection,
}

impl PgWeatherStore {
    pub fn new(conn: PgConnection) -> Self {
        Self { conn }
    }
}

fn observation_from_row(row: &Row) -> Result<WeatherObservation, StoreError> {
    let condition: String = row.get("condition");
    let condition: Condition = condition
        .parse()
        .map_err(|e| StoreError::Persistence(format!("corrupt weather row: {}", e)))?;
    let created_at: DateTime<Utc> = row.get("created_at");
    let id: Uuid = row.get("id");

    Ok(WeatherObservation {
        id,
        city_id: row.get("city_id"),
        temperature: row.get("temperature"),
        condition,
        description: row.get("description"),
        pressure: row.get("pressure"),
        humidity: row.get("humidity"),
        wind_speed: row.get("wind_speed"),
        wind_direction: row.get("wind_direction"),
        clouds: row.get("clouds"),
        created_at,
    })
}

impl WeatherStore for PgWeatherStore {
    fn append(
        &mut self,
        reading: &WeatherReading,
        city: &City,
    ) -> Result<WeatherObservation, StoreError> {
        let obs = new_observation(reading, city, Utc::now());
        let client = self.conn.client()?;

        let mut tx = client.transaction().map_err(persistence_error)?;
        tx.execute(
            "INSERT INTO weather
                 (id, city_id, temperature, condition, description, pressure,
                  humidity, wind_speed, wind_direction, clouds, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            &[
                &obs.id,
                &obs.city_id,
                &obs.temperature,
                &obs.condition.as_str(),
                &obs.description,
                &obs.pressure,
                &obs.humidity,
                &obs.wind_speed,
                &obs.wind_direction,
                &obs.clouds,
                &obs.created_at,
            ],
        )
        .map_err(persistence_error)?;
        tx.commit().map_err(persistence_error)?;

        tracing::info!(source = %DataSource::Database, city = %city.name, "weather observation saved");
        Ok(obs)
    }

    fn history(&mut self, city: &City) -> Result<Vec<WeatherObservation>, StoreError> {
        let rows = self
            .conn
            .client()?
            .query(
                "SELECT id, city_id, temperature, condition, description, pressure,
                        humidity, wind_speed, wind_direction, clouds, created_at
                 FROM weather
                 WHERE city_id = $1
                 ORDER BY created_at DESC, seq DESC",
                &[&city.id],
            )
            .map_err(read_error)?;
        rows.iter().map(observation_from_row).collect()
    }
}

/// One fetch cycle: resolve cities, then fetch → validate → persist each.
///
/// ```text
/// Idle → [Seeding] → Fetching[i] → Validating[i] → Persisting[i] → … → Idle
/// ```
///
/// A failure for one city is logged, recorded in the `CycleReport`, and the
/// cycle moves on. Only a missing API key or an unreachable city list abort
/// the cycle. Retry is the next scheduled cycle; nothing is retried here.
///
/// Cycles are not re-entrant: the caller (the `watch` loop) runs them
/// back-to-back on one thread, so two cycles never overlap.

use std::time::Duration;

use crate::cities::ReferenceCity;
use crate::ingest::openweather::ApiClient;
use crate::logging::{self, DataSource};
use crate::model::{ApiError, City, CycleError};

pub use crate::model::Stage;
use crate::store::{CityStore, WeatherStore};
use crate::validate;

// ---------------------------------------------------------------------------
// Settings and report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSettings {
    /// How many of the most populous cities to fetch.
    pub cities_count: usize,
    /// Seeding batch size.
    pub chunk_size: usize,
    /// Consecutive 4xx responses after which the remaining cities are
    /// skipped. `0` never skips.
    pub client_error_limit: usize,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            cities_count: crate::config::DEFAULT_CITIES_COUNT,
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
            client_error_limit: crate::config::DEFAULT_CLIENT_ERROR_LIMIT,
        }
    }
}

impl From<&crate::config::Config> for CycleSettings {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            cities_count: config.cities_count,
            chunk_size: config.chunk_size,
            client_error_limit: config.client_error_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CityFailure {
    pub city: String,
    pub stage: Stage,
    /// Short machine-readable error kind, e.g. `server_error`.
    pub kind: &'static str,
    pub message: String,
}

/// Outcome of a cycle that ran to completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Rows inserted by seeding during this cycle (0 when already seeded).
    pub seeded: usize,
    pub attempted: usize,
    pub persisted: usize,
    /// Cities not attempted because of repeated 4xx responses.
    pub skipped: usize,
    pub failures: Vec<CityFailure>,
}

impl CycleReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Holds the collaborators for a cycle; no state carries over between cycles.
pub struct Pipeline<A, C, W> {
    api: A,
    cities: C,
    weather: W,
    reference: Vec<ReferenceCity>,
    settings: CycleSettings,
}

impl<A, C, W> Pipeline<A, C, W>
where
    A: ApiClient,
    C: CityStore,
    W: WeatherStore,
{
    pub fn new(
        api: A,
        cities: C,
        weather: W,
        reference: Vec<ReferenceCity>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            api,
            cities,
            weather,
            reference,
            settings,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn city_store(&mut self) -> &mut C {
        &mut self.cities
    }

    pub fn weather_store(&mut self) -> &mut W {
        &mut self.weather
    }

    /// Run one cycle.
    ///
    /// Returns `Err` only for cycle-fatal conditions; per-city failures are
    /// in the report.
    pub fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        if !self.api.has_credential() {
            tracing::error!(source = %DataSource::Pipeline, "API key is not configured; cycle aborted");
            return Err(CycleError::MissingCredential);
        }

        let mut report = CycleReport::default();
        let cities = self.resolve_cities(&mut report)?;
        tracing::info!(
            source = %DataSource::Pipeline,
            cities = cities.len(),
            "starting weather cycle"
        );

        let mut consecutive_client_errors = 0;
        for (i, city) in cities.iter().enumerate() {
            let limit = self.settings.client_error_limit;
            if limit > 0 && consecutive_client_errors >= limit {
                report.skipped = cities.len() - i;
                tracing::error!(
                    source = %DataSource::Pipeline,
                    skipped = report.skipped,
                    "{} consecutive client errors; skipping remaining cities until next cycle",
                    consecutive_client_errors
                );
                break;
            }

            report.attempted += 1;
            match self.process_city(city) {
                Ok(()) => {
                    report.persisted += 1;
                    consecutive_client_errors = 0;
                }
                Err(CityError { failure, client_error }) => {
                    if client_error {
                        consecutive_client_errors += 1;
                    } else {
                        consecutive_client_errors = 0;
                    }
                    report.failures.push(failure);
                }
            }
        }

        logging::log_cycle_summary(
            report.attempted,
            report.persisted,
            report.failed(),
            report.skipped,
        );
        Ok(report)
    }

    /// Top-N cities, seeding the store first if it is empty.
    fn resolve_cities(&mut self, report: &mut CycleReport) -> Result<Vec<City>, CycleError> {
        let n = self.settings.cities_count;
        let cities = self
            .cities
            .top_cities(n)
            .map_err(CycleError::StoreUnavailable)?;
        if !cities.is_empty() {
            return Ok(cities);
        }

        tracing::info!(source = %DataSource::Database, "city table is empty; seeding");
        report.seeded = self
            .cities
            .seed_if_empty(&self.reference, self.settings.chunk_size)
            .map_err(CycleError::StoreUnavailable)?;

        self.cities
            .top_cities(n)
            .map_err(CycleError::StoreUnavailable)
    }

    /// Fetch → validate → persist for one city.
    fn process_city(&mut self, city: &City) -> Result<(), CityError> {
        let raw = self.api.fetch(city.lat, city.lon).map_err(|err| {
            logging::log_city_failure(
                DataSource::OpenWeather,
                &city.name,
                Stage::Fetch,
                logging::classify_api_failure(&err),
                &err,
            );
            CityError {
                failure: failure(city, Stage::Fetch, err.kind(), &err),
                client_error: matches!(err, ApiError::Client { .. }),
            }
        })?;

        let reading = validate::parse(&raw).map_err(|err| {
            logging::log_city_failure(
                DataSource::OpenWeather,
                &city.name,
                Stage::Validate,
                logging::classify_validation_failure(&err),
                &err,
            );
            CityError::other(failure(city, Stage::Validate, "validation_error", &err))
        })?;

        self.weather.append(&reading, city).map_err(|err| {
            logging::log_city_failure(
                DataSource::Database,
                &city.name,
                Stage::Persist,
                logging::classify_store_failure(&err),
                &err,
            );
            CityError::other(failure(city, Stage::Persist, "persistence_error", &err))
        })?;

        tracing::debug!(
            source = %DataSource::Pipeline,
            city = %city.name,
            condition = %reading.condition(),
            "weather saved"
        );
        Ok(())
    }
}

/// A per-city failure plus whether it counts towards the client-error cut-off.
struct CityError {
    failure: CityFailure,
    client_error: bool,
}

impl CityError {
    fn other(failure: CityFailure) -> Self {
        Self {
            failure,
            client_error: false,
        }
    }
}

/// Time to wait before the next scheduled cycle. A cycle that overran its
/// interval is followed immediately by the next one.
pub fn next_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

fn failure(city: &City, stage: Stage, kind: &'static str, err: &dyn std::error::Error) -> CityFailure {
    CityFailure {
        city: city.name.clone(),
        stage,
        kind,
        message: err.to_string(),
    }
}

use std::error::Error;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use cityweather_service::cities::load_reference_cities;
use cityweather_service::config::Config;
use cityweather_service::db::{self, PgConnection, REQUIRED_TABLES};
use cityweather_service::ingest::http::ReqwestHttp;
use cityweather_service::ingest::openweather::{ApiClient, OpenWeatherClient};
use cityweather_service::logging::{self, DataSource};
use cityweather_service::pipeline::{self, CycleReport, CycleSettings, Pipeline};
use cityweather_service::store::memory::MemoryDatabase;
use cityweather_service::store::pg::{PgCityStore, PgWeatherStore};
use cityweather_service::store::{CityStore, WeatherStore};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(
    name = "cityweather",
    version,
    about = "Collect current weather for the most populous cities"
)]
pub struct Cli {
    /// TOML config file (default: ./cityweather.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive; overrides LOG_LEVEL.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one fetch cycle and exit.
    Cycle,

    /// Run fetch cycles forever on the configured interval.
    Watch,

    /// Create the schema if needed and seed the city table.
    Seed,

    /// List the tracked cities, most populous first.
    Top {
        /// Number of cities (default: the configured cities_count).
        #[arg(short = 'n', long)]
        n: Option<usize>,
    },

    /// Show stored observations for a city, most recent first.
    History {
        city: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

impl Cli {
    pub fn run(self) -> CliResult {
        let config = Config::load(self.config.as_deref())?;
        let level = self.log_level.as_deref().unwrap_or(&config.log_level);
        logging::init_logger(level, config.log_file.as_deref())?;

        tracing::info!(
            source = %DataSource::Pipeline,
            database = %config.redacted_database_url(),
            cities = config.cities_count,
            "cityweather starting"
        );

        if config.uses_memory_store() {
            tracing::warn!(
                source = %DataSource::Database,
                "using in-memory store; observations are lost on exit"
            );
            let db = MemoryDatabase::new();
            return execute(self.command, &config, db.city_store(), db.weather_store());
        }

        prepare_database(&self.command, &config.database_url)?;
        execute(
            self.command,
            &config,
            PgCityStore::new(PgConnection::new(config.database_url.clone())),
            PgWeatherStore::new(PgConnection::new(config.database_url.clone())),
        )
    }
}

/// `seed` creates the tables; every other command requires them to exist.
fn prepare_database(command: &Command, url: &str) -> CliResult {
    match command {
        Command::Seed => {
            let mut conn = PgConnection::connect(url)?;
            db::apply_schema(conn.client()?)?;
            tracing::info!(source = %DataSource::Database, "schema applied");
        }
        _ => {
            db::connect_and_verify(url, REQUIRED_TABLES)?;
        }
    }
    Ok(())
}

fn execute<C, W>(command: Command, config: &Config, mut cities: C, mut weather: W) -> CliResult
where
    C: CityStore,
    W: WeatherStore,
{
    match command {
        Command::Cycle => {
            let mut pipeline = build_pipeline(config, cities, weather)?;
            let report = pipeline.run_cycle()?;
            print_report(&report);
        }
        Command::Watch => {
            let mut pipeline = build_pipeline(config, cities, weather)?;
            watch(&mut pipeline, Duration::from_secs(config.interval_secs));
        }
        Command::Seed => {
            let reference = load_reference_cities()?;
            let inserted = cities.seed_if_empty(&reference, config.chunk_size)?;
            if inserted == 0 {
                println!("cities already seeded ({} rows)", cities.count()?);
            } else {
                println!("seeded {} cities", inserted);
            }
        }
        Command::Top { n } => {
            let top = cities.top_cities(n.unwrap_or(config.cities_count))?;
            if top.is_empty() {
                println!("no cities stored; run `cityweather seed`");
            }
            for (rank, city) in top.iter().enumerate() {
                println!("{:>3}. {}", rank + 1, city);
            }
        }
        Command::History { city, limit } => {
            let Some(found) = cities.find_by_name(&city)? else {
                return Err(format!("unknown city '{}'", city).into());
            };
            let observations = weather.history(&found)?;
            if observations.is_empty() {
                println!("no observations stored for {}", found.name);
            }
            for obs in observations.iter().take(limit) {
                println!(
                    "{}  {:<12} {:>7.2} K  {:>4} hPa  {:>3}%  wind {:>5.1} m/s @ {:>3.0}°  clouds {:>3}%",
                    obs.created_at.format("%Y-%m-%d %H:%M:%S"),
                    obs.condition,
                    obs.temperature,
                    obs.pressure,
                    obs.humidity,
                    obs.wind_speed,
                    obs.wind_direction,
                    obs.clouds,
                );
            }
        }
    }
    Ok(())
}

fn build_pipeline<C, W>(
    config: &Config,
    cities: C,
    weather: W,
) -> Result<Pipeline<OpenWeatherClient<ReqwestHttp>, C, W>, Box<dyn Error>>
where
    C: CityStore,
    W: WeatherStore,
{
    let http = ReqwestHttp::new(Duration::from_secs(config.request_timeout_secs))?;
    let api = OpenWeatherClient::new(http, config.api_url.clone(), config.api_key.clone());
    let reference = load_reference_cities()?;
    Ok(Pipeline::new(
        api,
        cities,
        weather,
        reference,
        CycleSettings::from(config),
    ))
}

/// Back-to-back cycles; a failed cycle is logged and the schedule continues.
fn watch<A, C, W>(pipeline: &mut Pipeline<A, C, W>, interval: Duration)
where
    A: ApiClient,
    C: CityStore,
    W: WeatherStore,
{
    loop {
        let started = Instant::now();
        if let Err(e) = pipeline.run_cycle() {
            tracing::error!(source = %DataSource::Pipeline, "{}", e);
        }
        let delay = pipeline::next_delay(interval, started.elapsed());
        tracing::info!(
            source = %DataSource::Pipeline,
            "next cycle in {}s",
            delay.as_secs()
        );
        thread::sleep(delay);
    }
}

fn print_report(report: &CycleReport) {
    if report.seeded > 0 {
        println!("seeded {} cities", report.seeded);
    }
    println!(
        "{}/{} persisted, {} failed, {} skipped",
        report.persisted,
        report.attempted,
        report.failed(),
        report.skipped
    );
    for failure in &report.failures {
        println!(
            "  {} [{}] {}: {}",
            failure.city, failure.stage, failure.kind, failure.message
        );
    }
}

/// Structured logging for the weather collector
///
/// Thin layer over `tracing`: installs the subscriber, tags events with the
/// data source and city, and decides the severity of per-city failures so
/// that systemic problems (bad API key) stand out from transient ones
/// (provider hiccups) in the daemon log.

use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::model::{ApiError, Stage, StoreError, ValidationError};

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    OpenWeather,
    Database,
    Pipeline,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::OpenWeather => write!(f, "OPENWEATHER"),
            DataSource::Database => write!(f, "DB"),
            DataSource::Pipeline => write!(f, "PIPELINE"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Upstream or network fault; expected to clear by the next cycle.
    Transient,
    /// Configuration problem that will repeat for every city (4xx, bad key).
    Systemic,
    /// This city's data was rejected (validation, constraint violation).
    Rejected,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Transient => write!(f, "TRANSIENT"),
            FailureType::Systemic => write!(f, "SYSTEMIC"),
            FailureType::Rejected => write!(f, "REJECTED"),
        }
    }
}

pub fn classify_api_failure(err: &ApiError) -> FailureType {
    match err {
        ApiError::MissingCredential | ApiError::Client { .. } => FailureType::Systemic,
        ApiError::InvalidCoordinates { .. } => FailureType::Rejected,
        ApiError::Server { .. }
        | ApiError::UnexpectedStatus { .. }
        | ApiError::InvalidResponse(_)
        | ApiError::Transport(_) => FailureType::Transient,
    }
}

pub fn classify_validation_failure(_err: &ValidationError) -> FailureType {
    FailureType::Rejected
}

pub fn classify_store_failure(err: &StoreError) -> FailureType {
    match err {
        StoreError::Unavailable(_) => FailureType::Transient,
        StoreError::Persistence(_) => FailureType::Rejected,
    }
}

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    OpenFile {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. With `log_file`, events are
/// appended to that file (no ANSI colours) instead of stderr.
pub fn init_logger(level: &str, log_file: Option<&Path>) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::OpenFile {
                    path: path.display().to_string(),
                    source,
                })?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|e| LoggingError::Install(e.to_string()))
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a per-city failure at a level chosen by its classification.
pub fn log_city_failure(
    source: DataSource,
    city: &str,
    stage: Stage,
    failure_type: FailureType,
    err: &dyn std::error::Error,
) {
    let source = source.to_string();
    match failure_type {
        FailureType::Transient => tracing::warn!(
            source = %source,
            city,
            stage = %stage,
            failure = %failure_type,
            "{} failed, will retry next cycle: {}",
            stage,
            err
        ),
        FailureType::Systemic => tracing::error!(
            source = %source,
            city,
            stage = %stage,
            failure = %failure_type,
            "{} failed, likely affects every city (check API key / request): {}",
            stage,
            err
        ),
        FailureType::Rejected => tracing::error!(
            source = %source,
            city,
            stage = %stage,
            failure = %failure_type,
            "{} failed: {}",
            stage,
            err
        ),
    }
}

// ---------------------------------------------------------------------------
// Cycle Summary Logging
// ---------------------------------------------------------------------------

/// Summary line for one cycle.
pub fn log_cycle_summary(attempted: usize, persisted: usize, failed: usize, skipped: usize) {
    let message = format!(
        "Cycle complete: {}/{} persisted, {} failed, {} skipped",
        persisted, attempted, failed, skipped
    );

    let level = summary_level(attempted, persisted);
    if level == tracing::Level::INFO {
        tracing::info!(source = %DataSource::Pipeline, "{}", message);
    } else if level == tracing::Level::WARN {
        tracing::warn!(source = %DataSource::Pipeline, "{}", message);
    } else {
        tracing::error!(source = %DataSource::Pipeline, "{}", message);
    }
}

fn summary_level(attempted: usize, persisted: usize) -> tracing::Level {
    if persisted == attempted {
        tracing::Level::INFO
    } else if persisted == 0 {
        tracing::Level::ERROR
    } else {
        tracing::Level::WARN
    }
}

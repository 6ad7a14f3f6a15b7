pub mod cities;
pub mod config;
pub mod db;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod validate;

/// PostgreSQL connection handling.
///
/// Each store owns a `PgConnection`: a lazily opened `postgres::Client` that
/// is re-opened when the server drops it, so a long-running daemon survives
/// database restarts between cycles. Schema setup lives here too.

use postgres::{Client, NoTls};
use thiserror::Error;

use crate::logging::DataSource;
use crate::model::StoreError;

const SCHEMA_SQL: &str = include_str!("../sql/001_cities_weather.sql");

/// Tables the service needs before it can run a cycle.
pub const REQUIRED_TABLES: &[&str] = &["cities", "weather"];

#[derive(Debug, Error)]
pub enum DbSetupError {
    #[error("cannot connect to database: {0}")]
    Connect(#[source] postgres::Error),
    #[error("failed to apply schema: {0}")]
    Schema(#[source] postgres::Error),
    #[error("missing tables: {}. Run `cityweather seed` or apply sql/001_cities_weather.sql", .0.join(", "))]
    MissingTables(Vec<String>),
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

pub struct PgConnection {
    url: String,
    client: Option<Client>,
}

impl PgConnection {
    /// Does not connect; the first `client()` call does.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: None,
        }
    }

    /// Connect eagerly, failing fast on a bad connection string.
    pub fn connect(url: impl Into<String>) -> Result<Self, StoreError> {
        let mut conn = Self::new(url);
        conn.client()?;
        Ok(conn)
    }

    /// The live client, (re)connecting if there is none or it was closed.
    pub fn client(&mut self) -> Result<&mut Client, StoreError> {
        let stale = self.client.as_ref().is_none_or(|c| c.is_closed());
        if stale {
            let client = Client::connect(&self.url, NoTls)
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            tracing::debug!(source = %DataSource::Database, "opened database connection");
            self.client = Some(client);
        }
        self.client
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("connection not established".to_string()))
    }
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("connected", &self.client.as_ref().is_some_and(|c| !c.is_closed()))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Create the `cities` and `weather` tables if they do not exist.
pub fn apply_schema(client: &mut Client) -> Result<(), DbSetupError> {
    client.batch_execute(SCHEMA_SQL).map_err(DbSetupError::Schema)
}

/// Return the subset of `tables` that does not exist in the `public` schema.
pub fn missing_tables(client: &mut Client, tables: &[&str]) -> Result<Vec<String>, postgres::Error> {
    let mut missing = Vec::new();
    for table in tables {
        let row = client.query_one(
            "SELECT EXISTS (
                 SELECT 1 FROM information_schema.tables
                 WHERE table_schema = 'public' AND table_name = $1
             )",
            &[table],
        )?;
        let exists: bool = row.get(0);
        if !exists {
            missing.push(table.to_string());
        }
    }
    Ok(missing)
}

/// Connect and check that every table in `tables` exists.
pub fn connect_and_verify(url: &str, tables: &[&str]) -> Result<Client, DbSetupError> {
    let mut client = Client::connect(url, NoTls).map_err(DbSetupError::Connect)?;
    let missing = missing_tables(&mut client, tables).map_err(DbSetupError::Connect)?;
    if !missing.is_empty() {
        return Err(DbSetupError::MissingTables(missing));
    }
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_defines_required_tables() {
        for table in REQUIRED_TABLES {
            assert!(
                SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
                "schema does not create '{}'",
                table
            );
        }
    }

    #[test]
    fn test_schema_condition_check_matches_enum() {
        for condition in crate::model::Condition::ALL {
            assert!(
                SCHEMA_SQL.contains(&format!("'{}'", condition.as_str())),
                "schema CHECK is missing condition '{}'",
                condition
            );
        }
    }

    #[test]
    fn test_new_connection_is_lazy() {
        // Unroutable URL: constructing must not attempt a connection.
        let conn = PgConnection::new("postgresql://nobody@127.0.0.1:1/none");
        assert!(format!("{:?}", conn).contains("connected: false"));
    }

    #[test]
    fn test_unreachable_database_is_unavailable() {
        let mut conn = PgConnection::new("postgresql://nobody@127.0.0.1:1/none");
        assert!(matches!(conn.client(), Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_missing_tables_error_lists_names() {
        let err = DbSetupError::MissingTables(vec!["cities".into(), "weather".into()]);
        assert!(err.to_string().contains("cities, weather"));
    }
}

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Database family a workload targets. Names in workload files are
/// case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Backend {
    Sql,
    Pgsql,
    MongoDb,
    CosmosDb,
    Cassandra,
}

impl Backend {
    /// File extension of the startup script for this backend.
    pub fn script_extension(&self) -> &'static str {
        match self {
            Backend::Cassandra => "cql",
            _ => "sql",
        }
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SQL" | "MSSQL" => Ok(Backend::Sql),
            "PGSQL" | "POSTGRES" | "POSTGRESQL" => Ok(Backend::Pgsql),
            "MONGODB" => Ok(Backend::MongoDb),
            "COSMOSDB" => Ok(Backend::CosmosDb),
            "CASSANDRA" => Ok(Backend::Cassandra),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

impl TryFrom<String> for Backend {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Backend> for String {
    fn from(value: Backend) -> Self {
        value.to_string()
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Backend::Sql => "SQL",
            Backend::Pgsql => "PGSQL",
            Backend::MongoDb => "MONGODB",
            Backend::CosmosDb => "COSMOSDB",
            Backend::Cassandra => "CASSANDRA",
        };
        f.write_str(s)
    }
}

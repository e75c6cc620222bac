//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported database families.
///
/// The dialect fully determines the connection-string shape, the default
/// port, identifier casing on read, and the probe query used by connection
/// self-tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Oracle database family.
    #[serde(alias = "Oracle")]
    Oracle,
    /// PostgreSQL database family.
    #[serde(alias = "postgresql", alias = "PostgreSQL")]
    Postgres,
}

impl Dialect {
    /// Default TCP port for this dialect.
    pub fn default_port(self) -> u16 {
        match self {
            Dialect::Oracle => 1521,
            Dialect::Postgres => 5432,
        }
    }

    /// Trivial probe query used for liveness checks and self-tests.
    pub fn probe_sql(self) -> &'static str {
        match self {
            Dialect::Oracle => "SELECT 1 FROM DUAL",
            Dialect::Postgres => "SELECT 1",
        }
    }

    /// Short identifier used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Oracle => "oracle",
            Dialect::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One database connection, fully described.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// Database family.
    pub dialect: Dialect,

    /// Database host.
    pub host: String,

    /// TCP port; dialect default when omitted.
    #[serde(default)]
    pub port: Option<u16>,

    /// Oracle service name or PostgreSQL database name.
    pub service_or_db: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Network protocol (default: "TCP").
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

impl ConnectionProfile {
    /// Port to connect to, falling back to the dialect default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.dialect.default_port())
    }
}

fn default_protocol() -> String {
    "TCP".to_string()
}

/// One source table and the destination table it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePair {
    /// Source table name.
    pub source: String,

    /// Destination table name; empty means "same as source".
    #[serde(default)]
    pub dest: String,
}

impl TablePair {
    /// Destination table name, defaulting to the source name.
    pub fn resolved_dest(&self) -> &str {
        if self.dest.trim().is_empty() {
            &self.source
        } else {
            &self.dest
        }
    }
}

/// Schema-qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A validated migration job.
#[derive(Debug, Clone)]
pub struct MigrationJob {
    /// Source connection profile.
    pub source: ConnectionProfile,

    /// Destination connection profile.
    pub dest: ConnectionProfile,

    /// Source schema.
    pub source_schema: String,

    /// Destination schema (defaults to the source schema).
    pub dest_schema: String,

    /// Ordered, non-empty list of table pairs.
    pub pairs: Vec<TablePair>,

    /// Raw filter predicate without a leading WHERE keyword; inserted
    /// verbatim. Trusted input by design, never sanitized.
    pub where_clause: Option<String>,

    /// Rows per chunk.
    pub chunk_size: usize,
}

/// Job descriptor as consumed from the presentation layer.
///
/// Table lists are comma-separated; destination entries align positionally
/// with source entries and default to the source name when missing or empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// Source schema.
    pub source_schema: String,

    /// Comma-separated source table list.
    pub source_tables: String,

    /// Destination schema (default: same as source schema).
    #[serde(default)]
    pub dest_schema: String,

    /// Comma-separated destination table list, aligned by position.
    #[serde(default)]
    pub dest_tables: String,

    /// Raw predicate text without a leading WHERE keyword.
    #[serde(default)]
    pub where_clause: String,

    /// Rows per chunk (default: 10000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

pub(crate) fn default_chunk_size() -> usize {
    10_000
}

/// Root configuration structure for the CLI front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database connection.
    pub source: ConnectionProfile,

    /// Destination database connection.
    pub dest: ConnectionProfile,

    /// The migration job to run.
    pub job: JobRequest,
}

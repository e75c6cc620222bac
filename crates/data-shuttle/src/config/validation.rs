//! Validation of connection profiles and job requests.

use crate::error::{Result, ShuttleError};

use super::types::{ConnectionProfile, JobRequest, MigrationJob, TablePair};

impl ConnectionProfile {
    /// Check that the profile carries every field required to connect.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ShuttleError::config("connection host must not be empty"));
        }
        if self.user.trim().is_empty() {
            return Err(ShuttleError::config("connection user must not be empty"));
        }
        if self.service_or_db.trim().is_empty() {
            return Err(ShuttleError::config(
                "connection service_or_db must not be empty",
            ));
        }
        Ok(())
    }
}

impl JobRequest {
    /// Validate the request and resolve it into a runnable job.
    ///
    /// Source tables are split on commas, trimmed, empty entries dropped.
    /// Destination tables align by position; missing or empty entries
    /// default to the source table at the same position.
    pub fn into_job(
        self,
        source: ConnectionProfile,
        dest: ConnectionProfile,
    ) -> Result<MigrationJob> {
        source.validate()?;
        dest.validate()?;

        let source_schema = self.source_schema.trim().to_string();
        if source_schema.is_empty() {
            return Err(ShuttleError::config("source_schema must not be empty"));
        }

        let source_tables: Vec<String> = self
            .source_tables
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if source_tables.is_empty() {
            return Err(ShuttleError::config(
                "source_tables must name at least one table",
            ));
        }

        // Destination entries keep their positions; an empty slot falls back
        // to the source table name at the same index.
        let dest_names: Vec<String> = if self.dest_tables.trim().is_empty() {
            Vec::new()
        } else {
            self.dest_tables
                .split(',')
                .map(|t| t.trim().to_string())
                .collect()
        };

        let pairs: Vec<TablePair> = source_tables
            .into_iter()
            .enumerate()
            .map(|(i, source)| {
                let dest = dest_names.get(i).cloned().unwrap_or_default();
                TablePair { source, dest }
            })
            .collect();

        if self.chunk_size == 0 {
            return Err(ShuttleError::config("chunk_size must be positive"));
        }

        let dest_schema = {
            let trimmed = self.dest_schema.trim();
            if trimmed.is_empty() {
                source_schema.clone()
            } else {
                trimmed.to_string()
            }
        };

        let where_clause = {
            let trimmed = self.where_clause.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        };

        Ok(MigrationJob {
            source,
            dest,
            source_schema,
            dest_schema,
            pairs,
            where_clause,
            chunk_size: self.chunk_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::{default_chunk_size, Dialect};
    use super::*;

    fn profile(dialect: Dialect) -> ConnectionProfile {
        ConnectionProfile {
            dialect,
            host: "127.0.0.1".into(),
            port: None,
            service_or_db: "db".into(),
            user: "u".into(),
            password: "p".into(),
            protocol: "TCP".into(),
        }
    }

    fn request(source_tables: &str, dest_tables: &str) -> JobRequest {
        JobRequest {
            source_schema: "APP".into(),
            source_tables: source_tables.into(),
            dest_schema: String::new(),
            dest_tables: dest_tables.into(),
            where_clause: String::new(),
            chunk_size: default_chunk_size(),
        }
    }

    #[test]
    fn test_pairs_default_to_source_names() {
        let job = request("ORDERS,ORDERS_HIST", "")
            .into_job(profile(Dialect::Oracle), profile(Dialect::Postgres))
            .unwrap();

        assert_eq!(job.pairs.len(), 2);
        assert_eq!(job.pairs[0].resolved_dest(), "ORDERS");
        assert_eq!(job.pairs[1].resolved_dest(), "ORDERS_HIST");
        assert_eq!(job.dest_schema, "APP");
        assert_eq!(job.chunk_size, 10_000);
    }

    #[test]
    fn test_short_dest_list_fills_from_source() {
        let job = request("A, B ,C", "X,")
            .into_job(profile(Dialect::Postgres), profile(Dialect::Postgres))
            .unwrap();

        let dests: Vec<&str> = job.pairs.iter().map(|p| p.resolved_dest()).collect();
        assert_eq!(dests, vec!["X", "B", "C"]);
    }

    #[test]
    fn test_empty_entries_dropped_from_source_list() {
        let job = request("A,,B, ,C", "")
            .into_job(profile(Dialect::Oracle), profile(Dialect::Oracle))
            .unwrap();
        let sources: Vec<&str> = job.pairs.iter().map(|p| p.source.as_str()).collect();
        assert_eq!(sources, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_empty_source_tables_rejected() {
        let err = request(" , ,", "")
            .into_job(profile(Dialect::Oracle), profile(Dialect::Postgres))
            .unwrap_err();
        assert!(matches!(err, ShuttleError::Config(_)));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut req = request("A", "");
        req.chunk_size = 0;
        let err = req
            .into_job(profile(Dialect::Oracle), profile(Dialect::Postgres))
            .unwrap_err();
        assert!(matches!(err, ShuttleError::Config(_)));
    }

    #[test]
    fn test_where_clause_trimmed_to_option() {
        let mut req = request("A", "");
        req.where_clause = "  status = 'OPEN'  ".into();
        let job = req
            .into_job(profile(Dialect::Oracle), profile(Dialect::Postgres))
            .unwrap();
        assert_eq!(job.where_clause.as_deref(), Some("status = 'OPEN'"));
    }

    #[test]
    fn test_profile_missing_host_rejected() {
        let mut p = profile(Dialect::Postgres);
        p.host = "  ".into();
        assert!(p.validate().is_err());
    }
}

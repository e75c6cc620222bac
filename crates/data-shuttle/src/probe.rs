//! Standalone connection self-test, independent of any job.

use std::time::Duration;

use tokio::task::spawn_blocking;
use tokio_postgres::NoTls;

use crate::config::{ConnectionProfile, Dialect};

/// Check that a profile can open a session and answer its dialect's probe
/// query within the deadline.
///
/// Never fails: the outcome is a flag plus a human-readable message, ready
/// for direct display.
pub async fn test_connection(profile: &ConnectionProfile, timeout: Duration) -> (bool, String) {
    let attempt = match profile.dialect {
        Dialect::Oracle => {
            tokio::time::timeout(timeout, probe_oracle(profile.clone())).await
        }
        Dialect::Postgres => {
            tokio::time::timeout(timeout, probe_postgres(profile.clone(), timeout)).await
        }
    };

    match attempt {
        Ok(Ok(())) => (
            true,
            format!(
                "{} connection to {}:{} succeeded",
                profile.dialect,
                profile.host,
                profile.effective_port()
            ),
        ),
        Ok(Err(message)) => (false, message),
        Err(_) => (
            false,
            format!(
                "{} connection to {}:{} timed out after {:?}",
                profile.dialect,
                profile.host,
                profile.effective_port(),
                timeout
            ),
        ),
    }
}

async fn probe_oracle(profile: ConnectionProfile) -> Result<(), String> {
    spawn_blocking(move || {
        let connect_string = format!(
            "//{}:{}/{}",
            profile.host,
            profile.effective_port(),
            profile.service_or_db
        );
        let conn = oracle::Connection::connect(&profile.user, &profile.password, connect_string)
            .map_err(|e| e.to_string())?;
        conn.query_row_as::<i64>(Dialect::Oracle.probe_sql(), &[])
            .map_err(|e| e.to_string())?;
        Ok(())
    })
    .await
    .map_err(|e| format!("probe task failed: {}", e))?
}

async fn probe_postgres(profile: ConnectionProfile, timeout: Duration) -> Result<(), String> {
    let mut config = tokio_postgres::Config::new();
    config
        .host(&profile.host)
        .port(profile.effective_port())
        .dbname(&profile.service_or_db)
        .user(&profile.user)
        .password(&profile.password)
        .connect_timeout(timeout);

    let (client, connection) = config
        .connect(NoTls)
        .await
        .map_err(|e| e.to_string())?;
    let driver = tokio::spawn(connection);

    let outcome = client
        .simple_query(Dialect::Postgres.probe_sql())
        .await
        .map(|_| ())
        .map_err(|e| e.to_string());

    drop(client);
    let _ = driver.await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_host_reports_failure() {
        let profile = ConnectionProfile {
            dialect: Dialect::Postgres,
            host: "127.0.0.1".into(),
            // Reserved port with nothing listening.
            port: Some(1),
            service_or_db: "db".into(),
            user: "u".into(),
            password: "p".into(),
            protocol: "TCP".into(),
        };
        let (ok, message) = test_connection(&profile, Duration::from_millis(500)).await;
        assert!(!ok);
        assert!(!message.is_empty());
    }
}

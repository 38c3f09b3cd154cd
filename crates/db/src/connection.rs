use std::time::Duration;

use procura_core::config::DatabaseConfig;
use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

/// Upper bound on how long SQLite waits for a locked database, in
/// milliseconds. Decision traffic is short bursts against a single WAL
/// writer, so anything longer just delays the inevitable error.
const MAX_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Builds the pool from the application's `[database]` section.
pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let acquire_timeout_secs = timeout_secs.max(1);
    // busy_timeout stays at or below the acquire timeout so a lock stall
    // surfaces as a query error instead of pool starvation.
    let busy_timeout_ms = MAX_BUSY_TIMEOUT_MS.min(acquire_timeout_secs * 1_000);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {busy_timeout_ms}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

#[cfg(test)]
mod tests {
    use procura_core::config::DatabaseConfig;

    use super::{connect_with_config, connect_with_settings};

    #[tokio::test]
    async fn config_driven_pool_enforces_foreign_keys() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 30,
        };
        let pool = connect_with_config(&config).await.expect("connect");

        let (enabled,): (i64,) =
            sqlx::query_as("PRAGMA foreign_keys").fetch_one(&pool).await.expect("pragma");
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn busy_timeout_is_capped_by_acquire_timeout() {
        let pool = connect_with_settings("sqlite::memory:", 1, 2).await.expect("connect");

        let (busy_timeout_ms,): (i64,) =
            sqlx::query_as("PRAGMA busy_timeout").fetch_one(&pool).await.expect("pragma");
        assert_eq!(busy_timeout_ms, 2_000, "2s acquire timeout should cap the busy timeout");
    }
}

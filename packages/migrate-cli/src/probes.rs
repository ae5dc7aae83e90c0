//! Readiness probes
//!
//! Two kinds: an HTTP liveness check against the dotCMS configuration
//! endpoint, and content checks that count rows in the primary content table.
//! The HTTP probe treats every failure, recognized or not, as "not ready yet"
//! and continues optimistically. The content probes only tolerate transport
//! failures and a still-missing table; anything else is a real database error
//! and propagates.

use sqlx::{Connection, MySqlConnection, PgConnection};

use crate::error::MigrateError;

/// Table whose row count proves business data made it across.
pub const CONTENT_TABLE: &str = "contentlet";

pub async fn app_is_healthy(client: &reqwest::Client, url: &str) -> Result<bool, MigrateError> {
    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => Ok(true),
        Ok(response) => {
            tracing::debug!(status = %response.status(), url, "app responded unhealthy");
            Ok(false)
        }
        Err(err) => {
            tracing::debug!(%err, url, "app unreachable, proceeding optimistically");
            Ok(false)
        }
    }
}

pub async fn mysql_has_content(url: &str) -> Result<bool, MigrateError> {
    let count = async {
        let mut conn = MySqlConnection::connect(url).await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {CONTENT_TABLE}"))
            .fetch_one(&mut conn)
            .await?;
        conn.close().await?;
        Ok::<i64, sqlx::Error>(count)
    }
    .await;
    settle_content_probe("mysql", count)
}

pub async fn pg_has_content(url: &str) -> Result<bool, MigrateError> {
    let count = async {
        let mut conn = PgConnection::connect(url).await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {CONTENT_TABLE}"))
            .fetch_one(&mut conn)
            .await?;
        conn.close().await?;
        Ok::<i64, sqlx::Error>(count)
    }
    .await;
    settle_content_probe("postgres", count)
}

fn settle_content_probe(server: &str, count: Result<i64, sqlx::Error>) -> Result<bool, MigrateError> {
    match count {
        Ok(rows) if rows > 0 => {
            tracing::info!(server, rows, "content table populated");
            Ok(true)
        }
        Ok(_) => {
            tracing::debug!(server, "content table still empty");
            Ok(false)
        }
        Err(err) if is_transient(&err) => {
            tracing::debug!(server, %err, "server not reachable yet");
            Ok(false)
        }
        Err(err) => Err(MigrateError::Database(err)),
    }
}

/// Transport-level failures, plus "the content table does not exist yet":
/// mid-import and mid-conversion the table is genuinely absent, which is the
/// same condition as a zero row count.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            // postgres undefined_table / mysql ER_NO_SUCH_TABLE
            matches!(db.code().as_deref(), Some("42P01") | Some("42S02"))
        }
        _ => false,
    }
}

//! Run-scoped configuration
//!
//! One `RunConfig` value is built at startup and passed explicitly into the
//! sequencer, poller and correction executors. Nothing reads ambient state.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use uuid::Uuid;

/// dotCMS image the application services run; the schema this tool produces
/// matches what this version's internal migrations expect.
pub const DOTCMS_IMAGE: &str = "dotcms/dotcms:21.06.11_lts_7e8134d";

/// Retry budget for one readiness check. The interval is fixed, no backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // Very large dumps need the attempt budget bumped via the CLI flags.
        Self {
            interval: Duration::from_secs(30),
            max_attempts: 200,
        }
    }
}

/// Configuration for a single migration run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Scratch directory holding the generated compose files and init SQL.
    pub workdir: PathBuf,
    pub db_user: String,
    pub db_password: String,
    pub db_name: String,
    /// Host ports the containers publish on 127.0.0.1.
    pub mysql_port: u16,
    pub pg_port: u16,
    pub app_port: u16,
    pub dotcms_image: String,
    pub pgloader_batch_rows: u32,
    /// Absolute path to the source mysqldump file (bind-mounted into mysql).
    pub mysqldump: PathBuf,
    /// Where the final pg_dump archive lands.
    pub output: PathBuf,
    pub retry: RetryPolicy,
    /// Pause after the database stack rises before the first import probe.
    pub settle_load: Duration,
    /// Longer pause after pgloader starts before the first conversion probe.
    pub settle_convert: Duration,
}

impl RunConfig {
    pub fn new(mysqldump: PathBuf, output: Option<PathBuf>, retry: RetryPolicy) -> Result<Self> {
        let workdir =
            std::env::temp_dir().join(format!("dotcms_migrate_{}", Uuid::new_v4().simple()));
        std::fs::create_dir_all(&workdir)
            .with_context(|| format!("failed to create workdir {}", workdir.display()))?;
        let output = output.unwrap_or_else(|| workdir.join("dotcms-21.06-postgres.sql.gz"));

        Ok(Self {
            workdir,
            db_user: "dbuser".to_string(),
            db_password: "dbpassword".to_string(),
            db_name: "dotcms".to_string(),
            mysql_port: 3306,
            pg_port: 5432,
            app_port: 8082,
            dotcms_image: DOTCMS_IMAGE.to_string(),
            pgloader_batch_rows: 100_000,
            mysqldump,
            output,
            retry,
            settle_load: Duration::from_secs(5),
            settle_convert: Duration::from_secs(10),
        })
    }

    pub fn compose_file(&self) -> PathBuf {
        self.workdir.join("docker-compose.yml")
    }

    pub fn mysql_init_file(&self) -> PathBuf {
        self.workdir.join("mysql_init.sql")
    }

    pub fn mysql_url(&self) -> String {
        format!(
            "mysql://{}:{}@127.0.0.1:{}/{}",
            self.db_user, self.db_password, self.mysql_port, self.db_name
        )
    }

    pub fn pg_url(&self) -> String {
        format!(
            "postgres://{}:{}@127.0.0.1:{}/{}",
            self.db_user, self.db_password, self.pg_port, self.db_name
        )
    }

    pub fn app_health_url(&self) -> String {
        format!("http://127.0.0.1:{}/api/v1/appconfiguration", self.app_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn conversion_settle_is_longer_than_import_settle() {
        let config = RunConfig::new(
            PathBuf::from("/data/dumps/dotcms.sql"),
            None,
            RetryPolicy::default(),
        )
        .unwrap();
        assert_eq!(config.settle_load, Duration::from_secs(5));
        assert_eq!(config.settle_convert, Duration::from_secs(10));
    }
}

//! Database and application effects behind a trait
//!
//! The sequencer only ever talks to a [`MigrationEnv`]. The live
//! implementation opens short-lived connections against the published
//! container ports; tests substitute a fake and drive the phase machine
//! without any containers.

use async_trait::async_trait;

use crate::config::RunConfig;
use crate::corrections::{apply_mysql, source_cleanup_catalog};
use crate::error::MigrateError;
use crate::{fixups, probes};

#[async_trait]
pub trait MigrationEnv {
    /// Did the source import finish? True once the content table has rows.
    async fn source_has_content(&self) -> Result<bool, MigrateError>;
    /// Did the conversion land rows in the target content table?
    async fn target_has_content(&self) -> Result<bool, MigrateError>;
    /// Is the application answering its configuration endpoint?
    async fn app_is_healthy(&self) -> Result<bool, MigrateError>;
    /// Apply the source-side cleanup catalog.
    async fn clean_source(&self) -> Result<(), MigrateError>;
    /// Apply the target-side fixup pass.
    async fn fix_target(&self) -> Result<(), MigrateError>;
}

pub struct LiveEnv {
    config: RunConfig,
    http: reqwest::Client,
}

impl LiveEnv {
    pub fn new(config: &RunConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            config: config.clone(),
            http,
        })
    }
}

#[async_trait]
impl MigrationEnv for LiveEnv {
    async fn source_has_content(&self) -> Result<bool, MigrateError> {
        probes::mysql_has_content(&self.config.mysql_url()).await
    }

    async fn target_has_content(&self) -> Result<bool, MigrateError> {
        probes::pg_has_content(&self.config.pg_url()).await
    }

    async fn app_is_healthy(&self) -> Result<bool, MigrateError> {
        probes::app_is_healthy(&self.http, &self.config.app_health_url()).await
    }

    async fn clean_source(&self) -> Result<(), MigrateError> {
        use sqlx::Connection;
        let mut conn = sqlx::MySqlConnection::connect(&self.config.mysql_url()).await?;
        apply_mysql(&mut conn, &source_cleanup_catalog()).await?;
        conn.close().await?;
        Ok(())
    }

    async fn fix_target(&self) -> Result<(), MigrateError> {
        use sqlx::Connection;
        let mut conn = sqlx::PgConnection::connect(&self.config.pg_url()).await?;
        // pgloader names the landing schema after the source database
        fixups::apply(&mut conn, &self.config.db_name, &self.config.db_name).await?;
        conn.close().await?;
        Ok(())
    }
}

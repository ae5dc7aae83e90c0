//! The migration phase machine
//!
//! Phases run strictly in order, each one leaving the compose stack in the
//! state the next phase expects. `run` guarantees best-effort teardown of the
//! stack whether the phases succeed or fail.

use std::fmt;
use std::path::PathBuf;

use anyhow::Context;
use console::style;

use crate::compose::{
    ComposeTemplate, CONTAINER_DUMP_GZ, CONTAINER_DUMP_SQL, SVC_APP_MYSQL, SVC_APP_POSTGRES,
    SVC_PGLOADER, SVC_POSTGRES,
};
use crate::config::RunConfig;
use crate::env::MigrationEnv;
use crate::error::MigrateError;
use crate::poll::{wait_until_ready, OnExhausted};
use crate::runtime::ContainerRuntime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Import the mysqldump into a fresh mysql container.
    LoadSource,
    /// Boot dotCMS against mysql so its own schema migrations run.
    MigrateSourceSchema,
    /// pgloader converts the cleaned source into postgres.
    ConvertSourceToTarget,
    /// Confirm content survived the conversion.
    VerifyTarget,
    /// Schema, constraint, sequence and scheduler corrections on the target.
    PostConvertFixups,
    /// Boot dotCMS against postgres to prove the result works.
    StartTargetApp,
    /// pg_dump, gzip and copy the archive out.
    ExtractDump,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::LoadSource => "1️⃣  importing mysqldump into mysql",
            Phase::MigrateSourceSchema => "2️⃣  running dotCMS schema migrations on mysql",
            Phase::ConvertSourceToTarget => "3️⃣  converting mysql to postgres with pgloader",
            Phase::PostConvertFixups => "🔧 applying postgres fixups",
            Phase::VerifyTarget => "🔎 verifying converted content",
            Phase::StartTargetApp => "4️⃣  booting dotCMS on postgres",
            Phase::ExtractDump => "5️⃣  extracting the final database dump",
        };
        f.write_str(label)
    }
}

pub struct Sequencer<'a, R: ContainerRuntime, E: MigrationEnv> {
    pub config: &'a RunConfig,
    pub runtime: &'a R,
    pub env: &'a E,
}

impl<'a, R: ContainerRuntime, E: MigrationEnv> Sequencer<'a, R, E> {
    pub fn new(config: &'a RunConfig, runtime: &'a R, env: &'a E) -> Self {
        Self {
            config,
            runtime,
            env,
        }
    }

    /// Drive every phase, then tear the stack down no matter what happened.
    pub async fn run(&self) -> Result<PathBuf, MigrateError> {
        let outcome = self.drive().await;
        if let Err(err) = self.runtime.down(&self.config.compose_file()) {
            tracing::warn!(%err, "teardown failed, containers may be left running");
        }
        outcome
    }

    async fn drive(&self) -> Result<PathBuf, MigrateError> {
        let template = ComposeTemplate::new(self.config);
        template.write_mysql_init()?;

        banner(Phase::LoadSource);
        let compose = template.write_databases()?;
        self.runtime.up(&compose)?;
        tokio::time::sleep(self.config.settle_load).await;
        wait_until_ready(
            "mysql import",
            self.config.retry,
            OnExhausted::Fail("source"),
            || self.env.source_has_content(),
        )
        .await?;

        banner(Phase::MigrateSourceSchema);
        let compose = template.write_app_on_mysql()?;
        self.runtime.up(&compose)?;
        wait_until_ready(
            "dotCMS on mysql",
            self.config.retry,
            OnExhausted::Degrade,
            || self.env.app_is_healthy(),
        )
        .await?;
        self.runtime.stop_service(&compose, SVC_APP_MYSQL)?;
        self.env.clean_source().await?;

        banner(Phase::ConvertSourceToTarget);
        let compose = template.write_pgloader()?;
        self.runtime.up(&compose)?;
        tokio::time::sleep(self.config.settle_convert).await;

        banner(Phase::VerifyTarget);
        let verified = wait_until_ready(
            "pgloader conversion",
            self.config.retry,
            OnExhausted::Fail("converted"),
            || self.env.target_has_content(),
        )
        .await;
        // The conversion log is the only diagnostic when pgloader dies, so
        // surface it before acting on the verification outcome.
        match self.runtime.logs(&compose, SVC_PGLOADER) {
            Ok(log) => println!("{log}"),
            Err(err) => tracing::warn!(%err, "could not capture pgloader logs"),
        }
        verified?;

        banner(Phase::PostConvertFixups);
        self.env.fix_target().await?;
        self.runtime.stop_service(&compose, SVC_PGLOADER)?;

        banner(Phase::StartTargetApp);
        let compose = template.write_app_on_postgres()?;
        self.runtime.up(&compose)?;
        wait_until_ready(
            "dotCMS on postgres",
            self.config.retry,
            OnExhausted::Degrade,
            || self.env.app_is_healthy(),
        )
        .await?;
        self.runtime.stop_service(&compose, SVC_APP_POSTGRES)?;

        banner(Phase::ExtractDump);
        self.extract_dump(&compose)?;

        Ok(self.config.output.clone())
    }

    fn extract_dump(&self, compose: &std::path::Path) -> Result<(), MigrateError> {
        self.runtime
            .exec(
                compose,
                SVC_POSTGRES,
                &[
                    "pg_dump",
                    "--no-owner",
                    "--clean",
                    "-h",
                    "localhost",
                    "-U",
                    &self.config.db_user,
                    &self.config.db_name,
                    "-f",
                    CONTAINER_DUMP_SQL,
                ],
            )
            .context("pg_dump failed")?;
        self.runtime
            .exec(compose, SVC_POSTGRES, &["gzip", "-f", CONTAINER_DUMP_SQL])
            .context("gzip failed")?;
        self.runtime
            .copy_from(compose, SVC_POSTGRES, CONTAINER_DUMP_GZ, &self.config.output)
            .context("copying dump out of the container failed")?;
        self.runtime
            .exec(compose, SVC_POSTGRES, &["rm", "-f", CONTAINER_DUMP_GZ])
            .context("removing the in-container dump failed")?;

        let size = std::fs::metadata(&self.config.output)
            .map(|m| m.len())
            .unwrap_or_default();
        println!(
            "6️⃣  {} ({} bytes)",
            style(self.config.output.display()).green().bold(),
            size
        );
        Ok(())
    }
}

fn banner(phase: Phase) {
    println!();
    println!("{}", style("────────────────────────────────────────").dim());
    println!("{}", style(phase).cyan().bold());
}

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use migrate_core::config::{RetryPolicy, RunConfig};
use migrate_core::env::LiveEnv;
use migrate_core::runtime::{ensure_docker, ensure_supported_arch, DockerComposeRuntime};
use migrate_core::sequencer::Sequencer;

#[derive(Parser)]
#[command(
    name = "dotcms-migrate",
    about = "Migrate a dotCMS MySQL database to PostgreSQL using disposable containers"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full migration against a mysqldump file
    Migrate {
        /// Absolute path to the source mysqldump (.sql) file
        mysqldump: PathBuf,
        /// Where to write the gzipped pg_dump archive
        #[arg(long)]
        output: Option<PathBuf>,
        /// Seconds between readiness probes
        #[arg(long, default_value_t = 30)]
        interval: u64,
        /// Retry budget for each readiness check
        #[arg(long, default_value_t = 200)]
        attempts: u32,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,migrate_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Migrate {
            mysqldump,
            output,
            interval,
            attempts,
        } => run_migrate(mysqldump, output, interval, attempts).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("❌").red());
            ExitCode::FAILURE
        }
    }
}

async fn run_migrate(
    mysqldump: PathBuf,
    output: Option<PathBuf>,
    interval: u64,
    attempts: u32,
) -> Result<()> {
    ensure_supported_arch()?;
    ensure_docker()?;
    if !mysqldump.is_absolute() {
        bail!(
            "mysqldump path must be absolute (it is bind-mounted into a container): {}",
            mysqldump.display()
        );
    }
    if !mysqldump.is_file() {
        bail!("mysqldump file not found: {}", mysqldump.display());
    }

    let retry = RetryPolicy {
        interval: Duration::from_secs(interval),
        max_attempts: attempts,
    };
    let config = RunConfig::new(mysqldump, output, retry)?;
    tracing::info!(workdir = %config.workdir.display(), "working directory created");

    let runtime = DockerComposeRuntime::new()?;
    let env = LiveEnv::new(&config)?;
    let output = Sequencer::new(&config, &runtime, &env)
        .run()
        .await
        .context("migration aborted")?;

    println!();
    println!(
        "✅ Done. Archive written to {}",
        style(output.display()).green().bold()
    );
    println!(
        "Compose files kept for reference under {}",
        style(config.workdir.display()).dim()
    );
    Ok(())
}

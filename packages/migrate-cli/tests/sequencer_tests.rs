//! Phase-machine behavior against fake containers and databases

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;

use migrate_core::config::{RetryPolicy, RunConfig};
use migrate_core::env::MigrationEnv;
use migrate_core::error::MigrateError;
use migrate_core::runtime::ContainerRuntime;
use migrate_core::sequencer::Sequencer;

#[derive(Default)]
struct FakeRuntime {
    events: Mutex<Vec<String>>,
}

impl FakeRuntime {
    fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ContainerRuntime for FakeRuntime {
    fn up(&self, _compose_file: &Path) -> Result<()> {
        self.record("up");
        Ok(())
    }

    fn stop_service(&self, _compose_file: &Path, service: &str) -> Result<()> {
        self.record(format!("stop:{service}"));
        Ok(())
    }

    fn down(&self, _compose_file: &Path) -> Result<()> {
        self.record("down");
        Ok(())
    }

    fn logs(&self, _compose_file: &Path, service: &str) -> Result<String> {
        self.record(format!("logs:{service}"));
        Ok("load completed".to_string())
    }

    fn exec(&self, _compose_file: &Path, _service: &str, command: &[&str]) -> Result<()> {
        self.record(format!("exec:{}", command[0]));
        Ok(())
    }

    fn copy_from(
        &self,
        _compose_file: &Path,
        service: &str,
        _container_path: &str,
        host_path: &Path,
    ) -> Result<()> {
        self.record(format!("cp:{service}"));
        let mut encoder = GzEncoder::new(std::fs::File::create(host_path)?, Compression::fast());
        encoder.write_all(b"-- converted dump")?;
        encoder.finish()?;
        Ok(())
    }
}

struct FakeEnv {
    source_ready: bool,
    cleaned: AtomicBool,
    fixed: AtomicBool,
}

impl FakeEnv {
    fn new(source_ready: bool) -> Self {
        Self {
            source_ready,
            cleaned: AtomicBool::new(false),
            fixed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MigrationEnv for FakeEnv {
    async fn source_has_content(&self) -> Result<bool, MigrateError> {
        Ok(self.source_ready)
    }

    async fn target_has_content(&self) -> Result<bool, MigrateError> {
        Ok(true)
    }

    async fn app_is_healthy(&self) -> Result<bool, MigrateError> {
        Ok(true)
    }

    async fn clean_source(&self) -> Result<(), MigrateError> {
        self.cleaned.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn fix_target(&self) -> Result<(), MigrateError> {
        self.fixed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn test_config() -> RunConfig {
    let retry = RetryPolicy {
        interval: Duration::ZERO,
        max_attempts: 2,
    };
    let mut config = RunConfig::new(PathBuf::from("/tmp/dotcms-dump.sql"), None, retry)
        .expect("workdir creation");
    config.settle_load = Duration::ZERO;
    config.settle_convert = Duration::ZERO;
    config
}

#[tokio::test]
async fn aborts_and_tears_down_when_the_import_never_lands() {
    let config = test_config();
    let runtime = FakeRuntime::default();
    let env = FakeEnv::new(false);

    let err = Sequencer::new(&config, &runtime, &env)
        .run()
        .await
        .expect_err("an empty source must abort the run");

    match err {
        MigrateError::DataNotPresent(what) => assert_eq!(what, "source"),
        other => panic!("expected DataNotPresent, got {other}"),
    }
    // nothing past the first stack, and the stack is still torn down
    assert_eq!(runtime.events(), vec!["up", "down"]);
    assert!(!env.cleaned.load(Ordering::SeqCst));
    assert!(!env.fixed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn happy_path_walks_every_phase_and_produces_a_gzip_archive() {
    let config = test_config();
    let runtime = FakeRuntime::default();
    let env = FakeEnv::new(true);

    let output = Sequencer::new(&config, &runtime, &env)
        .run()
        .await
        .expect("all phases succeed");
    assert_eq!(output, config.output);

    let events = runtime.events();
    assert_eq!(events.iter().filter(|e| *e == "up").count(), 4);
    assert!(events.contains(&"stop:dotcms_mysql".to_string()));
    assert!(events.contains(&"stop:pgloader".to_string()));
    assert!(events.contains(&"stop:dotcms_postgres".to_string()));
    assert!(events.contains(&"logs:pgloader".to_string()));
    assert!(events.contains(&"exec:pg_dump".to_string()));
    assert!(events.contains(&"exec:gzip".to_string()));
    assert!(events.contains(&"exec:rm".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("down"));

    assert!(env.cleaned.load(Ordering::SeqCst));
    assert!(env.fixed.load(Ordering::SeqCst));

    let archive = std::fs::read(&config.output).expect("archive written");
    assert_eq!(&archive[..2], &[0x1f, 0x8b], "gzip magic bytes");
}

#[tokio::test]
async fn cleanup_happens_on_mysql_before_the_conversion_stack_rises() {
    let config = test_config();
    let runtime = FakeRuntime::default();
    let env = FakeEnv::new(true);

    Sequencer::new(&config, &runtime, &env)
        .run()
        .await
        .expect("all phases succeed");

    let events = runtime.events();
    let mysql_app_stopped = events
        .iter()
        .position(|e| e == "stop:dotcms_mysql")
        .expect("mysql-backed app stopped");
    let pgloader_logs = events
        .iter()
        .position(|e| e == "logs:pgloader")
        .expect("pgloader ran");
    assert!(mysql_app_stopped < pgloader_logs);
    assert!(env.cleaned.load(Ordering::SeqCst));
}

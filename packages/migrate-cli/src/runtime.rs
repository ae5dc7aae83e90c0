//! Container runtime access
//!
//! A small capability trait over the handful of docker operations the
//! sequencer needs, with the live implementation shelling out through
//! [`CmdBuilder`]. Both the `docker compose` plugin and the standalone
//! `docker-compose` binary are supported.

use std::path::Path;

use anyhow::{bail, Result};
use which::which;

use crate::cmd_builder::CmdBuilder;

pub trait ContainerRuntime {
    /// Bring up every service in the compose file, detached.
    fn up(&self, compose_file: &Path) -> Result<()>;
    /// Stop one service, leaving the rest of the stack running.
    fn stop_service(&self, compose_file: &Path, service: &str) -> Result<()>;
    /// Tear down containers, networks and volumes.
    fn down(&self, compose_file: &Path) -> Result<()>;
    /// Captured log output for one service.
    fn logs(&self, compose_file: &Path, service: &str) -> Result<String>;
    /// Run a command inside a running service container.
    fn exec(&self, compose_file: &Path, service: &str, command: &[&str]) -> Result<()>;
    /// Copy a file out of a service container onto the host.
    fn copy_from(
        &self,
        compose_file: &Path,
        service: &str,
        container_path: &str,
        host_path: &Path,
    ) -> Result<()>;
}

pub struct DockerComposeRuntime {
    program: String,
    base_args: Vec<String>,
}

impl DockerComposeRuntime {
    pub fn new() -> Result<Self> {
        let (program, base_args) = docker_compose_program()?;
        Ok(Self { program, base_args })
    }

    fn compose(&self, compose_file: &Path) -> CmdBuilder {
        CmdBuilder::new(&self.program)
            .args(self.base_args.clone())
            .arg("-f")
            .arg(compose_file.display().to_string())
    }

    /// Named volumes are left in place so a failed run's half-migrated
    /// databases stay inspectable.
    fn down_cmd(&self, compose_file: &Path) -> CmdBuilder {
        self.compose(compose_file).arg("down")
    }

    fn run_checked(&self, builder: CmdBuilder, action: &str) -> Result<()> {
        let code = builder.inherit_io().run()?;
        if code != 0 {
            bail!("{action} exited with code {code}");
        }
        Ok(())
    }
}

impl ContainerRuntime for DockerComposeRuntime {
    fn up(&self, compose_file: &Path) -> Result<()> {
        self.run_checked(
            self.compose(compose_file).args(["up", "-d", "--build"]),
            "compose up",
        )
    }

    fn stop_service(&self, compose_file: &Path, service: &str) -> Result<()> {
        self.run_checked(
            self.compose(compose_file).arg("stop").arg(service),
            "compose stop",
        )
    }

    fn down(&self, compose_file: &Path) -> Result<()> {
        self.run_checked(self.down_cmd(compose_file), "compose down")
    }

    fn logs(&self, compose_file: &Path, service: &str) -> Result<String> {
        self.compose(compose_file)
            .args(["logs", "--no-color"])
            .arg(service)
            .merge_stderr()
            .run_capture()
    }

    fn exec(&self, compose_file: &Path, service: &str, command: &[&str]) -> Result<()> {
        self.run_checked(
            self.compose(compose_file)
                .args(["exec", "-T"])
                .arg(service)
                .args(command.iter().copied()),
            "compose exec",
        )
    }

    fn copy_from(
        &self,
        compose_file: &Path,
        service: &str,
        container_path: &str,
        host_path: &Path,
    ) -> Result<()> {
        self.run_checked(
            self.compose(compose_file)
                .arg("cp")
                .arg(format!("{service}:{container_path}"))
                .arg(host_path.display().to_string()),
            "compose cp",
        )
    }
}

/// Prefer the `docker compose` plugin, fall back to standalone
/// `docker-compose`.
pub fn docker_compose_program() -> Result<(String, Vec<String>)> {
    if which("docker").is_ok() {
        return Ok(("docker".to_string(), vec!["compose".to_string()]));
    }
    if which("docker-compose").is_ok() {
        return Ok(("docker-compose".to_string(), vec![]));
    }
    bail!("neither `docker` nor `docker-compose` found on PATH")
}

pub fn ensure_docker() -> Result<()> {
    docker_compose_program().map(|_| ())
}

/// The pgloader image is published for amd64 only, so refuse to start
/// anywhere else rather than fail an hour in.
pub fn ensure_supported_arch() -> Result<()> {
    let arch = std::env::consts::ARCH;
    if arch != "x86_64" {
        bail!("unsupported architecture {arch}: the conversion stage requires x86_64");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_does_not_destroy_named_volumes() {
        let runtime = DockerComposeRuntime {
            program: "docker".to_string(),
            base_args: vec!["compose".to_string()],
        };
        let rendered = runtime
            .down_cmd(Path::new("/tmp/docker-compose.yml"))
            .rendered();
        assert_eq!(rendered, "docker compose -f /tmp/docker-compose.yml down");
        assert!(!rendered.contains("-v"));
    }
}

//! Fluent wrapper over `std::process::Command` for shelling out to docker

use anyhow::{anyhow, Context, Result};
use std::process::{Command, Stdio};

pub struct CmdBuilder {
    program: String,
    args: Vec<String>,
    inherit_io: bool,
    merge_stderr: bool,
}

impl CmdBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            inherit_io: false,
            merge_stderr: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Stream the child's stdio straight to the terminal.
    pub fn inherit_io(mut self) -> Self {
        self.inherit_io = true;
        self
    }

    /// Append captured stderr to the captured stdout (container log output
    /// is split across both streams).
    pub fn merge_stderr(mut self) -> Self {
        self.merge_stderr = true;
        self
    }

    /// The full command line, for logging and error messages.
    pub fn rendered(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Run to completion and return the exit code.
    pub fn run(&self) -> Result<i32> {
        let mut cmd = self.build_command();
        if self.inherit_io {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        }
        let status = cmd.status().with_context(|| {
            format!("failed to start: {} {}", self.program, self.args.join(" "))
        })?;
        Ok(status.code().unwrap_or(1))
    }

    /// Run to completion capturing output; non-zero exit is an error.
    pub fn run_capture(&self) -> Result<String> {
        let mut cmd = self.build_command();
        // Null stdin so a misbehaving child cannot hang on a prompt.
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = cmd
            .spawn()
            .with_context(|| format!("failed to start: {} {}", self.program, self.args.join(" ")))?
            .wait_with_output()
            .with_context(|| {
                format!(
                    "failed to wait for: {} {}",
                    self.program,
                    self.args.join(" ")
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{} exited with code {:?}: {}",
                self.program,
                output.status.code(),
                stderr.trim()
            ));
        }

        let mut stdout = output.stdout;
        if self.merge_stderr {
            stdout.extend_from_slice(&output.stderr);
        }
        Ok(String::from_utf8_lossy(&stdout).to_string())
    }
}

//! Execution of the external barman tool.
//!
//! The exporter only ever issues two command shapes:
//! `sudo --user=<user> barman list-server --minimal` and
//! `sudo --user=<user> barman check <server>`. Both go through the
//! [`CommandRunner`] trait so the poller can be driven by scripted fakes.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::Config;

pub const LIST_SERVERS_ARGS: [&str; 2] = ["list-server", "--minimal"];
pub const CHECK_ARG: &str = "check";

/// Errors raised before the external command produced an exit status.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to execute {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }

    /// Human readable exit description for log lines.
    pub fn exit_description(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs barman with the given arguments.
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    async fn run(&self, args: &[&str]) -> Result<CommandOutput, RunnerError>;
}

/// Runs barman through the privilege-elevation wrapper as the barman user.
#[derive(Debug, Clone)]
pub struct SudoRunner {
    sudo_path: PathBuf,
    barman_path: PathBuf,
    user: String,
}

impl SudoRunner {
    pub fn new(sudo_path: PathBuf, barman_path: PathBuf, user: String) -> Self {
        Self {
            sudo_path,
            barman_path,
            user,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.sudo_binary_path(),
            config.barman_binary_path(),
            config.barman_user_name(),
        )
    }

    fn user_arg(&self) -> String {
        format!("--user={}", self.user)
    }

    /// Full command line as it would be typed in a shell, for logging.
    pub fn command_line(&self, args: &[&str]) -> String {
        let mut line = format!(
            "{} {} {}",
            self.sudo_path.display(),
            self.user_arg(),
            self.barman_path.display()
        );
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[async_trait]
impl CommandRunner for SudoRunner {
    #[instrument(skip(self))]
    async fn run(&self, args: &[&str]) -> Result<CommandOutput, RunnerError> {
        debug!("execute: {}", self.command_line(args));

        let output = Command::new(&self.sudo_path)
            .arg(self.user_arg())
            .arg(&self.barman_path)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RunnerError::Spawn {
                command: self.command_line(args),
                source,
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

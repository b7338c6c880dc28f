//! AWS CLI runner

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use gfr_core::control::ControlError;
use gfr_core::notify::NotifyError;

/// How to invoke the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsCliConfig {
    /// Path to the `aws` binary
    pub cli_path: PathBuf,

    /// Region passed with `--region`; the CLI's own resolution applies when unset
    pub region: Option<String>,

    /// Kill the command after this long
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
}

impl Default for AwsCliConfig {
    fn default() -> Self {
        Self {
            cli_path: PathBuf::from("aws"),
            region: None,
            command_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to run {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("aws {command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("aws {command} exited with {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl From<CliError> for ControlError {
    fn from(err: CliError) -> Self {
        match err {
            CliError::Timeout { timeout, .. } => ControlError::Timeout(timeout),
            other => ControlError::Command(other.to_string()),
        }
    }
}

impl From<CliError> for NotifyError {
    fn from(err: CliError) -> Self {
        NotifyError::Command(err.to_string())
    }
}

/// Runs `aws` subcommands and returns their stdout
#[derive(Debug, Clone)]
pub struct AwsCli {
    config: AwsCliConfig,
}

impl AwsCli {
    pub fn new(config: AwsCliConfig) -> Self {
        Self { config }
    }

    /// Full argument list for a subcommand
    pub fn command_args<S: AsRef<str>>(&self, args: &[S]) -> Vec<String> {
        let mut full: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();
        if let Some(region) = &self.config.region {
            full.push("--region".to_string());
            full.push(region.clone());
        }
        full
    }

    pub async fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<String, CliError> {
        let args = self.command_args(args);
        let command = args.iter().take(2).cloned().collect::<Vec<_>>().join(" ");
        let timeout = self.config.command_timeout;

        debug!(command = %command, "Running aws CLI");

        let result = tokio::time::timeout(
            timeout,
            tokio::process::Command::new(&self.config.cli_path)
                .args(&args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(CliError::Spawn {
                    path: self.config.cli_path.display().to_string(),
                    source,
                })
            }
            Err(_) => return Err(CliError::Timeout { command, timeout }),
        };

        if !output.status.success() {
            return Err(CliError::Failed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        trace!(command = %command, bytes = stdout.len(), "aws CLI finished");
        Ok(stdout)
    }
}

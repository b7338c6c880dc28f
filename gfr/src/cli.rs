//! CLI argument parsing for GFR

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

/// GPU Fault Remediator - detects faulty GPU nodes and remediates them
#[derive(Debug, Parser)]
#[command(name = "gfr")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/gfr/config.yaml", env = "GFR_CONFIG")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error) [env: GFR_LOG_LEVEL, LOG_LEVEL]
    #[arg(long, env = "GFR_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Output logs in JSON format
    #[arg(long, default_value = "false", env = "GFR_LOG_JSON")]
    pub log_json: bool,

    /// Dry run mode - log node and instance actions but don't execute
    #[arg(long, default_value = "false", global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll GPU nodes and remediate faulty ones
    Run(RunArgs),

    /// Cordon, drain, reboot and return a node to service
    Reboot(ActionArgs),

    /// Cordon, drain and replace a node's instance through its Auto Scaling group
    Replace(ActionArgs),

    /// Inspect and manage the exclusion ledger
    Exclusions {
        #[command(subcommand)]
        command: ExclusionCommand,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Run a single poll cycle, wait for its remediations and exit
    #[arg(long)]
    pub once: bool,

    /// Poll interval in seconds (overrides config)
    #[arg(long, env = "MONITOR_INTERVAL")]
    pub interval: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ActionArgs {
    /// Node name
    #[arg(long)]
    pub node: String,

    /// EC2 instance ID backing the node
    #[arg(long)]
    pub instance_id: String,

    /// Seconds to wait after the action is acknowledged (overrides config)
    #[arg(long)]
    pub wait: Option<u64>,

    /// Exclusion reason recorded while the node is remediated
    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ExclusionCommand {
    /// List live exclusions
    List,

    /// Remove expired exclusions
    Sweep,

    /// Exclude a node so no remediation touches it
    Pause {
        #[arg(long)]
        node: String,

        #[arg(long)]
        instance_id: Option<String>,

        #[arg(long, default_value = "MANUAL_PAUSE")]
        reason: String,

        /// Expire the exclusion after this long (e.g. 2h); never expires when unset
        #[arg(long, value_parser = humantime::parse_duration)]
        ttl: Option<Duration>,
    },

    /// Remove a node's exclusion
    Resume {
        #[arg(long)]
        node: String,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level from the flag, then `LOG_LEVEL`, then `info`
    pub fn log_level(&self) -> String {
        self.log_level
            .clone()
            .or_else(|| std::env::var("LOG_LEVEL").ok())
            .unwrap_or_else(|| "info".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["gfr", "run"]).unwrap();
        assert_eq!(cli.config.to_str().unwrap(), "/etc/gfr/config.yaml");
        assert!(!cli.log_json);
        assert!(!cli.dry_run);
        match cli.command {
            Command::Run(args) => assert!(!args.once),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_custom_config() {
        let cli = Cli::try_parse_from(["gfr", "-c", "/custom/config.yaml", "run", "--once"]).unwrap();
        assert_eq!(cli.config.to_str().unwrap(), "/custom/config.yaml");
        assert!(matches!(cli.command, Command::Run(RunArgs { once: true, .. })));
    }

    #[test]
    fn test_cli_reboot() {
        let cli = Cli::try_parse_from([
            "gfr",
            "reboot",
            "--node",
            "gpu-03",
            "--instance-id",
            "i-0abc",
            "--wait",
            "120",
            "--dry-run",
        ])
        .unwrap();

        assert!(cli.dry_run);
        match cli.command {
            Command::Reboot(args) => {
                assert_eq!(args.node, "gpu-03");
                assert_eq!(args.instance_id, "i-0abc");
                assert_eq!(args.wait, Some(120));
                assert!(args.reason.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_replace_requires_instance() {
        assert!(Cli::try_parse_from(["gfr", "replace", "--node", "gpu-11"]).is_err());
    }

    #[test]
    fn test_cli_pause() {
        let cli = Cli::try_parse_from([
            "gfr",
            "exclusions",
            "pause",
            "--node",
            "gpu-05",
            "--ttl",
            "2h",
        ])
        .unwrap();

        match cli.command {
            Command::Exclusions {
                command: ExclusionCommand::Pause { node, reason, ttl, instance_id },
            } => {
                assert_eq!(node, "gpu-05");
                assert_eq!(reason, "MANUAL_PAUSE");
                assert_eq!(ttl, Some(Duration::from_secs(7200)));
                assert!(instance_id.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}

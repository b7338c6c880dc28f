//! EC2 instance actions
//!
//! Reboot is an in-place EC2 reboot. Replace terminates the instance through
//! its Auto Scaling group without lowering desired capacity, so the group
//! launches a fresh one.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::cli::AwsCli;
use gfr_core::control::{ControlError, InstanceActions};

/// Instance actions backed by the AWS CLI
pub struct AwsInstanceActions {
    cli: Arc<AwsCli>,
    dry_run: bool,
}

impl AwsInstanceActions {
    pub fn new(cli: Arc<AwsCli>, dry_run: bool) -> Self {
        Self { cli, dry_run }
    }
}

pub(crate) fn reboot_args(instance_id: &str) -> Vec<&str> {
    vec!["ec2", "reboot-instances", "--instance-ids", instance_id]
}

pub(crate) fn replace_args(instance_id: &str) -> Vec<&str> {
    vec![
        "autoscaling",
        "terminate-instance-in-auto-scaling-group",
        "--instance-id",
        instance_id,
        "--no-should-decrement-desired-capacity",
    ]
}

pub(crate) fn describe_args(instance_id: &str) -> Vec<&str> {
    vec![
        "ec2",
        "describe-instances",
        "--instance-ids",
        instance_id,
        "--query",
        "Reservations[0].Instances[0].State.Name",
        "--output",
        "text",
    ]
}

/// Instance state from `describe-instances` text output
fn parse_state(instance_id: &str, output: &str) -> Result<String, ControlError> {
    match output.trim() {
        "" | "None" => Err(ControlError::NotFound(format!("instance {}", instance_id))),
        state => Ok(state.to_string()),
    }
}

#[async_trait]
impl InstanceActions for AwsInstanceActions {
    async fn reboot(&self, instance_id: &str) -> Result<(), ControlError> {
        if self.dry_run {
            info!(instance = instance_id, "[DRY-RUN] Would reboot instance");
            return Ok(());
        }

        self.cli.run(&reboot_args(instance_id)).await?;
        info!(instance = instance_id, "Instance reboot requested");
        Ok(())
    }

    async fn replace(&self, instance_id: &str) -> Result<(), ControlError> {
        if self.dry_run {
            info!(instance = instance_id, "[DRY-RUN] Would terminate instance for replacement");
            return Ok(());
        }

        self.cli.run(&replace_args(instance_id)).await?;
        info!(instance = instance_id, "Instance replacement requested");
        Ok(())
    }

    async fn read_state(&self, instance_id: &str) -> Result<String, ControlError> {
        let output = self.cli.run(&describe_args(instance_id)).await?;
        parse_state(instance_id, &output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::AwsCliConfig;
    use std::path::PathBuf;

    fn actions(cli_path: &str, dry_run: bool) -> AwsInstanceActions {
        let cli = AwsCli::new(AwsCliConfig {
            cli_path: PathBuf::from(cli_path),
            ..Default::default()
        });
        AwsInstanceActions::new(Arc::new(cli), dry_run)
    }

    #[test]
    fn test_action_args() {
        assert_eq!(
            reboot_args("i-0abc").join(" "),
            "ec2 reboot-instances --instance-ids i-0abc"
        );
        assert_eq!(
            replace_args("i-0abc").join(" "),
            "autoscaling terminate-instance-in-auto-scaling-group --instance-id i-0abc \
             --no-should-decrement-desired-capacity"
        );
    }

    #[test]
    fn test_parse_state() {
        assert_eq!(parse_state("i-01", "running\n").unwrap(), "running");
        assert!(matches!(parse_state("i-01", "None\n"), Err(ControlError::NotFound(_))));
        assert!(matches!(parse_state("i-01", ""), Err(ControlError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_dry_run_never_invokes_cli() {
        let dry = actions("/nonexistent/aws", true);
        dry.reboot("i-0abc").await.unwrap();
        dry.replace("i-0abc").await.unwrap();
    }

    #[tokio::test]
    async fn test_cli_failure_surfaces() {
        let failing = actions("false", false);
        assert!(matches!(failing.reboot("i-0abc").await, Err(ControlError::Command(_))));
        assert!(matches!(failing.replace("i-0abc").await, Err(ControlError::Command(_))));
        assert!(failing.read_state("i-0abc").await.is_err());
    }
}

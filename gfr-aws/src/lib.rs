//! GFR AWS Integration
//!
//! Instance reboot and replacement through EC2 and Auto Scaling, plus SNS
//! and Lambda notification channels. Everything goes through the `aws` CLI.

pub mod cli;
pub mod instance;
pub mod notify;

pub use cli::{AwsCli, AwsCliConfig, CliError};
pub use instance::AwsInstanceActions;
pub use notify::{LambdaNotifier, SnsNotifier};

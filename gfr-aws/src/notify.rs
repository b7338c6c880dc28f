//! SNS and Lambda notification channels

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::cli::AwsCli;
use gfr_core::fault::{FaultCategory, Severity};
use gfr_core::notify::{EventKind, NotificationEvent, Notifier, NotifyError};

/// SNS rejects subjects longer than this
const SNS_SUBJECT_LIMIT: usize = 100;

/// Publishes events to an SNS topic
pub struct SnsNotifier {
    cli: Arc<AwsCli>,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(cli: Arc<AwsCli>, topic_arn: impl Into<String>) -> Self {
        Self {
            cli,
            topic_arn: topic_arn.into(),
        }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    fn name(&self) -> &str {
        "sns"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let subject = sns_subject(event);
        let message = sns_message(event);
        let args = [
            "sns",
            "publish",
            "--topic-arn",
            self.topic_arn.as_str(),
            "--subject",
            subject.as_str(),
            "--message",
            message.as_str(),
        ];

        let output = self.cli.run(&args).await?;
        debug!(topic = %self.topic_arn, response = %output.trim(), "SNS message published");
        Ok(())
    }
}

/// Invokes a Lambda function with the event as JSON payload
pub struct LambdaNotifier {
    cli: Arc<AwsCli>,
    function_name: String,
}

impl LambdaNotifier {
    pub fn new(cli: Arc<AwsCli>, function_name: impl Into<String>) -> Self {
        Self {
            cli,
            function_name: function_name.into(),
        }
    }

    fn invoke_args(&self, payload: &str) -> Vec<String> {
        [
            "lambda",
            "invoke",
            "--function-name",
            &self.function_name,
            "--invocation-type",
            "RequestResponse",
            "--cli-binary-format",
            "raw-in-base64-out",
            "--payload",
            payload,
            "/dev/null",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[async_trait]
impl Notifier for LambdaNotifier {
    fn name(&self) -> &str {
        "lambda"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_string(event).map_err(|e| NotifyError::Command(e.to_string()))?;

        let output = self.cli.run(&self.invoke_args(&payload)).await?;
        if output.contains("FunctionError") {
            return Err(NotifyError::Command(format!(
                "{} reported an error: {}",
                self.function_name,
                output.trim()
            )));
        }

        debug!(function = %self.function_name, "Lambda invoked");
        Ok(())
    }
}

fn sns_subject(event: &NotificationEvent) -> String {
    let subject = event.subject();
    if subject.len() <= SNS_SUBJECT_LIMIT {
        return subject;
    }

    let mut end = SNS_SUBJECT_LIMIT - 3;
    while !subject.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &subject[..end])
}

/// Held and unrecognized nodes wait on a human, so they page as critical
fn urgency(event: &NotificationEvent) -> &'static str {
    if event.kind == EventKind::ManualReview {
        return "CRITICAL";
    }
    match event.severity {
        Severity::Critical | Severity::Unknown => "CRITICAL",
        Severity::Warning => "WARNING",
        Severity::Healthy => "INFO",
    }
}

/// Suggested operator follow-up for a fault tag
fn recommendations(error_type: &str) -> &'static [&'static str] {
    match FaultCategory::parse(error_type) {
        FaultCategory::EccError => &[
            "Keep the node out of service until memory is inspected",
            "Open a hardware ticket for GPU memory diagnostics",
            "Replace the instance if errors recur",
        ],
        FaultCategory::XidCritical(79) => &[
            "GPU fell off the bus; check driver and PCIe state",
            "Verify CUDA and driver compatibility",
            "Reboot the instance",
        ],
        FaultCategory::XidCritical(74) => &[
            "Check NVLink status between GPUs",
            "Review application memory usage",
            "Watch for follow-up errors",
        ],
        FaultCategory::XidCritical(_) | FaultCategory::XidError => &[
            "Check GPU hardware state",
            "Reboot or replace the instance",
            "Contact hardware support if the fault repeats",
        ],
        FaultCategory::GpuHealthError => &[
            "Check GPU temperature and power draw",
            "Verify the cooling system",
            "Reduce workload on the node",
        ],
        FaultCategory::GpuHealthWarning | FaultCategory::XidWarning(_) => &[
            "Keep monitoring the GPU",
            "Review system logs",
            "Plan a maintenance window",
        ],
        _ => &[
            "Review system logs for more detail",
            "Watch for a recurring error pattern",
            "Escalate to support if needed",
        ],
    }
}

fn sns_message(event: &NotificationEvent) -> String {
    let mut lines = vec![
        format!("GPU alert [{}]", urgency(event)),
        String::new(),
        format!("Event:    {}", event.kind),
        format!("Time:     {}", event.timestamp.to_rfc3339()),
        format!("Cluster:  {}", event.cluster_name.as_deref().unwrap_or("unknown")),
        format!("Node:     {}", event.node_name),
        format!("Instance: {}", event.instance_id),
        format!("Error:    {}", event.error_type),
        format!("Details:  {}", event.error_details),
    ];
    if let Some(step) = &event.step {
        lines.push(format!("Step:     {}", step));
    }

    lines.push(String::new());
    lines.push("Recommended actions:".to_string());
    for action in recommendations(&event.error_type) {
        lines.push(format!("- {}", action));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::AwsCliConfig;
    use gfr_core::fault::{FaultRecord, Node};
    use std::path::PathBuf;

    fn event() -> NotificationEvent {
        let record = FaultRecord::new(
            Node::new("gpu-03", "i-0abc"),
            FaultCategory::parse("XID_CRITICAL_79"),
            "xid 79 on gpu 2".to_string(),
        )
        .with_error_count(3)
        .with_gpu(Some(2));
        NotificationEvent::fault_detected(&record)
    }

    fn cli(path: &str) -> Arc<AwsCli> {
        Arc::new(AwsCli::new(AwsCliConfig {
            cli_path: PathBuf::from(path),
            ..Default::default()
        }))
    }

    #[test]
    fn test_sns_message() {
        let mut event = event();
        event.cluster_name = Some("training-east".to_string());

        let message = sns_message(&event);
        assert!(message.starts_with("GPU alert [CRITICAL]"));
        assert!(message.contains("Cluster:  training-east"));
        assert!(message.contains("Error:    XID_CRITICAL_79"));
        assert!(message.contains("Details:  3 error(s) on GPU 2"));
        assert!(message.contains("- Reboot the instance"));
        assert!(!message.contains("Step:"));

        let failed = NotificationEvent::new(
            EventKind::RemediationFailed,
            Severity::Critical,
            &Node::new("gpu-02", "i-02"),
            "ECC_ERROR",
            "cordon failed",
        )
        .with_step("cordon");
        let message = sns_message(&failed);
        assert!(message.contains("Cluster:  unknown"));
        assert!(message.contains("Step:     cordon"));
        assert!(message.contains("hardware ticket"));
    }

    #[test]
    fn test_urgency() {
        let gpu = Node::new("gpu-09", "i-09");
        let alert = |kind, severity| NotificationEvent::new(kind, severity, &gpu, "X", "");

        assert_eq!(urgency(&alert(EventKind::ManualReview, Severity::Unknown)), "CRITICAL");
        assert_eq!(urgency(&alert(EventKind::ManualReview, Severity::Warning)), "CRITICAL");
        assert_eq!(urgency(&alert(EventKind::FaultDetected, Severity::Unknown)), "CRITICAL");
        assert_eq!(urgency(&alert(EventKind::FaultDetected, Severity::Warning)), "WARNING");
        assert_eq!(urgency(&alert(EventKind::RemediationSucceeded, Severity::Healthy)), "INFO");

        let held = NotificationEvent::new(
            EventKind::ManualReview,
            Severity::Unknown,
            &gpu,
            "MANUAL_REVIEW_NVLINK_DEGRADED",
            "Unrecognized fault category",
        );
        assert!(sns_message(&held).starts_with("GPU alert [CRITICAL]"));
    }

    #[test]
    fn test_subject_truncated() {
        let long = NotificationEvent::new(
            EventKind::ManualReview,
            Severity::Unknown,
            &Node::new("x".repeat(120), "i-01"),
            "MANUAL_REVIEW_SOMETHING",
            "",
        );
        let subject = sns_subject(&long);
        assert_eq!(subject.len(), SNS_SUBJECT_LIMIT);
        assert!(subject.ends_with("..."));

        assert_eq!(sns_subject(&event()), event().subject());
    }

    #[test]
    fn test_lambda_payload_is_event_json() {
        let notifier = LambdaNotifier::new(cli("aws"), "gpu-error-handler");
        let payload = serde_json::to_string(&event()).unwrap();
        let args = notifier.invoke_args(&payload);

        assert_eq!(args[..4], ["lambda", "invoke", "--function-name", "gpu-error-handler"]);
        let at = args.iter().position(|a| a == "--payload").unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&args[at + 1]).unwrap();
        assert_eq!(parsed["error_type"], "XID_CRITICAL_79");
        assert_eq!(parsed["instance_id"], "i-0abc");
    }

    #[tokio::test]
    async fn test_channels_report_cli_failure() {
        let sns = SnsNotifier::new(cli("false"), "arn:aws:sns:us-east-1:123456789012:gpu-alerts");
        assert!(matches!(sns.notify(&event()).await, Err(NotifyError::Command(_))));

        let ok = SnsNotifier::new(cli("echo"), "arn:aws:sns:us-east-1:123456789012:gpu-alerts");
        ok.notify(&event()).await.unwrap();

        let lambda = LambdaNotifier::new(cli("false"), "gpu-error-handler");
        assert!(lambda.notify(&event()).await.is_err());
    }
}

//! Fault classifier capability
//!
//! Classification is an external oracle: raw diagnostic text goes in, a
//! category tag comes out. A failed call is never read as HEALTHY or as a
//! fault; the node is skipped for the cycle.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::fault::{FaultCategory, Node};

/// Classifier verdict for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "error_class")]
    pub category: FaultCategory,
    /// Errors on the worst GPU
    #[serde(rename = "error_count", default)]
    pub error_count: u32,
    #[serde(rename = "error_gpu_id", default)]
    pub gpu_id: Option<u32>,
}

impl Classification {
    pub fn new(category: FaultCategory) -> Self {
        Self {
            category,
            error_count: 0,
            gpu_id: None,
        }
    }

    pub fn healthy() -> Self {
        Self::new(FaultCategory::Healthy)
    }
}

/// Errors from the classifier
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Service unreachable, timed out, or returned an error status
    #[error("Classifier unavailable: {0}")]
    Unavailable(String),

    /// Service answered but the verdict could not be read
    #[error("Classifier returned malformed output: {0}")]
    Malformed(String),
}

/// Turns raw diagnostic text into a fault category
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, node: &Node, evidence: &str)
        -> Result<Classification, ClassifierError>;
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    node_name: &'a str,
    instance_id: &'a str,
    metrics: &'a str,
}

/// Classifier backed by an HTTP service
///
/// POSTs `{node_name, instance_id, metrics}` and expects
/// `{"error_class": ..., "error_count": ..., "error_gpu_id": ...}`,
/// optionally wrapped in `<error_class>` tags.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(
        &self,
        node: &Node,
        evidence: &str,
    ) -> Result<Classification, ClassifierError> {
        let request = ClassifyRequest {
            node_name: &node.name,
            instance_id: &node.instance_id,
            metrics: evidence,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClassifierError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Unavailable(format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClassifierError::Unavailable(e.to_string()))?;
        debug!(node = %node.name, body = %body, "Classifier response");

        parse_verdict(&body)
    }
}

/// Parse a classifier verdict, tolerating `<error_class>` wrapping
pub fn parse_verdict(body: &str) -> Result<Classification, ClassifierError> {
    let trimmed = body
        .trim()
        .trim_start_matches("<error_class>")
        .trim_end_matches("</error_class>")
        .trim();

    serde_json::from_str(trimmed).map_err(|e| ClassifierError::Malformed(format!("{}: {}", e, trimmed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_verdict() {
        let verdict =
            parse_verdict(r#"{"error_class": "XID_CRITICAL_79", "error_count": 2, "error_gpu_id": 3}"#)
                .unwrap();
        assert_eq!(verdict.category, FaultCategory::XidCritical(79));
        assert_eq!(verdict.error_count, 2);
        assert_eq!(verdict.gpu_id, Some(3));
    }

    #[test]
    fn test_parse_tagged_verdict() {
        let verdict = parse_verdict("<error_class>{\"error_class\": \"HEALTHY\", \"error_count\": 0}</error_class>\n")
            .unwrap();
        assert_eq!(verdict.category, FaultCategory::Healthy);
        assert_eq!(verdict.gpu_id, None);
    }

    #[test]
    fn test_unknown_class_is_not_healthy() {
        let verdict = parse_verdict(r#"{"error_class": "THERMAL_RUNAWAY"}"#).unwrap();
        assert_eq!(
            verdict.category,
            FaultCategory::Unknown("THERMAL_RUNAWAY".to_string())
        );
    }

    #[test]
    fn test_malformed_verdict() {
        assert!(matches!(
            parse_verdict("I think the node is fine"),
            Err(ClassifierError::Malformed(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"error_count": 1}"#),
            Err(ClassifierError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let classifier =
            HttpClassifier::new("http://127.0.0.1:9/classify", Duration::from_millis(500)).unwrap();
        let result = classifier
            .classify(&Node::new("gpu-01", "i-01"), "=== NODE_INFO ===")
            .await;
        assert!(matches!(result, Err(ClassifierError::Unavailable(_))));
    }
}

//! Seam to the external reasoning collaborator.
//!
//! The engine never decides what a fix should say; it sends an error record's
//! context out through [`Reasoner`] and gets back an explanation plus an
//! optional replacement. The wire protocol beyond this request/response
//! contract is somebody else's problem.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Context handed to the collaborator for one finding.
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningRequest {
    pub error_type: Option<String>,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surrounding_context: Option<String>,
}

/// A candidate replacement for a contiguous run of source lines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestedFix {
    #[serde(default)]
    pub original_lines: Vec<String>,
    #[serde(default)]
    pub replacement_lines: Vec<String>,
}

/// Collaborator answer: always an explanation, sometimes a fix.
///
/// Records without source context still get an explanation-only response;
/// `suggested_fix` only shows up when the collaborator saw code to rewrite.
#[derive(Debug, Clone, Deserialize)]
pub struct ReasoningResponse {
    pub explanation: String,
    #[serde(default)]
    pub suggested_fix: Option<SuggestedFix>,
}

#[derive(Debug, Error)]
pub enum ReasoningError {
    /// The collaborator did not answer within the configured budget. This is
    /// retryable and must never abort classification or fix anchoring.
    #[error("reasoning service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("reasoning service request failed: {0}")]
    Transport(String),

    #[error("reasoning service returned an unusable response: {0}")]
    Protocol(String),
}

impl ReasoningError {
    /// Whether the caller may usefully try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReasoningError::Timeout(_))
    }
}

/// The narrow contract the engine consumes. Safe to call zero times.
pub trait Reasoner: Send + Sync {
    fn consult(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, ReasoningError>;
}

/// HTTP client for a remote reasoning endpoint.
///
/// Every call is bounded by the configured timeout; an elapsed budget
/// surfaces as [`ReasoningError::Timeout`] so the run keeps going with the
/// explanation marked unavailable.
pub struct HttpReasoner {
    client: reqwest::blocking::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpReasoner {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ReasoningError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }
}

impl Reasoner for HttpReasoner {
    fn consult(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, ReasoningError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ReasoningError::Timeout(self.timeout)
                } else {
                    ReasoningError::Transport(e.to_string())
                }
            })?;

        let response = response
            .error_for_status()
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;

        response
            .json::<ReasoningResponse>()
            .map_err(|e| ReasoningError::Protocol(e.to_string()))
    }
}

/// Reasoner that answers nothing. Used when no endpoint is configured, so
/// explanation-dependent paths degrade instead of blocking the run.
pub struct NullReasoner;

impl Reasoner for NullReasoner {
    fn consult(&self, _request: &ReasoningRequest) -> Result<ReasoningResponse, ReasoningError> {
        Err(ReasoningError::Transport(
            "no reasoning endpoint configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_without_fix_deserializes() {
        let response: ReasoningResponse =
            serde_json::from_str(r#"{"explanation": "the key is missing"}"#).unwrap();
        assert_eq!(response.explanation, "the key is missing");
        assert!(response.suggested_fix.is_none());
    }

    #[test]
    fn test_response_with_fix_deserializes() {
        let raw = r#"{
            "explanation": "guard the lookup",
            "suggested_fix": {
                "original_lines": ["    x = d['k']"],
                "replacement_lines": ["    x = d.get('k')"]
            }
        }"#;
        let response: ReasoningResponse = serde_json::from_str(raw).unwrap();
        let fix = response.suggested_fix.unwrap();
        assert_eq!(fix.original_lines.len(), 1);
        assert_eq!(fix.replacement_lines[0], "    x = d.get('k')");
    }

    #[test]
    fn test_request_omits_absent_context() {
        let request = ReasoningRequest {
            error_type: Some("KeyError".into()),
            error_message: "'k'".into(),
            related_code: None,
            surrounding_context: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("related_code"));
        assert!(!json.contains("surrounding_context"));
    }

    #[test]
    fn test_timeout_is_retryable() {
        assert!(ReasoningError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(!ReasoningError::Transport("boom".into()).is_retryable());
    }
}

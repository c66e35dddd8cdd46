use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::usage::UsageSnapshot;

/// Failure classes for a single page navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorKind {
    DnsError,
    ConnectionRefused,
    Timeout,
    SslError,
    Unknown,
}

impl NetworkErrorKind {
    /// Classify a navigation error by the text of the underlying error
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();

        if ["name_not_resolved", "getaddrinfo", "enotfound", "dns"]
            .iter()
            .any(|needle| message.contains(needle))
        {
            Self::DnsError
        } else if ["connection_refused", "econnrefused", "connection refused"]
            .iter()
            .any(|needle| message.contains(needle))
        {
            Self::ConnectionRefused
        } else if ["timeout", "timed out", "timed_out"]
            .iter()
            .any(|needle| message.contains(needle))
        {
            Self::Timeout
        } else if ["ssl", "cert", "tls"]
            .iter()
            .any(|needle| message.contains(needle))
        {
            Self::SslError
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DnsError => "dns_error",
            Self::ConnectionRefused => "connection_refused",
            Self::Timeout => "timeout",
            Self::SslError => "ssl_error",
            Self::Unknown => "unknown",
        }
    }

    /// Short message suitable for showing to the report owner
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::DnsError => "Domain not found or DNS resolution failed",
            Self::ConnectionRefused => "Connection refused by the server",
            Self::Timeout => "Page took too long to load",
            Self::SslError => "SSL/TLS certificate error",
            Self::Unknown => "Failed to load page",
        }
    }
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when no recovery strategy can turn an analysis reply into JSON
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("analysis response was empty")]
    Empty,

    #[error("analysis response could not be parsed after {attempts} strategies")]
    Exhausted { attempts: usize },

    #[error("analysis response is nested more than {depth} levels deep")]
    RecursionLimit { depth: usize },
}

/// Reasons the external analysis step did not produce keywords.
/// Never surfaced to callers; every variant routes to the local fallback.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no valid content to analyze")]
    NoValidContent,

    #[error("analysis service is disabled")]
    Disabled,

    #[error("analysis request failed: {0}")]
    Transport(String),

    #[error("analysis service returned HTTP {code}")]
    Status { code: u16 },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("analysis response contained no keywords")]
    NoKeywords,
}

/// Errors that end a crawl request
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid seed URL: {0}")]
    Validation(String),

    #[error("usage limit reached ({} of {} crawls used)", .usage.used, .usage.limit)]
    LimitExceeded { usage: UsageSnapshot },

    #[error("no pages could be crawled")]
    ZeroPages { report_id: String },

    #[error("crawl failed: {source}")]
    Unhandled {
        report_id: Option<String>,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn unhandled(report_id: Option<String>, source: anyhow::Error) -> Self {
        Self::Unhandled { report_id, source }
    }

    pub fn report_id(&self) -> Option<&str> {
        match self {
            Self::ZeroPages { report_id } => Some(report_id),
            Self::Unhandled { report_id, .. } => report_id.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_navigation_errors() {
        assert_eq!(
            NetworkErrorKind::classify("unknown error: net::ERR_NAME_NOT_RESOLVED"),
            NetworkErrorKind::DnsError
        );
        assert_eq!(
            NetworkErrorKind::classify("net::ERR_CONNECTION_REFUSED at https://localhost"),
            NetworkErrorKind::ConnectionRefused
        );
        assert_eq!(
            NetworkErrorKind::classify("timeout: Timed out receiving message from renderer"),
            NetworkErrorKind::Timeout
        );
        assert_eq!(
            NetworkErrorKind::classify("net::ERR_CERT_AUTHORITY_INVALID"),
            NetworkErrorKind::SslError
        );
        assert_eq!(
            NetworkErrorKind::classify("something exploded"),
            NetworkErrorKind::Unknown
        );
    }

    #[test]
    fn test_error_kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&NetworkErrorKind::ConnectionRefused).unwrap();
        assert_eq!(json, "\"connection_refused\"");
        assert_eq!(NetworkErrorKind::SslError.as_str(), "ssl_error");
    }

    #[test]
    fn test_pipeline_error_report_id() {
        let err = PipelineError::ZeroPages { report_id: "r-1".to_string() };
        assert_eq!(err.report_id(), Some("r-1"));

        let err = PipelineError::Validation("nope".to_string());
        assert_eq!(err.report_id(), None);
    }
}

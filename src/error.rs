//! Error types for duoroute
//!
//! Three layers:
//! - [`BackendError`]: what a single backend call can fail with
//! - [`RoutingError`]: the terminal failure of one routed invocation
//! - [`AppError`]: everything the application surface can report

use crate::models::locality::KNOWN_LOCALITIES;
use crate::router::RoutingDecision;
use thiserror::Error;

/// Typed failure of a single backend call
///
/// Every variant carries the label of the endpoint that produced it so a
/// terminal error can always be traced back to the backend that failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Rate or capacity limit hit; the only kind that triggers a fallback hop
    #[error("{endpoint} throttled the request ({code}): {message}")]
    Throttled {
        endpoint: String,
        code: String,
        message: String,
    },

    #[error("{endpoint} rejected the caller's credentials ({code}): {message}")]
    Unauthorized {
        endpoint: String,
        code: String,
        message: String,
    },

    #[error("{endpoint} rejected the request as misconfigured ({code}): {message}")]
    InvalidEndpoint {
        endpoint: String,
        code: String,
        message: String,
    },

    /// Transport failure, server-side fault, or deadline expiry
    #[error("{endpoint} is unavailable: {reason}")]
    Unavailable { endpoint: String, reason: String },

    /// Response body violated the wire contract
    #[error("Malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },
}

/// Field-less mirror of [`BackendError`] for metrics labels and assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    Throttled,
    Unauthorized,
    InvalidEndpoint,
    Unavailable,
    Malformed,
}

impl BackendErrorKind {
    /// Label used in logs and Prometheus metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Throttled => "throttled",
            Self::Unauthorized => "unauthorized",
            Self::InvalidEndpoint => "invalid_endpoint",
            Self::Unavailable => "unavailable",
            Self::Malformed => "malformed",
        }
    }
}

impl BackendError {
    /// Classify this error
    pub fn kind(&self) -> BackendErrorKind {
        match self {
            Self::Throttled { .. } => BackendErrorKind::Throttled,
            Self::Unauthorized { .. } => BackendErrorKind::Unauthorized,
            Self::InvalidEndpoint { .. } => BackendErrorKind::InvalidEndpoint,
            Self::Unavailable { .. } => BackendErrorKind::Unavailable,
            Self::Malformed { .. } => BackendErrorKind::Malformed,
        }
    }

    /// Whether switching to the secondary endpoint can resolve this error
    ///
    /// Only capacity conditions qualify. Credentials, endpoint configuration,
    /// transport faults and contract violations are not fixed by trying a
    /// different endpoint, so they propagate as-is.
    pub fn is_fallback_eligible(&self) -> bool {
        match self.kind() {
            BackendErrorKind::Throttled => true,
            BackendErrorKind::Unauthorized
            | BackendErrorKind::InvalidEndpoint
            | BackendErrorKind::Unavailable
            | BackendErrorKind::Malformed => false,
        }
    }

    /// Label of the endpoint that produced this error
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Throttled { endpoint, .. }
            | Self::Unauthorized { endpoint, .. }
            | Self::InvalidEndpoint { endpoint, .. }
            | Self::Unavailable { endpoint, .. }
            | Self::Malformed { endpoint, .. } => endpoint,
        }
    }
}

/// Terminal failure of a routed invocation
///
/// Pairs the backend error that ended the invocation with the routing
/// decision, so callers can tell a primary failure from a failed fallback.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Routing failed on {} endpoint (fell back: {}): {source}", .decision.final_role, .decision.fell_back)]
pub struct RoutingError {
    pub decision: RoutingDecision,
    pub source: BackendError,
}

impl RoutingError {
    pub fn new(decision: RoutingDecision, source: BackendError) -> Self {
        Self { decision, source }
    }

    /// Kind of the backend error that ended the invocation
    pub fn kind(&self) -> BackendErrorKind {
        self.source.kind()
    }
}

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Unknown locality '{locality}'. Known localities: {}", KNOWN_LOCALITIES.join(", "))]
    InvalidLocality { locality: String },

    #[error("Invalid request: prompt must not be empty")]
    EmptyPrompt,

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn throttled() -> BackendError {
        BackendError::Throttled {
            endpoint: "primary@us-east-1".to_string(),
            code: "ThrottlingException".to_string(),
            message: "Rate exceeded".to_string(),
        }
    }

    #[test]
    fn test_only_throttled_is_fallback_eligible() {
        assert!(throttled().is_fallback_eligible());

        let others = [
            BackendError::Unauthorized {
                endpoint: "e".to_string(),
                code: "AccessDeniedException".to_string(),
                message: "denied".to_string(),
            },
            BackendError::InvalidEndpoint {
                endpoint: "e".to_string(),
                code: "ResourceNotFoundException".to_string(),
                message: "no such model".to_string(),
            },
            BackendError::Unavailable {
                endpoint: "e".to_string(),
                reason: "connection refused".to_string(),
            },
            BackendError::Malformed {
                endpoint: "e".to_string(),
                reason: "missing field `completion`".to_string(),
            },
        ];
        for error in others {
            assert!(
                !error.is_fallback_eligible(),
                "{:?} must not trigger a fallback",
                error.kind()
            );
        }
    }

    #[test]
    fn test_backend_error_display_includes_endpoint_and_code() {
        let msg = throttled().to_string();
        assert_eq!(
            msg,
            "primary@us-east-1 throttled the request (ThrottlingException): Rate exceeded"
        );
    }

    #[test]
    fn test_backend_error_endpoint_accessor() {
        assert_eq!(throttled().endpoint(), "primary@us-east-1");
    }

    #[test]
    fn test_kind_labels_are_distinct() {
        let labels = [
            BackendErrorKind::Throttled.as_str(),
            BackendErrorKind::Unauthorized.as_str(),
            BackendErrorKind::InvalidEndpoint.as_str(),
            BackendErrorKind::Unavailable.as_str(),
            BackendErrorKind::Malformed.as_str(),
        ];
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }

    #[test]
    fn test_routing_error_display_mentions_decision() {
        let err = RoutingError::new(RoutingDecision::fallback(), throttled());
        let msg = err.to_string();
        assert!(msg.contains("secondary"), "got: {msg}");
        assert!(msg.contains("fell back: true"), "got: {msg}");
        assert_eq!(err.kind(), BackendErrorKind::Throttled);
        assert_eq!(err.decision.final_role, Role::Secondary);
    }

    #[test]
    fn test_invalid_locality_lists_known_codes() {
        let err = AppError::InvalidLocality {
            locality: "us-east-1x".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Unknown locality 'us-east-1x'"));
        assert!(msg.contains("us-west-2"));
    }

    #[test]
    fn test_empty_prompt_error_message() {
        assert_eq!(
            AppError::EmptyPrompt.to_string(),
            "Invalid request: prompt must not be empty"
        );
    }

    #[test]
    fn test_routing_error_converts_transparently() {
        let routing = RoutingError::new(RoutingDecision::direct(), throttled());
        let expected = routing.to_string();
        let app: AppError = routing.into();
        assert_eq!(app.to_string(), expected);
    }
}

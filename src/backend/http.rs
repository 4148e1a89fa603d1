//! HTTP backend speaking the invoke-model text-completion protocol
//!
//! Request: `POST {base_url}/model/{model}/invoke` with the serialized
//! [`InferenceRequest`] as JSON body.
//!
//! Response: `{"completion": "...", "stop_reason": "..."}` on 2xx. Errors
//! carry a machine-readable code in the `x-amzn-ErrorType` header or in the
//! body's `__type` field; [`classify_code`] maps that code (or the bare HTTP
//! status when no code is present) onto [`BackendErrorKind`].

use crate::backend::Backend;
use crate::error::{AppError, AppResult, BackendError, BackendErrorKind};
use crate::models::{Endpoint, InferenceRequest};
use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::time::Duration;

/// Header carrying the service error code
pub const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

/// Upper bound on how much of an unparseable body is echoed into errors
const BODY_PREVIEW_CHARS: usize = 200;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Successful completion body
#[derive(Debug, Deserialize)]
struct CompletionBody {
    completion: String,
    #[serde(default)]
    stop_reason: Option<String>,
}

/// Error body; every field is optional because services are inconsistent
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type")]
    error_type: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

/// Build the invoke URL for a model on a base URL
///
/// The model reference is pushed as a single path segment, so `/` inside
/// a provisioned-throughput ARN is percent-encoded instead of splitting
/// the path.
///
/// # Errors
/// Returns `AppError::Config` if `base_url` is not an absolute http(s) URL.
pub fn invoke_url(base_url: &str, model: &str) -> AppResult<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| AppError::Config(format!("invalid base_url '{}': {}", base_url, e)))?;

    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            AppError::Config(format!("base_url '{}' cannot carry a path", base_url))
        })?;
        segments.pop_if_empty().extend(["model", model, "invoke"]);
    }

    Ok(url)
}

/// Map a service error code (or HTTP status) onto an error kind
///
/// Known codes take precedence over the status. Unknown codes fall back
/// to the status: 429 is throttling, 401/403 are credential problems, 5xx
/// is unavailability and every other status is an endpoint problem.
pub fn classify_code(code: &str, status: u16) -> BackendErrorKind {
    match code {
        "ThrottlingException"
        | "TooManyRequestsException"
        | "ServiceQuotaExceededException"
        | "ModelNotReadyException" => BackendErrorKind::Throttled,
        "AccessDeniedException"
        | "UnrecognizedClientException"
        | "ExpiredTokenException"
        | "InvalidSignatureException" => BackendErrorKind::Unauthorized,
        "ResourceNotFoundException" | "ValidationException" => BackendErrorKind::InvalidEndpoint,
        "ServiceUnavailableException" | "InternalServerException" | "ModelTimeoutException" => {
            BackendErrorKind::Unavailable
        }
        _ => match status {
            429 => BackendErrorKind::Throttled,
            401 | 403 => BackendErrorKind::Unauthorized,
            500..=599 => BackendErrorKind::Unavailable,
            _ => BackendErrorKind::InvalidEndpoint,
        },
    }
}

/// Strip decorations from an error code
///
/// `ThrottlingException:http://internal.amazon.com/coral/...` and
/// `com.amazon.coral.service#ThrottlingException` both become
/// `ThrottlingException`.
fn normalize_code(raw: &str) -> &str {
    let code = raw.split(':').next().unwrap_or(raw);
    code.rsplit('#').next().unwrap_or(code).trim()
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

/// Turn a non-2xx response into a typed error
pub(crate) fn error_from_response(
    endpoint: &str,
    status: u16,
    header_code: Option<&str>,
    body: &str,
) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

    let code = header_code
        .map(normalize_code)
        .filter(|c| !c.is_empty())
        .or_else(|| parsed.error_type.as_deref().map(normalize_code))
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status));

    let message = parsed.message.unwrap_or_else(|| {
        if body.is_empty() {
            format!("HTTP status {}", status)
        } else {
            preview(body)
        }
    });

    let endpoint = endpoint.to_string();
    match classify_code(&code, status) {
        BackendErrorKind::Throttled => BackendError::Throttled {
            endpoint,
            code,
            message,
        },
        BackendErrorKind::Unauthorized => BackendError::Unauthorized {
            endpoint,
            code,
            message,
        },
        BackendErrorKind::InvalidEndpoint => BackendError::InvalidEndpoint {
            endpoint,
            code,
            message,
        },
        BackendErrorKind::Unavailable => BackendError::Unavailable {
            endpoint,
            reason: format!("{} (HTTP {}): {}", code, status, message),
        },
        // classify_code never produces Malformed
        BackendErrorKind::Malformed => BackendError::Malformed {
            endpoint,
            reason: message,
        },
    }
}

/// Parse a 2xx body into completion text
pub(crate) fn completion_from_body(endpoint: &str, body: &str) -> Result<String, BackendError> {
    let parsed: CompletionBody =
        serde_json::from_str(body).map_err(|e| BackendError::Malformed {
            endpoint: endpoint.to_string(),
            reason: format!("{} (body: {:?})", e, preview(body)),
        })?;

    tracing::debug!(
        endpoint = %endpoint,
        stop_reason = parsed.stop_reason.as_deref().unwrap_or("none"),
        completion_length = parsed.completion.len(),
        "Parsed completion body"
    );

    Ok(parsed.completion)
}

fn transport_reason(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request timed out: {}", error)
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        format!("transport error: {}", error)
    }
}

/// Backend handle for one HTTP endpoint
pub struct HttpBackend {
    endpoint: Endpoint,
    invoke_url: Url,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend for `endpoint`
    ///
    /// `api_key`, when present, is sent as a bearer token.
    ///
    /// # Errors
    /// Returns an error if the endpoint's URL is unusable or the HTTP client
    /// cannot be built (e.g. TLS initialisation failure).
    pub fn new(endpoint: Endpoint, api_key: Option<String>) -> AppResult<Self> {
        let invoke_url = invoke_url(endpoint.base_url(), endpoint.model())?;

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                AppError::Internal(format!(
                    "Failed to build HTTP client for {}: {}",
                    endpoint.label(),
                    e
                ))
            })?;

        tracing::debug!(
            endpoint = %endpoint,
            invoke_url = %invoke_url,
            authenticated = api_key.is_some(),
            "Created HTTP backend"
        );

        Ok(Self {
            endpoint,
            invoke_url,
            api_key,
            client,
        })
    }

    pub fn invoke_url(&self) -> &Url {
        &self.invoke_url
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn invoke(&self, request: &InferenceRequest) -> Result<String, BackendError> {
        let label = self.endpoint.label();

        let mut builder = self
            .client
            .post(self.invoke_url.clone())
            .header(ACCEPT, "application/json")
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(
                endpoint = %label,
                invoke_url = %self.invoke_url,
                error = %e,
                "Backend request failed before a response was received"
            );
            BackendError::Unavailable {
                endpoint: label.clone(),
                reason: transport_reason(&e),
            }
        })?;

        let status = response.status();
        let header_code = response
            .headers()
            .get(ERROR_TYPE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Unavailable {
                endpoint: label.clone(),
                reason: format!("failed to read response body: {}", e),
            })?;

        if status.is_success() {
            completion_from_body(&label, &body)
        } else {
            let error =
                error_from_response(&label, status.as_u16(), header_code.as_deref(), &body);
            tracing::warn!(
                endpoint = %label,
                status = status.as_u16(),
                kind = error.kind().as_str(),
                error = %error,
                "Backend returned an error response"
            );
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_url_encodes_arn_slashes() {
        let url = invoke_url(
            "https://bedrock-runtime.us-east-1.amazonaws.com",
            "arn:aws:bedrock:us-east-1:123456789012:provisioned-model/abc123",
        )
        .expect("valid url");
        assert_eq!(
            url.as_str(),
            "https://bedrock-runtime.us-east-1.amazonaws.com/model/arn:aws:bedrock:us-east-1:123456789012:provisioned-model%2Fabc123/invoke"
        );
    }

    #[test]
    fn test_invoke_url_keeps_base_path() {
        let url = invoke_url("http://localhost:8080/proxy/", "anthropic.claude-v2").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/proxy/model/anthropic.claude-v2/invoke"
        );
    }

    #[test]
    fn test_invoke_url_rejects_relative_base() {
        assert!(matches!(
            invoke_url("not a url", "m"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_classify_known_codes() {
        assert_eq!(
            classify_code("ThrottlingException", 400),
            BackendErrorKind::Throttled
        );
        assert_eq!(
            classify_code("ServiceQuotaExceededException", 400),
            BackendErrorKind::Throttled
        );
        assert_eq!(
            classify_code("AccessDeniedException", 400),
            BackendErrorKind::Unauthorized
        );
        assert_eq!(
            classify_code("ResourceNotFoundException", 400),
            BackendErrorKind::InvalidEndpoint
        );
        assert_eq!(
            classify_code("ModelTimeoutException", 408),
            BackendErrorKind::Unavailable
        );
    }

    #[test]
    fn test_classify_falls_back_to_status() {
        assert_eq!(classify_code("HTTP 429", 429), BackendErrorKind::Throttled);
        assert_eq!(classify_code("HTTP 403", 403), BackendErrorKind::Unauthorized);
        assert_eq!(classify_code("HTTP 401", 401), BackendErrorKind::Unauthorized);
        assert_eq!(classify_code("HTTP 503", 503), BackendErrorKind::Unavailable);
        assert_eq!(
            classify_code("SomethingNew", 418),
            BackendErrorKind::InvalidEndpoint
        );
    }

    #[test]
    fn test_normalize_code_strips_decorations() {
        assert_eq!(
            normalize_code("ThrottlingException:http://internal.amazon.com/coral/"),
            "ThrottlingException"
        );
        assert_eq!(
            normalize_code("com.amazon.coral.service#AccessDeniedException"),
            "AccessDeniedException"
        );
        assert_eq!(normalize_code("ValidationException"), "ValidationException");
    }

    #[test]
    fn test_error_from_response_prefers_header_code() {
        let error = error_from_response(
            "primary@us-east-1",
            400,
            Some("ThrottlingException:http://internal"),
            r#"{"message":"Too many requests, please wait before trying again."}"#,
        );
        assert_eq!(
            error,
            BackendError::Throttled {
                endpoint: "primary@us-east-1".to_string(),
                code: "ThrottlingException".to_string(),
                message: "Too many requests, please wait before trying again.".to_string(),
            }
        );
    }

    #[test]
    fn test_error_from_response_uses_body_type() {
        let error = error_from_response(
            "secondary@us-west-2",
            403,
            None,
            r#"{"__type":"com.amazon.coral.service#AccessDeniedException","Message":"nope"}"#,
        );
        assert_eq!(error.kind(), BackendErrorKind::Unauthorized);
    }

    #[test]
    fn test_error_from_response_without_code_or_json() {
        let error = error_from_response("primary@us-east-1", 502, None, "<html>Bad Gateway</html>");
        match error {
            BackendError::Unavailable { reason, .. } => {
                assert!(reason.contains("HTTP 502"), "got: {reason}");
                assert!(reason.contains("Bad Gateway"), "got: {reason}");
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_completion_from_body_parses_completion() {
        let text = completion_from_body(
            "primary@us-east-1",
            r#"{"completion":" pong","stop_reason":"stop_sequence"}"#,
        )
        .expect("valid body");
        assert_eq!(text, " pong");
    }

    #[test]
    fn test_completion_from_body_missing_field_is_malformed() {
        let error = completion_from_body("primary@us-east-1", r#"{"outputs":[]}"#)
            .expect_err("missing completion");
        assert_eq!(error.kind(), BackendErrorKind::Malformed);
        assert!(error.to_string().contains("completion"));
    }

    #[test]
    fn test_completion_from_body_not_json_is_malformed() {
        let error = completion_from_body("primary@us-east-1", "hello").expect_err("not json");
        assert_eq!(error.kind(), BackendErrorKind::Malformed);
    }
}

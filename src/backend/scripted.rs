//! In-process backend with scripted outcomes
//!
//! Used by tests, benchmarks and the CLI's `--simulate` mode to exercise the
//! router without a live service. Calls are counted and every request
//! received is recorded so tests can assert on call shape and payload.

use crate::backend::Backend;
use crate::error::{BackendError, BackendErrorKind};
use crate::models::request::{ASSISTANT_TURN, HUMAN_TURN};
use crate::models::{Endpoint, InferenceRequest};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What a scripted backend does on a given call
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedOutcome {
    /// Return this completion text
    Complete(String),
    /// Return the caller's prompt with the turn markers removed
    Echo,
    /// Fail with an error of this kind
    Fail(BackendErrorKind),
}

impl ScriptedOutcome {
    pub fn complete(text: impl Into<String>) -> Self {
        Self::Complete(text.into())
    }
}

/// Build an error of `kind` attributed to `endpoint`
pub fn scripted_error(kind: BackendErrorKind, endpoint: &str) -> BackendError {
    let endpoint = endpoint.to_string();
    match kind {
        BackendErrorKind::Throttled => BackendError::Throttled {
            endpoint,
            code: "ThrottlingException".to_string(),
            message: "Rate exceeded".to_string(),
        },
        BackendErrorKind::Unauthorized => BackendError::Unauthorized {
            endpoint,
            code: "AccessDeniedException".to_string(),
            message: "scripted credential rejection".to_string(),
        },
        BackendErrorKind::InvalidEndpoint => BackendError::InvalidEndpoint {
            endpoint,
            code: "ResourceNotFoundException".to_string(),
            message: "scripted unknown model".to_string(),
        },
        BackendErrorKind::Unavailable => BackendError::Unavailable {
            endpoint,
            reason: "scripted transport failure".to_string(),
        },
        BackendErrorKind::Malformed => BackendError::Malformed {
            endpoint,
            reason: "scripted response without completion".to_string(),
        },
    }
}

/// Backend whose outcomes follow a script
///
/// Call `n` (zero-based) uses `script[n]`; once the script runs out the
/// last entry repeats. An empty script behaves like `[Echo]`.
pub struct ScriptedBackend {
    endpoint: Endpoint,
    script: Vec<ScriptedOutcome>,
    latency: Duration,
    calls: AtomicUsize,
    record: bool,
    received: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedBackend {
    pub fn new(endpoint: Endpoint, script: Vec<ScriptedOutcome>) -> Self {
        Self {
            endpoint,
            script,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            record: true,
            received: Mutex::new(Vec::new()),
        }
    }

    /// Backend that produces the same outcome on every call
    pub fn always(endpoint: Endpoint, outcome: ScriptedOutcome) -> Self {
        Self::new(endpoint, vec![outcome])
    }

    /// Delay every call by `latency` before producing its outcome
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Stop keeping a copy of every request
    ///
    /// Calls are still counted; [`received`](Self::received) stays empty.
    /// Used for long simulated runs.
    pub fn without_recording(mut self) -> Self {
        self.record = false;
        self
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in call order
    pub fn received(&self) -> Vec<InferenceRequest> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn outcome_for(&self, call: usize) -> ScriptedOutcome {
        self.script
            .get(call)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or(ScriptedOutcome::Echo)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn invoke(&self, request: &InferenceRequest) -> Result<String, BackendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.record {
            self.received
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(request.clone());
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.outcome_for(call) {
            ScriptedOutcome::Complete(text) => Ok(text),
            ScriptedOutcome::Echo => Ok(request
                .prompt_text()
                .strip_prefix(HUMAN_TURN)
                .and_then(|p| p.strip_suffix(ASSISTANT_TURN))
                .unwrap_or(request.prompt_text())
                .to_string()),
            ScriptedOutcome::Fail(kind) => Err(scripted_error(kind, &self.endpoint.label())),
        }
    }
}

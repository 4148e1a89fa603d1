//! Primary/secondary failover routing
//!
//! [`FailoverRouter::route`] walks a small state machine:
//!
//! ```text
//! TryingPrimary --success--------------------------> Resolved(success)
//!       |------- Throttled --> TryingSecondary ---> Resolved(whatever it returned)
//!       `------- any other error ----------------> Resolved(failure)
//! ```
//!
//! At most one fallback hop happens per invocation. The router holds no
//! mutable state, so every call starts fresh at `TryingPrimary` and one
//! router can serve any number of concurrent callers.

use crate::backend::Backend;
use crate::error::{BackendError, RoutingError};
use crate::metrics::{Metrics, Outcome};
use crate::models::{Endpoint, InferenceRequest, Role};
use crate::request_id::RequestId;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-call deadline used when the caller does not supply one
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Which endpoint resolved an invocation and whether it took the fallback hop
///
/// Observability only; not part of the request/response contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    /// Slot of the last endpoint tried, independent of the role that
    /// endpoint was configured with
    pub final_role: Role,
    /// Whether the primary throttled and the secondary was tried
    pub fell_back: bool,
}

impl RoutingDecision {
    /// Resolved on the primary without a fallback
    pub fn direct() -> Self {
        Self {
            final_role: Role::Primary,
            fell_back: false,
        }
    }

    /// Resolved on the secondary after the primary throttled
    pub fn fallback() -> Self {
        Self {
            final_role: Role::Secondary,
            fell_back: true,
        }
    }

    /// Number of backend calls the invocation made
    pub fn attempts(&self) -> usize {
        if self.fell_back { 2 } else { 1 }
    }
}

/// Successful routed invocation
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResponse {
    /// Endpoint that produced the completion, as configured
    ///
    /// `source.role()` is the role the endpoint was built with. When one
    /// endpoint fills both slots it can differ from the hop that served the
    /// request; `decision.final_role` is authoritative for that.
    pub source: Endpoint,
    pub completion: String,
    pub decision: RoutingDecision,
}

/// Outcome of one routed invocation
pub type InferenceResult = Result<InferenceResponse, RoutingError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteState {
    TryingPrimary,
    TryingSecondary,
}

/// Router sending each request to the primary and, on throttling only,
/// once to the secondary
#[derive(Clone)]
pub struct FailoverRouter {
    primary: Arc<dyn Backend>,
    secondary: Arc<dyn Backend>,
    deadline: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl FailoverRouter {
    /// Create a router over two endpoint-bound backends
    ///
    /// The backends are not compared: an identical pair still gets the
    /// fallback call, since throttling is time-dependent.
    pub fn new(primary: Arc<dyn Backend>, secondary: Arc<dyn Backend>) -> Self {
        Self {
            primary,
            secondary,
            deadline: DEFAULT_DEADLINE,
            metrics: None,
        }
    }

    /// Default per-call deadline used by [`route`](Self::route)
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn primary(&self) -> &Endpoint {
        self.primary.endpoint()
    }

    pub fn secondary(&self) -> &Endpoint {
        self.secondary.endpoint()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Route `request` using the router's default deadline
    pub async fn route(&self, request: &InferenceRequest) -> InferenceResult {
        self.route_with_deadline(request, self.deadline).await
    }

    /// Route `request`, bounding each backend call by `deadline`
    ///
    /// A call that exceeds the deadline fails with `Unavailable`, which is
    /// terminal. The same `request` value is sent on the fallback hop.
    pub async fn route_with_deadline(
        &self,
        request: &InferenceRequest,
        deadline: Duration,
    ) -> InferenceResult {
        let request_id = RequestId::new();
        let mut state = RouteState::TryingPrimary;

        loop {
            match state {
                RouteState::TryingPrimary => {
                    match self
                        .attempt(self.primary.as_ref(), request, deadline, request_id)
                        .await
                    {
                        Ok(completion) => {
                            return self.resolve(
                                request_id,
                                RoutingDecision::direct(),
                                Ok(completion),
                            );
                        }
                        Err(error) if error.is_fallback_eligible() => {
                            tracing::info!(
                                request_id = %request_id,
                                primary = %self.primary.endpoint().label(),
                                secondary = %self.secondary.endpoint().label(),
                                error = %error,
                                "Primary throttled, falling back to secondary"
                            );
                            state = RouteState::TryingSecondary;
                        }
                        Err(error) => {
                            return self.resolve(
                                request_id,
                                RoutingDecision::direct(),
                                Err(error),
                            );
                        }
                    }
                }
                RouteState::TryingSecondary => {
                    // Last resort: whatever the secondary returns is final
                    let outcome = self
                        .attempt(self.secondary.as_ref(), request, deadline, request_id)
                        .await;
                    return self.resolve(request_id, RoutingDecision::fallback(), outcome);
                }
            }
        }
    }

    /// One backend call bounded by `deadline`
    async fn attempt(
        &self,
        backend: &dyn Backend,
        request: &InferenceRequest,
        deadline: Duration,
        request_id: RequestId,
    ) -> Result<String, BackendError> {
        let endpoint = backend.endpoint();
        let started = Instant::now();

        tracing::debug!(
            request_id = %request_id,
            endpoint = %endpoint,
            deadline_ms = deadline.as_millis() as u64,
            "Invoking backend"
        );

        let outcome = match tokio::time::timeout(deadline, backend.invoke(request)).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => {
                tracing::error!(
                    request_id = %request_id,
                    endpoint = %endpoint,
                    deadline_ms = deadline.as_millis() as u64,
                    "Backend call exceeded its deadline"
                );
                Err(BackendError::Unavailable {
                    endpoint: endpoint.label(),
                    reason: format!("deadline of {}ms exceeded", deadline.as_millis()),
                })
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        if let Some(metrics) = &self.metrics
            && let Err(e) =
                metrics.record_backend_call(endpoint.role(), Outcome::from(&outcome), elapsed_ms)
        {
            metrics.metrics_recording_failure("record_backend_call");
            tracing::error!(
                request_id = %request_id,
                error = %e,
                "Metrics recording failed. Observability degraded but request continues."
            );
        }

        outcome
    }

    /// Turn the final backend outcome into the routed result
    fn resolve(
        &self,
        request_id: RequestId,
        decision: RoutingDecision,
        outcome: Result<String, BackendError>,
    ) -> InferenceResult {
        let source = match decision.final_role {
            Role::Primary => self.primary.endpoint(),
            Role::Secondary => self.secondary.endpoint(),
        };

        if let Some(metrics) = &self.metrics
            && let Err(e) =
                metrics.record_route(decision.final_role, decision.fell_back, Outcome::from(&outcome))
        {
            metrics.metrics_recording_failure("record_route");
            tracing::error!(
                request_id = %request_id,
                error = %e,
                "Metrics recording failed. Observability degraded but request continues."
            );
        }

        match outcome {
            Ok(completion) => {
                tracing::info!(
                    request_id = %request_id,
                    served_by = %source.label(),
                    fell_back = decision.fell_back,
                    completion_length = completion.len(),
                    "Invocation completed"
                );
                Ok(InferenceResponse {
                    source: source.clone(),
                    completion,
                    decision,
                })
            }
            Err(error) => {
                tracing::warn!(
                    request_id = %request_id,
                    endpoint = %source.label(),
                    fell_back = decision.fell_back,
                    kind = error.kind().as_str(),
                    error = %error,
                    "Invocation failed"
                );
                Err(RoutingError::new(decision, error))
            }
        }
    }
}

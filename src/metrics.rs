//! Prometheus metrics collection for duoroute
//!
//! This module provides metrics instrumentation for tracking:
//! - Backend calls by endpoint role and outcome
//! - Fallback hops taken
//! - Final route results by serving role and outcome
//! - Backend call latency
//!
//! Recording never fails a route: callers log the error and bump
//! `duoroute_metrics_recording_failures_total` instead.

use crate::error::BackendErrorKind;
use crate::models::Role;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Outcome label for a backend call or a finished route
///
/// Bounded to six values so label cardinality stays fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed(BackendErrorKind),
}

impl Outcome {
    /// Convert outcome to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failed(kind) => kind.as_str(),
        }
    }
}

impl<T> From<&Result<T, crate::error::BackendError>> for Outcome {
    fn from(result: &Result<T, crate::error::BackendError>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(e) => Outcome::Failed(e.kind()),
        }
    }
}

/// Metrics collector for duoroute
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    backend_calls: IntCounterVec,
    backend_duration: HistogramVec,
    fallbacks: IntCounter,
    route_results: IntCounterVec,
    metrics_recording_failures: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 2 roles × 6 outcomes = 12 time series
        let backend_calls = IntCounterVec::new(
            Opts::new(
                "duoroute_backend_calls_total",
                "Total backend calls by endpoint role and outcome",
            ),
            &["role", "outcome"],
        )?;

        let backend_duration = HistogramVec::new(
            HistogramOpts::new(
                "duoroute_backend_duration_ms",
                "Backend call latency in milliseconds, including deadline expiry",
            )
            .buckets(vec![
                10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
            ]),
            &["role"],
        )?;

        let fallbacks = IntCounter::with_opts(Opts::new(
            "duoroute_fallbacks_total",
            "Total fallback hops from the primary to the secondary endpoint after throttling",
        ))?;

        let route_results = IntCounterVec::new(
            Opts::new(
                "duoroute_route_results_total",
                "Total routed invocations by the role that resolved them and the final outcome",
            ),
            &["served_by", "outcome"],
        )?;

        let metrics_recording_failures = IntCounterVec::new(
            Opts::new(
                "duoroute_metrics_recording_failures_total",
                "Total number of metrics recording operation failures by operation. \
                Indicates Prometheus internal errors - frequent failures require investigation.",
            ),
            &["operation"],
        )?;

        registry.register(Box::new(backend_calls.clone()))?;
        registry.register(Box::new(backend_duration.clone()))?;
        registry.register(Box::new(fallbacks.clone()))?;
        registry.register(Box::new(route_results.clone()))?;
        registry.register(Box::new(metrics_recording_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            backend_calls,
            backend_duration,
            fallbacks,
            route_results,
            metrics_recording_failures,
        })
    }

    /// Record one backend call and its latency
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is not registered or `duration_ms` is
    /// NaN, infinite or negative (those values corrupt histogram percentiles).
    pub fn record_backend_call(
        &self,
        role: Role,
        outcome: Outcome,
        duration_ms: f64,
    ) -> Result<(), prometheus::Error> {
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be finite and non-negative, got: {}",
                duration_ms
            )));
        }

        self.backend_calls
            .get_metric_with_label_values(&[role.as_str(), outcome.as_str()])?
            .inc();
        self.backend_duration
            .get_metric_with_label_values(&[role.as_str()])?
            .observe(duration_ms);
        Ok(())
    }

    /// Record the end of a routed invocation
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is not registered.
    pub fn record_route(
        &self,
        served_by: Role,
        fell_back: bool,
        outcome: Outcome,
    ) -> Result<(), prometheus::Error> {
        if fell_back {
            self.fallbacks.inc();
        }
        self.route_results
            .get_metric_with_label_values(&[served_by.as_str(), outcome.as_str()])?
            .inc();
        Ok(())
    }

    /// Record a metrics recording operation failure
    ///
    /// `operation` is one of `record_backend_call` or `record_route`.
    pub fn metrics_recording_failure(&self, operation: &str) {
        self.metrics_recording_failures
            .with_label_values(&[operation])
            .inc();
    }

    /// Total fallback hops recorded since startup
    pub fn fallbacks_count(&self) -> u64 {
        self.fallbacks.get()
    }

    /// Backend calls recorded for one role/outcome pair
    pub fn backend_calls_count(&self, role: Role, outcome: Outcome) -> u64 {
        self.backend_calls
            .get_metric_with_label_values(&[role.as_str(), outcome.as_str()])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Render all metrics in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        tracing::debug!(
            metric_family_count = metric_families.len(),
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| {
            tracing::error!(
                invalid_byte_index = e.utf8_error().valid_up_to(),
                "Prometheus encoder produced invalid UTF-8"
            );
            prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
        })
    }
}

//! Invocation driver for soak and demo runs
//!
//! Builds the request once and routes it a fixed number of times. Nothing
//! is printed here; each iteration's result is handed back to the caller.
//! Simulated throttling is configured on the router's primary backend (see
//! [`FaultInjectingBackend`](crate::backend::FaultInjectingBackend)), so
//! the driver exercises exactly the production routing path.

use crate::error::{AppError, AppResult};
use crate::models::{GenerationParams, InferenceRequest};
use crate::router::{FailoverRouter, InferenceResult};
use futures::StreamExt;
use std::sync::Arc;

/// Iterations per run when none are given
pub const DEFAULT_ITERATIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    iterations: usize,
    concurrency: usize,
}

impl DriverConfig {
    /// # Errors
    /// Returns `AppError::Config` if `concurrency` is zero.
    pub fn new(iterations: usize, concurrency: usize) -> AppResult<Self> {
        if concurrency == 0 {
            return Err(AppError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            iterations,
            concurrency,
        })
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            concurrency: 1,
        }
    }
}

/// Result of one driver iteration
#[derive(Debug)]
pub struct InvocationReport {
    /// Zero-based iteration index
    pub iteration: usize,
    pub result: InferenceResult,
}

pub struct InvocationDriver {
    router: FailoverRouter,
    config: DriverConfig,
}

impl InvocationDriver {
    pub fn new(router: FailoverRouter, config: DriverConfig) -> Self {
        Self { router, config }
    }

    pub fn config(&self) -> DriverConfig {
        self.config
    }

    /// Build the request from `prompt` and route it `iterations` times
    ///
    /// # Errors
    /// Returns `AppError::EmptyPrompt` before any backend is called if the
    /// prompt is empty, or `AppError::Internal` if an invocation task
    /// panicked. Routing failures are not errors here; they are reported
    /// per iteration.
    pub async fn run(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> AppResult<Vec<InvocationReport>> {
        let request = InferenceRequest::from_params(prompt, params)?;
        self.run_request(Arc::new(request)).await
    }

    /// Route an already-built request `iterations` times
    ///
    /// Reports are returned in iteration order regardless of concurrency.
    pub async fn run_request(
        &self,
        request: Arc<InferenceRequest>,
    ) -> AppResult<Vec<InvocationReport>> {
        tracing::info!(
            iterations = self.config.iterations,
            concurrency = self.config.concurrency,
            primary = %self.router.primary(),
            secondary = %self.router.secondary(),
            "Starting invocation run"
        );

        if self.config.concurrency == 1 {
            let mut reports = Vec::with_capacity(self.config.iterations);
            for iteration in 0..self.config.iterations {
                let result = self.router.route(&request).await;
                reports.push(InvocationReport { iteration, result });
            }
            return Ok(reports);
        }

        let mut reports = futures::stream::iter(0..self.config.iterations)
            .map(|iteration| {
                let router = self.router.clone();
                let request = Arc::clone(&request);
                tokio::spawn(async move {
                    let result = router.route(&request).await;
                    InvocationReport { iteration, result }
                })
            })
            .buffer_unordered(self.config.concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("invocation task failed: {}", e)))?;

        reports.sort_by_key(|r| r.iteration);
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FaultInjectingBackend, ScriptedBackend, ScriptedOutcome, ThrottlePlan};
    use crate::models::{Endpoint, Locality, Role};

    fn backends() -> (Arc<ScriptedBackend>, Arc<ScriptedBackend>) {
        let primary = Arc::new(ScriptedBackend::always(
            Endpoint::in_locality(
                Role::Primary,
                Locality::parse("us-east-1").unwrap(),
                "provisioned",
            ),
            ScriptedOutcome::complete("primary"),
        ));
        let secondary = Arc::new(ScriptedBackend::always(
            Endpoint::in_locality(
                Role::Secondary,
                Locality::parse("us-west-2").unwrap(),
                "on-demand",
            ),
            ScriptedOutcome::complete("secondary"),
        ));
        (primary, secondary)
    }

    #[test]
    fn test_driver_config_rejects_zero_concurrency() {
        assert!(DriverConfig::new(10, 0).is_err());
        let config = DriverConfig::new(0, 1).expect("zero iterations is allowed");
        assert_eq!(config.iterations(), 0);
    }

    #[test]
    fn test_driver_config_default_matches_soak_loop() {
        let config = DriverConfig::default();
        assert_eq!(config.iterations(), 10);
        assert_eq!(config.concurrency(), 1);
    }

    #[tokio::test]
    async fn test_empty_prompt_fails_before_any_call() {
        let (primary, secondary) = backends();
        let router = FailoverRouter::new(primary.clone(), secondary.clone());
        let driver = InvocationDriver::new(router, DriverConfig::default());

        let result = driver.run("", &GenerationParams::default()).await;
        assert!(matches!(result, Err(AppError::EmptyPrompt)));
        assert_eq!(primary.call_count(), 0);
        assert_eq!(secondary.call_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_iteration_falls_back() {
        let (primary, secondary) = backends();
        let injected = Arc::new(FaultInjectingBackend::new(
            primary.clone(),
            ThrottlePlan::at([5]),
        ));
        let router = FailoverRouter::new(injected, secondary.clone());
        let driver = InvocationDriver::new(router, DriverConfig::default());

        let reports = driver
            .run("ping", &GenerationParams::default())
            .await
            .expect("run completes");

        assert_eq!(reports.len(), 10);
        for report in &reports {
            let response = report.result.as_ref().expect("every iteration succeeds");
            if report.iteration == 5 {
                assert_eq!(response.source.role(), Role::Secondary);
                assert_eq!(response.completion, "secondary");
            } else {
                assert_eq!(response.source.role(), Role::Primary);
            }
        }
        assert_eq!(primary.call_count(), 9);
        assert_eq!(secondary.call_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_run_returns_ordered_reports() {
        let (primary, secondary) = backends();
        let router = FailoverRouter::new(primary.clone(), secondary);
        let driver = InvocationDriver::new(router, DriverConfig::new(25, 4).unwrap());

        let reports = driver
            .run("ping", &GenerationParams::default())
            .await
            .expect("run completes");

        let iterations: Vec<usize> = reports.iter().map(|r| r.iteration).collect();
        assert_eq!(iterations, (0..25).collect::<Vec<_>>());
        assert!(reports.iter().all(|r| r.result.is_ok()));
        assert_eq!(primary.call_count(), 25);
    }
}

//! Concurrent routing tests
//!
//! One router shared across many tasks: every invocation starts fresh at
//! the primary and takes at most one fallback hop, regardless of what other
//! invocations are doing at the same time.

use duoroute::backend::{
    Backend, FaultInjectingBackend, ScriptedBackend, ScriptedOutcome, ThrottlePlan,
};
use duoroute::metrics::{Metrics, Outcome};
use duoroute::models::{Endpoint, GenerationParams, InferenceRequest, Locality, Role};
use duoroute::router::FailoverRouter;
use std::sync::Arc;
use std::time::Duration;

fn scripted(role: Role, locality: &str, text: &str) -> Arc<ScriptedBackend> {
    Arc::new(
        ScriptedBackend::always(
            Endpoint::in_locality(role, Locality::parse(locality).unwrap(), "model"),
            ScriptedOutcome::complete(text),
        )
        .with_latency(Duration::from_millis(5)),
    )
}

fn request() -> Arc<InferenceRequest> {
    Arc::new(InferenceRequest::from_params("ping", &GenerationParams::default()).unwrap())
}

#[tokio::test]
async fn test_concurrent_routes_share_one_router() {
    let primary = scripted(Role::Primary, "us-east-1", "primary");
    let secondary = scripted(Role::Secondary, "us-west-2", "secondary");
    let router = Arc::new(FailoverRouter::new(primary.clone(), secondary.clone()));
    let request = request();

    let mut handles = vec![];
    for _ in 0..20 {
        let router = Arc::clone(&router);
        let request = Arc::clone(&request);
        handles.push(tokio::spawn(async move { router.route(&request).await }));
    }

    for handle in handles {
        let response = handle.await.expect("task panicked").expect("route succeeds");
        assert_eq!(response.source.role(), Role::Primary);
        assert!(!response.decision.fell_back);
    }

    assert_eq!(primary.call_count(), 20);
    assert_eq!(secondary.call_count(), 0);
}

#[tokio::test]
async fn test_concurrent_throttling_costs_one_secondary_call_each() {
    let real_primary = scripted(Role::Primary, "us-east-1", "primary");
    let secondary = scripted(Role::Secondary, "us-west-2", "secondary");
    // Throttle every primary attempt from the start
    let primary: Arc<dyn Backend> = Arc::new(FaultInjectingBackend::new(
        real_primary.clone(),
        ThrottlePlan::From(0),
    ));
    let metrics = Arc::new(Metrics::new().unwrap());
    let router = Arc::new(
        FailoverRouter::new(primary, secondary.clone()).with_metrics(Arc::clone(&metrics)),
    );
    let request = request();

    let mut handles = vec![];
    for _ in 0..16 {
        let router = Arc::clone(&router);
        let request = Arc::clone(&request);
        handles.push(tokio::spawn(async move { router.route(&request).await }));
    }

    for handle in handles {
        let response = handle.await.unwrap().expect("secondary answers");
        assert_eq!(response.source.role(), Role::Secondary);
        assert_eq!(response.decision.attempts(), 2);
    }

    assert_eq!(real_primary.call_count(), 0);
    assert_eq!(secondary.call_count(), 16);
    assert_eq!(metrics.fallbacks_count(), 16);
    assert_eq!(
        metrics.backend_calls_count(Role::Secondary, Outcome::Success),
        16
    );
}

//! Simulated throttling
//!
//! [`FaultInjectingBackend`] wraps another backend and answers selected
//! attempts with a synthetic `ThrottlingException` instead of calling
//! through. Which attempts are throttled is decided by a [`ThrottlePlan`]
//! over zero-based attempt indices.

use crate::backend::Backend;
use crate::error::BackendError;
use crate::models::{Endpoint, InferenceRequest};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Which attempt indices receive a simulated throttle
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ThrottlePlan {
    #[default]
    Never,
    /// Exactly these attempts
    At(BTreeSet<usize>),
    /// Every attempt from this index on
    From(usize),
    /// Each attempt independently with probability `rate`
    ///
    /// The decision for an attempt depends only on `seed` and the attempt
    /// index, so a plan replays identically across runs.
    Random { rate: f64, seed: u64 },
}

impl ThrottlePlan {
    pub fn at(indices: impl IntoIterator<Item = usize>) -> Self {
        Self::At(indices.into_iter().collect())
    }

    /// Whether attempt `index` should be throttled
    pub fn should_throttle(&self, index: usize) -> bool {
        match self {
            Self::Never => false,
            Self::At(indices) => indices.contains(&index),
            Self::From(start) => index >= *start,
            Self::Random { rate, seed } => {
                if rate.is_nan() || *rate <= 0.0 {
                    return false;
                }
                let mixed = seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                StdRng::seed_from_u64(mixed).random_bool(rate.min(1.0))
            }
        }
    }
}

/// Decorator that throttles planned attempts before reaching `inner`
pub struct FaultInjectingBackend {
    inner: Arc<dyn Backend>,
    plan: ThrottlePlan,
    attempts: AtomicUsize,
}

impl FaultInjectingBackend {
    pub fn new(inner: Arc<dyn Backend>, plan: ThrottlePlan) -> Self {
        Self {
            inner,
            plan,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn plan(&self) -> &ThrottlePlan {
        &self.plan
    }

    /// Attempts seen so far, throttled or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FaultInjectingBackend {
    fn endpoint(&self) -> &Endpoint {
        self.inner.endpoint()
    }

    async fn invoke(&self, request: &InferenceRequest) -> Result<String, BackendError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.plan.should_throttle(attempt) {
            let endpoint = self.inner.endpoint().label();
            tracing::info!(
                endpoint = %endpoint,
                attempt,
                "Injecting simulated throttling"
            );
            return Err(BackendError::Throttled {
                endpoint,
                code: "ThrottlingException".to_string(),
                message: format!("simulated throttling on attempt {}", attempt),
            });
        }

        self.inner.invoke(request).await
    }
}

//! Backend clients
//!
//! A [`Backend`] is a handle bound to exactly one [`Endpoint`]. It issues a
//! single call per `invoke` and reports failures as a typed
//! [`BackendError`]; retry and fallback decisions belong to the router.

pub mod fault;
pub mod http;
pub mod scripted;

pub use fault::{FaultInjectingBackend, ThrottlePlan};
pub use http::HttpBackend;
pub use scripted::{ScriptedBackend, ScriptedOutcome, scripted_error};

use crate::error::BackendError;
use crate::models::{Endpoint, InferenceRequest};
use async_trait::async_trait;

/// One remote inference endpoint
///
/// Implementations must be safe to share between concurrent invocations;
/// the router holds them behind `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Endpoint this handle is bound to
    fn endpoint(&self) -> &Endpoint;

    /// Send `request` once and return the completion text
    async fn invoke(&self, request: &InferenceRequest) -> Result<String, BackendError>;
}

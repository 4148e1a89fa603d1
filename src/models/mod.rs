//! Endpoint and request value types
//!
//! Everything here is immutable once constructed.

pub mod endpoint;
pub mod locality;
pub mod request;

pub use endpoint::{Endpoint, Role};
pub use locality::{Locality, is_valid_locality};
pub use request::{GenerationParams, InferenceRequest};

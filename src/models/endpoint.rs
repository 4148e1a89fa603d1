//! Endpoint identity
//!
//! An [`Endpoint`] names one remote inference target: where it lives
//! (locality and base URL), which model it serves, and whether it is the
//! primary or the secondary in a failover pair.

use crate::models::locality::Locality;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of an endpoint in the failover pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Preferred endpoint, normally backed by reserved capacity
    Primary,
    /// Last resort, only tried after the primary throttles
    Secondary,
}

impl Role {
    /// Convert to string representation for logging and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the public runtime URL for a locality
pub fn default_base_url(locality: &Locality) -> String {
    format!("https://bedrock-runtime.{}.amazonaws.com", locality)
}

/// Immutable description of one inference endpoint
///
/// Fields are private; an `Endpoint` is built once from validated
/// configuration and only read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    role: Role,
    locality: Locality,
    model: String,
    base_url: String,
}

impl Endpoint {
    pub fn new(
        role: Role,
        locality: Locality,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            role,
            locality,
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    /// Endpoint addressed through the locality's public runtime URL
    pub fn in_locality(role: Role, locality: Locality, model: impl Into<String>) -> Self {
        let base_url = default_base_url(&locality);
        Self::new(role, locality, model, base_url)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn locality(&self) -> &Locality {
        &self.locality
    }

    /// Opaque backend-specific model handle (model id or provisioned ARN)
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Short `role@locality` label used in logs and error messages
    pub fn label(&self) -> String {
        format!("{}@{}", self.role, self.locality)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.role, self.locality, self.model)
    }
}

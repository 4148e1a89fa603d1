//! Locality (region code) validation
//!
//! Endpoint localities are checked against a closed list of known codes.
//! Matching is exact: a string that merely starts with a known code is
//! rejected.

use crate::error::{AppError, AppResult};
use serde::Serialize;
use std::fmt;

/// Region codes where the inference service can be addressed
pub const KNOWN_LOCALITIES: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "us-gov-east-1",
    "us-gov-west-1",
    "ca-central-1",
    "ca-west-1",
    "sa-east-1",
    "eu-central-1",
    "eu-central-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-north-1",
    "eu-south-1",
    "eu-south-2",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "me-central-1",
    "me-south-1",
    "il-central-1",
    "af-south-1",
];

/// Returns true if `id` is exactly one of [`KNOWN_LOCALITIES`]
///
/// Case-sensitive, whole-string comparison. No trimming is applied, so
/// `" us-east-1"` and `"us-east-1\n"` are both invalid.
pub fn is_valid_locality(id: &str) -> bool {
    KNOWN_LOCALITIES.contains(&id)
}

/// Validated locality code
///
/// Can only be constructed through [`Locality::parse`], so holding a
/// `Locality` means the code is in the known set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Locality(String);

impl Locality {
    /// Validate and wrap a locality code
    ///
    /// # Errors
    /// Returns `AppError::InvalidLocality` if the code is not known.
    pub fn parse(id: &str) -> AppResult<Self> {
        if is_valid_locality(id) {
            Ok(Self(id.to_string()))
        } else {
            Err(AppError::InvalidLocality {
                locality: id.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

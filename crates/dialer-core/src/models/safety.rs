//! Restricted-deployment safety gate

use crate::error::ProviderError;
use serde::{Deserialize, Serialize};

/// Destination allow-list applied in restricted mode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyPolicy {
    /// When false every destination is permitted
    pub restricted: bool,

    /// E.164 prefixes that may be dialed in restricted mode
    pub allowed_prefixes: Vec<String>,

    /// Explicit operator override that disables the gate
    pub allow_override: bool,
}

impl SafetyPolicy {
    /// Policy that permits every destination
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Restricted policy with the given allow-list
    pub fn restricted<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            restricted: true,
            allowed_prefixes: prefixes.into_iter().map(Into::into).collect(),
            allow_override: false,
        }
    }

    pub fn permits(&self, destination: &str) -> bool {
        if !self.restricted || self.allow_override {
            return true;
        }
        self.allowed_prefixes
            .iter()
            .any(|prefix| destination.starts_with(prefix.as_str()))
    }

    /// Fail with `UnsafeDestination` when the gate refuses the number
    pub fn check(&self, destination: &str) -> Result<(), ProviderError> {
        if self.permits(destination) {
            Ok(())
        } else {
            Err(ProviderError::UnsafeDestination(destination.to_string()))
        }
    }
}

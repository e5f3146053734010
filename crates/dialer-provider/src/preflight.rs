//! Checks every client runs before touching the network

use dialer_core::models::{Contact, SafetyPolicy};
use dialer_core::ProviderError;
use tracing::warn;

/// Reject malformed destinations, then apply the safety gate
pub fn check_destination(destination: &str, safety: &SafetyPolicy) -> Result<(), ProviderError> {
    if Contact::validate_e164(destination).is_err() {
        return Err(ProviderError::InvalidDestination(format!(
            "{} is not a valid E.164 number",
            destination
        )));
    }

    safety.check(destination).map_err(|e| {
        warn!(destination = %destination, "Safety gate refused destination");
        e
    })
}

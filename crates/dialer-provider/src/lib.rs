//! Campaign Dialer Telephony Providers
//!
//! Implementations of [`dialer_core::traits::ProviderClient`]:
//!
//! - [`TwilioClient`] talks to the Twilio REST API over HTTP
//! - [`FakeProviderClient`] runs scripted outcomes in-process
//!
//! Both validate the destination and apply the safety gate before doing
//! anything else, and both price calls from the same [`PricingTable`].
//!
//! [`PricingTable`]: dialer_core::models::PricingTable

pub mod classify;
pub mod fake;
pub mod preflight;
pub mod twilio;
pub mod twiml;

pub use fake::{FakeOutcome, FakeProviderClient};
pub use twilio::TwilioClient;

//! HTTP client for the Twilio Programmable Voice REST API
//!
//! Speaks the form-encoded 2010-04-01 Calls resource with HTTP basic auth.
//! Destination checks run before any request is built.

use crate::{classify, preflight, twiml};
use async_trait::async_trait;
use dialer_core::config::ProviderConfig;
use dialer_core::models::{
    FetchedStatus, PlaceCallRequest, PlacedCall, PricingTable, ProviderStatus, SafetyPolicy,
};
use dialer_core::traits::ProviderClient;
use dialer_core::{AppError, AppResult, ProviderError};
use reqwest::{Client, ClientBuilder, Response};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Call resource as returned by the Calls endpoints
#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    status: String,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    price: Option<String>,
}

/// Production telephony provider client
pub struct TwilioClient {
    http_client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    pricing: PricingTable,
    safety: SafetyPolicy,
}

impl TwilioClient {
    /// Create a new client
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let client = TwilioClient::new(&config.provider, config.pricing.table()?, config.safety.policy())?;
    /// ```
    pub fn new(
        config: &ProviderConfig,
        pricing: PricingTable,
        safety: SafetyPolicy,
    ) -> AppResult<Self> {
        let http_client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            pricing,
            safety,
        })
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.base_url, self.account_sid
        )
    }

    fn call_url(&self, provider_call_id: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.base_url, self.account_sid, provider_call_id
        )
    }

    /// Decode a success body or classify the failure
    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify::http_status(status, &body);
            error!("Provider HTTP error: {}", err);
            return Err(err);
        }

        // The request was accepted; retrying an unreadable body could dial twice
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Permanent(format!("Unreadable provider response: {}", e)))
    }

    async fn update_status(&self, provider_call_id: &str, status: &str) -> Result<(), ProviderError> {
        let response = self
            .http_client
            .post(self.call_url(provider_call_id))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Status", status)])
            .send()
            .await
            .map_err(classify::transport)?;

        let _: CallResource = Self::read(response).await?;
        Ok(())
    }

    fn parse_status(code: &str) -> ProviderStatus {
        ProviderStatus::from_code(code).unwrap_or_else(|| {
            warn!("Unknown provider status '{}', treating as queued", code);
            ProviderStatus::Queued
        })
    }
}

#[async_trait]
impl ProviderClient for TwilioClient {
    #[instrument(skip(self, request), fields(destination = %request.destination))]
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<PlacedCall, ProviderError> {
        preflight::check_destination(&request.destination, &self.safety)?;

        let form: Vec<(&str, String)> = vec![
            ("To", request.destination.clone()),
            ("From", self.from_number.clone()),
            ("Twiml", twiml::say(request.message.as_deref())),
            ("StatusCallback", request.status_callback_url.clone()),
            ("StatusCallbackMethod", "POST".to_string()),
            ("StatusCallbackEvent", "initiated".to_string()),
            ("StatusCallbackEvent", "ringing".to_string()),
            ("StatusCallbackEvent", "answered".to_string()),
            ("StatusCallbackEvent", "completed".to_string()),
            ("Timeout", request.timeout_seconds.to_string()),
        ];

        debug!("Submitting call to provider");

        let response = self
            .http_client
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(classify::transport)?;

        let resource: CallResource = Self::read(response).await?;

        info!("Provider accepted call {}", resource.sid);

        Ok(PlacedCall {
            status: Self::parse_status(&resource.status),
            provider_call_id: resource.sid,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_status(&self, provider_call_id: &str) -> Result<FetchedStatus, ProviderError> {
        let response = self
            .http_client
            .get(self.call_url(provider_call_id))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(classify::transport)?;

        let resource: CallResource = Self::read(response).await?;

        Ok(FetchedStatus {
            status: Self::parse_status(&resource.status),
            duration_seconds: resource
                .duration
                .as_deref()
                .and_then(|d| d.trim().parse::<i32>().ok()),
            // Prices are reported as negative amounts charged to the account
            cost: resource
                .price
                .as_deref()
                .and_then(|p| Decimal::from_str(p.trim()).ok())
                .map(|p| p.abs()),
        })
    }

    #[instrument(skip(self))]
    async fn cancel_call(&self, provider_call_id: &str) -> Result<(), ProviderError> {
        // "canceled" only applies to calls that have not been answered yet
        match self.update_status(provider_call_id, "canceled").await {
            Ok(()) => Ok(()),
            Err(ProviderError::Permanent(detail)) => {
                debug!("Cancel refused ({}), hanging up instead", detail);
                self.update_status(provider_call_id, "completed").await
            }
            Err(e) => Err(e),
        }
    }

    fn rate_per_minute(&self, destination: &str) -> Decimal {
        self.pricing.rate_per_minute(destination)
    }

    fn estimate_cost(&self, destination: &str) -> Decimal {
        self.pricing.estimate_cost(destination)
    }
}

//! Provider status webhook
//!
//! Always answers 200: a non-2xx response makes the provider retry, and
//! retrying a callback we could not use only repeats the same outcome.

use crate::dto::{StatusCallbackPayload, StatusCallbackQuery};
use crate::state::AppState;
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use tracing::{error, info, instrument, warn};

fn ack(outcome: &str) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "received": true,
        "outcome": outcome,
    }))
}

/// POST /api/v1/webhooks/status
#[instrument(skip(state, req, body))]
pub async fn status_callback(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let call_id_hint = web::Query::<StatusCallbackQuery>::from_query(req.query_string())
        .ok()
        .and_then(|q| q.call_id);

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/x-www-form-urlencoded")
        .to_ascii_lowercase();

    let payload = match StatusCallbackPayload::parse(&content_type, &body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Undecodable status callback: {}", e);
            return ack("ignored");
        }
    };

    let Some(update) = payload.into_update() else {
        warn!("Status callback without call id or status");
        return ack("ignored");
    };

    match state.ingestion.apply_status(&update, call_id_hint).await {
        Ok(outcome) => {
            info!(
                provider_call_id = %update.provider_call_id,
                status = %update.status,
                outcome = outcome.label(),
                "Status callback processed"
            );
            ack(outcome.label())
        }
        Err(e) => {
            error!(
                "Failed to apply status '{}' for {}: {}",
                update.status, update.provider_call_id, e
            );
            ack("error")
        }
    }
}

/// Configure webhook routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/webhooks").route("/status", web::post().to(status_callback)));
}

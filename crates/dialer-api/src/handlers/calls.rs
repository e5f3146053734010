//! Call handlers
//!
//! Batch enqueueing, read-only reporting, cancellation and manual reconcile.

use crate::dto::{
    ApiResponse, BatchEnqueueRequest, CallListParams, CallRecordResponse, ReconcileResponse,
};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use dialer_core::models::CallRequest;
use dialer_core::AppError;
use dialer_services::IngestOutcome;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Enqueue a batch of calls
///
/// POST /api/v1/calls/batch
#[instrument(skip(state, req), fields(batch_size = req.calls.len()))]
pub async fn enqueue_batch(
    state: web::Data<AppState>,
    req: web::Json<BatchEnqueueRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Batch validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let req = req.into_inner();
    let delay = req
        .inter_call_delay_secs
        .map(Duration::from_secs)
        .unwrap_or(state.default_inter_call_delay);
    let requests: Vec<CallRequest> = req.calls.into_iter().map(Into::into).collect();

    let records = state.enqueuer.enqueue_many(requests, delay).await?;
    info!(count = records.len(), "Batch accepted");

    let response: Vec<CallRecordResponse> = records.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Accepted().json(ApiResponse::success(response)))
}

/// List call records, newest first
///
/// GET /api/v1/calls
#[instrument(skip(state))]
pub async fn list_calls(
    state: web::Data<AppState>,
    query: web::Query<CallListParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Call list validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let status = query.status_filter()?;
    let pagination = &query.pagination;
    debug!(page = pagination.page, per_page = pagination.per_page, "Listing calls");

    let (records, total) = state
        .calls
        .list(status, pagination.limit(), pagination.offset())
        .await?;

    let data: Vec<CallRecordResponse> = records.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(pagination.paginate(data, total)))
}

/// GET /api/v1/calls/{id}
#[instrument(skip(state))]
pub async fn get_call(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let record = state
        .calls
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::CallNotFound(id.to_string()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(CallRecordResponse::from(record))))
}

/// Cancel a call
///
/// POST /api/v1/calls/{id}/cancel
#[instrument(skip(state))]
pub async fn cancel_call(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let record = state.cancellation.cancel(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(CallRecordResponse::from(record))))
}

/// Poll the provider for a call whose callback never arrived
///
/// POST /api/v1/calls/{id}/reconcile
#[instrument(skip(state))]
pub async fn reconcile_call(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let outcome = state.ingestion.reconcile(path.into_inner()).await?;
    let label = outcome.label();

    let call = match outcome {
        IngestOutcome::Applied(r) | IngestOutcome::Unchanged(r) | IngestOutcome::AlreadyTerminal(r) => {
            Some(CallRecordResponse::from(r))
        }
        IngestOutcome::UnknownRecord | IngestOutcome::Ignored(_) => None,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(ReconcileResponse {
        outcome: label,
        call,
    })))
}

/// Configure call routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/calls")
            .route("", web::get().to(list_calls))
            .route("/batch", web::post().to(enqueue_batch))
            .route("/{id}", web::get().to(get_call))
            .route("/{id}/cancel", web::post().to(cancel_call))
            .route("/{id}/reconcile", web::post().to(reconcile_call)),
    );
}

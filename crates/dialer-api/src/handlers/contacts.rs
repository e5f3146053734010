//! Contact handlers

use crate::dto::{
    ApiResponse, BulkResult, BulkStatusRequest, BulkTagRequest, ContactCreateRequest,
    ContactResponse,
};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use dialer_core::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

fn validation_failed(what: &str, e: validator::ValidationErrors) -> AppError {
    warn!("{} validation failed: {}", what, e);
    AppError::Validation(e.to_string())
}

/// POST /api/v1/contacts
#[instrument(skip(state, req))]
pub async fn create_contact(
    state: web::Data<AppState>,
    req: web::Json<ContactCreateRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()
        .map_err(|e| validation_failed("Contact creation", e))?;

    let req = req.into_inner();
    let contact = state
        .contacts
        .create(&req.phone_number, req.name, req.campaign_tag, req.tags)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(ContactResponse::from(contact))))
}

/// GET /api/v1/contacts/{id}
#[instrument(skip(state))]
pub async fn get_contact(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let contact = state.contacts.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(ContactResponse::from(contact))))
}

/// Delete a contact and its call records
///
/// DELETE /api/v1/contacts/{id}
#[instrument(skip(state))]
pub async fn delete_contact(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state.contacts.delete(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/v1/contacts/bulk/tags
#[instrument(skip(state, req))]
pub async fn bulk_tag(
    state: web::Data<AppState>,
    req: web::Json<BulkTagRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| validation_failed("Bulk tag", e))?;

    let req = req.into_inner();
    let contacts = state.contacts.bulk_tag(&req.contact_ids, req.tags).await?;
    let data: Vec<ContactResponse> = contacts.into_iter().map(Into::into).collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}

/// POST /api/v1/contacts/bulk/status
#[instrument(skip(state, req))]
pub async fn bulk_status(
    state: web::Data<AppState>,
    req: web::Json<BulkStatusRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| validation_failed("Bulk status", e))?;

    let status = req.parsed_status()?;
    let updated = state
        .contacts
        .bulk_set_status(&req.contact_ids, status)
        .await?;
    info!(updated, %status, "Contact status changed");

    Ok(HttpResponse::Ok().json(ApiResponse::success(BulkResult { updated })))
}

/// Configure contact routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/contacts")
            .route("", web::post().to(create_contact))
            .route("/bulk/tags", web::post().to(bulk_tag))
            .route("/bulk/status", web::post().to(bulk_status))
            .route("/{id}", web::get().to(get_contact))
            .route("/{id}", web::delete().to(delete_contact)),
    );
}
